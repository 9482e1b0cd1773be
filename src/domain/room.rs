use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;

/// Heater capacity and hysteresis thresholds for one room.
///
/// Temperatures are whole degrees Celsius, as reported by the room sensors.
/// Lower bounds are exclusive-on (`t < min` turns the heater on) and upper
/// bounds are inclusive-off (`t >= max` turns it off).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub heater_kw: f64,
    pub min_day: i32,
    pub max_day: i32,
    pub min_night: i32,
    pub max_night: i32,
}

impl RoomConfig {
    pub fn validate(&self, room: &str) -> Result<(), ConfigError> {
        if !self.heater_kw.is_finite() || self.heater_kw <= 0.0 {
            return Err(ConfigError::InvalidHeaterCapacity {
                room: room.to_string(),
                heater_kw: self.heater_kw,
            });
        }
        if self.min_day >= self.max_day {
            return Err(ConfigError::InvertedThresholds {
                room: room.to_string(),
                period: "day",
                min: self.min_day,
                max: self.max_day,
            });
        }
        if self.min_night >= self.max_night {
            return Err(ConfigError::InvertedThresholds {
                room: room.to_string(),
                period: "night",
                min: self.min_night,
                max: self.max_night,
            });
        }
        Ok(())
    }
}

/// Physical relay state as reported by a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn toggled(self) -> Self {
        match self {
            SwitchState::On => SwitchState::Off,
            SwitchState::Off => SwitchState::On,
        }
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "on"),
            SwitchState::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    TurnOn,
    TurnOff,
    NoAction,
}

impl Action {
    /// Switch state the action drives towards, if any.
    pub fn target_state(self) -> Option<SwitchState> {
        match self {
            Action::TurnOn => Some(SwitchState::On),
            Action::TurnOff => Some(SwitchState::Off),
            Action::NoAction => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::TurnOn => write!(f, "turn_on"),
            Action::TurnOff => write!(f, "turn_off"),
            Action::NoAction => write!(f, "no_action"),
        }
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    OverrideActive,
    OverrideDetected,
    NightBelowMin,
    NightAtOrAboveMax,
    NightRateVeto,
    NightWithinBand,
    DayAtOrAboveMax,
    DayBelowMin,
    ExportingSurplus,
    Importing,
    DayWithinBand,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::OverrideActive => "switch overridden, control suspended",
            Reason::OverrideDetected => "switch state changed outside the controller",
            Reason::NightBelowMin => "room below minimum @ night",
            Reason::NightAtOrAboveMax => "room at or above maximum @ night",
            Reason::NightRateVeto => "rate tier not offpeak @ night",
            Reason::NightWithinBand => "room within band @ night",
            Reason::DayAtOrAboveMax => "room at or above maximum @ day",
            Reason::DayBelowMin => "room below minimum @ day",
            Reason::ExportingSurplus => "heater off and exporting enough to run it @ day",
            Reason::Importing => "buying from grid @ day",
            Reason::DayWithinBand => "not enough surplus to justify heating @ day",
        };
        f.write_str(s)
    }
}

/// Output of a single room decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub room: String,
    pub action: Action,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub room: String,
    pub degrees: i32,
}
