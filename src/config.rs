use anyhow::{Context, Result};
use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::controller::ControlPolicy;
use crate::domain::{default_week, Location, RateInterval, RateScheme, RoomConfig};
use crate::hardware::SwitchConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const CONFIG_PATH_ENV: &str = "HEAT_CTRL_CONFIG";
pub const ENV_PREFIX: &str = "HEAT_CTRL__";
/// One week.
pub const MAX_OVERRIDE_COOLDOWN_MINUTES: i64 = 7 * 24 * 60;

/// Invalid configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no rooms configured")]
    NoRooms,
    #[error("room '{room}': {period} thresholds inverted (min {min} >= max {max})")]
    InvertedThresholds {
        room: String,
        period: &'static str,
        min: i32,
        max: i32,
    },
    #[error("room '{room}': heater capacity must be a positive number of kW, got {heater_kw}")]
    InvalidHeaterCapacity { room: String, heater_kw: f64 },
    #[error("rate week must list 7 schedules (Monday first), got {0}")]
    WeekLength(usize),
    #[error("rate schedule '{0}' has no intervals")]
    EmptySchedule(String),
    #[error("rate schedule '{schedule}': invalid interval [{start}, {end})")]
    InvalidInterval { schedule: String, start: u32, end: u32 },
    #[error("rate schedule '{schedule}': hours [{start}, {end}) not covered")]
    ScheduleGap { schedule: String, start: u32, end: u32 },
    #[error("rate schedule '{schedule}': intervals overlap at hour {hour}")]
    ScheduleOverlap { schedule: String, hour: u32 },
    #[error("{day} refers to unknown rate schedule '{schedule}'")]
    UnknownSchedule { day: &'static str, schedule: String },
    #[error("invalid timezone '{name}': {reason}")]
    InvalidTimezone { name: String, reason: String },
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("control.override_cooldown_minutes must be at most {max}, got {minutes}")]
    CooldownTooLong { minutes: i64, max: i64 },
    #[error("stream url must be http(s), got '{0}'")]
    InvalidStreamUrl(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub stream: StreamConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub rates: RatesConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub rooms: BTreeMap<String, RoomSettings>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub url: String,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    #[serde(default = "default_retry")]
    pub retry_seconds: u64,
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_seconds)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_cooldown")]
    pub override_cooldown_minutes: i64,
    #[serde(default)]
    pub night_rate_veto: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            override_cooldown_minutes: default_cooldown(),
            night_rate_veto: false,
        }
    }
}

/// SSDP search for WeMo plugs configured without a fixed host.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_timeout")]
    pub timeout_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_discovery_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatesConfig {
    /// Schedule name per weekday, Monday first
    #[serde(default = "default_week")]
    pub week: Vec<String>,
    pub schemes: BTreeMap<String, Vec<RateInterval>>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        let scheme = RateScheme::default();
        let schemes = ["weekday", "weekend"]
            .iter()
            .filter_map(|name| {
                scheme
                    .schedule(name)
                    .map(|intervals| (name.to_string(), intervals.to_vec()))
            })
            .collect();
        Self {
            week: default_week(),
            schemes,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomSettings {
    pub heater_kw: f64,
    pub min_day: i32,
    pub max_day: i32,
    pub min_night: i32,
    pub max_night: i32,
    pub switch: SwitchConfig,
}

impl RoomSettings {
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            heater_kw: self.heater_kw,
            min_day: self.min_day,
            max_day: self.max_day,
            min_night: self.min_night,
            max_night: self.max_night,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub name: String,
    pub config: RoomConfig,
    pub switch: SwitchConfig,
}

/// Configuration after every invariant has been checked.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub stream: StreamConfig,
    pub policy: ControlPolicy,
    pub location: Location,
    pub timezone: Tz,
    pub rates: RateScheme,
    pub discovery_timeout: Duration,
    pub rooms: Vec<RoomSpec>,
}

fn default_idle_timeout() -> u64 {
    120
}

fn default_retry() -> u64 {
    60
}

fn default_discovery_timeout() -> u64 {
    5
}

fn default_cooldown() -> i64 {
    4 * 60
}

impl Config {
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let figment = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        figment
            .extract()
            .with_context(|| format!("failed to load configuration from {path}"))
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Ok(Figment::from(Toml::string(toml)).extract()?)
    }

    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        if !(self.stream.url.starts_with("http://") || self.stream.url.starts_with("https://")) {
            return Err(ConfigError::InvalidStreamUrl(self.stream.url.clone()));
        }
        if self.stream.idle_timeout_seconds == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "stream.idle_timeout_seconds",
            });
        }
        if self.stream.retry_seconds == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "stream.retry_seconds",
            });
        }
        if self.control.override_cooldown_minutes <= 0 {
            return Err(ConfigError::ZeroDuration {
                field: "control.override_cooldown_minutes",
            });
        }
        if self.discovery.timeout_seconds == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "discovery.timeout_seconds",
            });
        }
        let minutes = self.control.override_cooldown_minutes;
        let override_cooldown = chrono::Duration::try_minutes(minutes)
            .filter(|_| minutes <= MAX_OVERRIDE_COOLDOWN_MINUTES)
            .ok_or(ConfigError::CooldownTooLong {
                minutes,
                max: MAX_OVERRIDE_COOLDOWN_MINUTES,
            })?;

        let loc = &self.location;
        if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
            return Err(ConfigError::InvalidLocation(format!(
                "latitude {} / longitude {} out of range",
                loc.latitude, loc.longitude
            )));
        }
        let timezone: Tz = loc
            .timezone
            .parse()
            .map_err(|e| ConfigError::InvalidTimezone {
                name: loc.timezone.clone(),
                reason: format!("{e}"),
            })?;

        let rates = RateScheme::new(self.rates.schemes.clone(), self.rates.week.clone())?;

        if self.rooms.is_empty() {
            return Err(ConfigError::NoRooms);
        }
        let mut rooms = Vec::with_capacity(self.rooms.len());
        for (name, settings) in &self.rooms {
            let config = settings.room_config();
            config.validate(name)?;
            rooms.push(RoomSpec {
                name: name.clone(),
                config,
                switch: settings.switch.clone(),
            });
        }

        Ok(ValidatedConfig {
            stream: self.stream.clone(),
            policy: ControlPolicy {
                override_cooldown,
                night_rate_veto: self.control.night_rate_veto,
            },
            location: self.location.clone(),
            timezone,
            rates,
            discovery_timeout: Duration::from_secs(self.discovery.timeout_seconds),
            rooms,
        })
    }
}
