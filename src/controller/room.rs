use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{
    Action, Command, DemandReading, Reason, RoomConfig, SwitchState, TimeContext,
};
use crate::hardware::{set_state, Switch, SwitchError};

/// Deployment-wide control knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPolicy {
    /// How long automation stays suspended after a manual override
    pub override_cooldown: Duration,
    /// Force heaters off at night unless the cheapest rate tier is active
    pub night_rate_veto: bool,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self {
            override_cooldown: Duration::hours(4),
            night_rate_veto: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// No trusted switch state yet (startup, or just after a lockout)
    Unknown,
    On,
    Off,
    /// Manual override detected; automation suspended
    Overridden,
}

/// Temperature/demand rules for one reading, given the trusted switch state.
///
/// Night: below `min_night` on, at or above `max_night` off. Day: the
/// `max_day` ceiling always wins, then the `min_day` floor, then surplus
/// export turns an off heater on and any import turns it off.
pub fn decide(
    temp: i32,
    ctx: &TimeContext,
    demand: DemandReading,
    cfg: &RoomConfig,
    tracked: Option<SwitchState>,
    policy: &ControlPolicy,
) -> (Action, Reason) {
    if ctx.is_night {
        if policy.night_rate_veto && !ctx.rate_tier.is_cheapest() {
            return (Action::TurnOff, Reason::NightRateVeto);
        }
        if temp < cfg.min_night {
            return (Action::TurnOn, Reason::NightBelowMin);
        }
        if temp >= cfg.max_night {
            return (Action::TurnOff, Reason::NightAtOrAboveMax);
        }
        return (Action::NoAction, Reason::NightWithinBand);
    }

    if temp >= cfg.max_day {
        return (Action::TurnOff, Reason::DayAtOrAboveMax);
    }
    if temp < cfg.min_day {
        return (Action::TurnOn, Reason::DayBelowMin);
    }
    if tracked != Some(SwitchState::On) && demand.kw <= -cfg.heater_kw {
        return (Action::TurnOn, Reason::ExportingSurplus);
    }
    if demand.is_importing() {
        return (Action::TurnOff, Reason::Importing);
    }
    (Action::NoAction, Reason::DayWithinBand)
}

/// Hysteresis controller and override lockout for one room.
pub struct RoomController {
    name: String,
    config: RoomConfig,
    policy: ControlPolicy,
    switch: Arc<dyn Switch>,
    tracked: Option<SwitchState>,
    override_until: Option<DateTime<Utc>>,
}

impl RoomController {
    pub fn new(
        name: impl Into<String>,
        config: RoomConfig,
        switch: Arc<dyn Switch>,
        policy: ControlPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            policy,
            switch,
            tracked: None,
            override_until: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tracked_state(&self) -> Option<SwitchState> {
        self.tracked
    }

    pub fn override_until(&self) -> Option<DateTime<Utc>> {
        self.override_until
    }

    pub fn mode(&self, now: DateTime<Utc>) -> ControlMode {
        match (self.override_until, self.tracked) {
            (Some(until), _) if now < until => ControlMode::Overridden,
            (_, Some(SwitchState::On)) => ControlMode::On,
            (_, Some(SwitchState::Off)) => ControlMode::Off,
            (_, None) => ControlMode::Unknown,
        }
    }

    /// Processes one temperature reading.
    ///
    /// Errors come from the switch only. A failed read leaves all state as it
    /// was; a failed on/off command leaves the tracked state at its previous
    /// value so the next reconciliation sees the real relay.
    pub async fn handle(
        &mut self,
        temp: i32,
        ctx: &TimeContext,
        demand: DemandReading,
    ) -> Result<Command, SwitchError> {
        let now = ctx.now_utc();

        if let Some(until) = self.override_until {
            if now < until {
                info!(room = %self.name, temp, until = %until, "switch state overridden, skipping");
                return Ok(self.command(Action::NoAction, Reason::OverrideActive));
            }
            info!(room = %self.name, "override cooldown elapsed, resuming control");
            self.override_until = None;
        }

        let actual = self.switch.get_state(true).await?;
        match self.tracked {
            None => self.tracked = Some(actual),
            Some(tracked) if tracked != actual => {
                // Saturates at the far end of the calendar instead of overflowing
                let until = now
                    .checked_add_signed(self.policy.override_cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                warn!(
                    room = %self.name,
                    tracked = %tracked,
                    actual = %actual,
                    until = %until,
                    "switch overridden, taking no further action until cooldown ends"
                );
                self.tracked = None;
                self.override_until = Some(until);
                return Ok(self.command(Action::NoAction, Reason::OverrideDetected));
            }
            Some(_) => {}
        }

        let (action, reason) = decide(temp, ctx, demand, &self.config, self.tracked, &self.policy);

        info!(
            room = %self.name,
            temp,
            demand_kw = demand.kw,
            is_night = ctx.is_night,
            rate = %ctx.rate_tier,
            heater = ?self.tracked,
            action = %action,
            reason = %reason,
            "decision"
        );

        if let Some(target) = action.target_state() {
            set_state(self.switch.as_ref(), target).await?;
            self.tracked = Some(target);
        }

        Ok(self.command(action, reason))
    }

    fn command(&self, action: Action, reason: Reason) -> Command {
        Command {
            room: self.name.clone(),
            action,
            reason,
        }
    }
}

impl std::fmt::Debug for RoomController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomController")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("tracked", &self.tracked)
            .field("override_until", &self.override_until)
            .finish()
    }
}
