pub mod room;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub use room::{decide, ControlMode, ControlPolicy, RoomController};

use crate::config::ValidatedConfig;
use crate::domain::{
    Command, DemandReading, DemandTracker, SolarClassifier, SunriseEquation, TimeClassifier,
};
use crate::hardware::{SwitchError, SwitchFactory};
use crate::ingest::StreamEvent;

/// Owns every room controller plus the demand tracker.
///
/// Meant to be owned by the single ingestion task; all mutation goes through
/// `&mut self`, so no locking is involved.
#[derive(Debug)]
pub struct HeatController {
    rooms: BTreeMap<String, RoomController>,
    demand: DemandTracker,
    clock: TimeClassifier,
}

impl HeatController {
    pub fn new(clock: TimeClassifier) -> Self {
        Self {
            rooms: BTreeMap::new(),
            demand: DemandTracker::new(),
            clock,
        }
    }

    /// Builds switches for every configured room and checks each one answers
    /// a forced read. An unreachable switch aborts startup.
    pub async fn from_config(cfg: &ValidatedConfig, factory: &mut SwitchFactory) -> Result<Self> {
        let solar = SolarClassifier::new(
            cfg.location.clone(),
            cfg.timezone,
            Box::new(SunriseEquation),
        );
        let mut controller = Self::new(TimeClassifier::new(solar, cfg.rates.clone()));

        for spec in &cfg.rooms {
            let switch = factory
                .create(&spec.name, &spec.switch)
                .await
                .with_context(|| format!("failed to create switch for room '{}'", spec.name))?;
            let state = switch
                .get_state(true)
                .await
                .with_context(|| format!("switch for room '{}' is unreachable", spec.name))?;
            info!(room = %spec.name, state = %state, heater_kw = spec.config.heater_kw, "switch found");

            controller.add_room(RoomController::new(
                spec.name.clone(),
                spec.config.clone(),
                switch,
                cfg.policy.clone(),
            ));
        }
        Ok(controller)
    }

    pub fn add_room(&mut self, room: RoomController) {
        self.rooms.insert(room.name().to_string(), room);
    }

    pub fn is_room(&self, id: &str) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn room(&self, name: &str) -> Option<&RoomController> {
        self.rooms.get(name)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomController> {
        self.rooms.values()
    }

    pub fn demand(&self) -> DemandReading {
        self.demand.current()
    }

    /// Applies one event. Demand events only update the tracker; temperature
    /// events for a known room run that room's decision against a fresh
    /// time context.
    pub async fn apply(
        &mut self,
        event: StreamEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Command>, SwitchError> {
        match event {
            StreamEvent::Demand(reading) => {
                debug!(demand_kw = reading.kw, "grid demand updated");
                self.demand.update(reading);
                Ok(None)
            }
            StreamEvent::Temperature(reading) => {
                let ctx = self.clock.context(now);
                if !self.demand.has_reading() {
                    debug!(room = %reading.room, "no grid demand reading yet, assuming 0 kW");
                }
                let demand = self.demand.current();
                let Some(room) = self.rooms.get_mut(&reading.room) else {
                    debug!(room = %reading.room, "no controller for room, skipping");
                    return Ok(None);
                };
                debug!(
                    room = %reading.room,
                    temp = reading.degrees,
                    weekday = %ctx.weekday,
                    hour = ctx.hour,
                    schedule = self.clock.rates().schedule_name(ctx.weekday),
                    sunrise = ?ctx.sunrise,
                    sunset = ?ctx.sunset,
                    "temperature reading"
                );
                room.handle(reading.degrees, &ctx, demand).await.map(Some)
            }
        }
    }
}
