use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::domain::{RateScheme, RateTier, SolarClassifier};

/// Per-reading view of "now". Never cached: one stream session can cross
/// sunrise, sunset or a rate boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeContext {
    pub now: DateTime<Tz>,
    pub weekday: Weekday,
    pub hour: u32,
    pub is_night: bool,
    pub rate_tier: RateTier,
    pub sunrise: Option<DateTime<Tz>>,
    pub sunset: Option<DateTime<Tz>>,
}

impl TimeContext {
    pub fn now_utc(&self) -> DateTime<Utc> {
        self.now.with_timezone(&Utc)
    }
}

#[derive(Debug)]
pub struct TimeClassifier {
    solar: SolarClassifier,
    rates: RateScheme,
}

impl TimeClassifier {
    pub fn new(solar: SolarClassifier, rates: RateScheme) -> Self {
        Self { solar, rates }
    }

    pub fn rates(&self) -> &RateScheme {
        &self.rates
    }

    pub fn context(&self, now: DateTime<Utc>) -> TimeContext {
        let local = now.with_timezone(&self.solar.timezone());
        let phase = self.solar.classify(&local);
        let weekday = local.weekday();
        let hour = local.hour();

        TimeContext {
            now: local,
            weekday,
            hour,
            is_night: phase.is_night,
            rate_tier: self.rates.tier_at(weekday, hour),
            sunrise: phase.sunrise,
            sunset: phase.sunset,
        }
    }
}
