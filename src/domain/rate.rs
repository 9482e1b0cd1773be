use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ConfigError;

const HOURS_PER_DAY: u32 = 24;

/// Electricity pricing period. Variants are ordered from cheapest to most expensive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RateTier {
    Offpeak,
    Shoulder,
    Peak,
}

impl RateTier {
    pub fn cheapest() -> Self {
        RateTier::Offpeak
    }

    pub fn is_cheapest(self) -> bool {
        self == Self::cheapest()
    }
}

/// Half-open hour interval `[start, end)` tagged with a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateInterval {
    pub rate: RateTier,
    pub start: u32,
    pub end: u32,
}

impl RateInterval {
    pub fn new(rate: RateTier, start: u32, end: u32) -> Self {
        Self { rate, start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        hour >= self.start && hour < self.end
    }
}

/// Weekly rate schedule, validated once at construction.
///
/// Each named schedule must partition the day into contiguous intervals and
/// each weekday must name one of them. Lookups go through a precomputed
/// weekday × hour table.
#[derive(Debug, Clone)]
pub struct RateScheme {
    schedules: BTreeMap<String, Vec<RateInterval>>,
    week: [String; 7],
    table: [[RateTier; HOURS_PER_DAY as usize]; 7],
}

impl RateScheme {
    /// `week` lists schedule names from Monday to Sunday.
    pub fn new(
        schedules: BTreeMap<String, Vec<RateInterval>>,
        week: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let week: [String; 7] = week
            .try_into()
            .map_err(|w: Vec<String>| ConfigError::WeekLength(w.len()))?;

        let mut sorted = BTreeMap::new();
        for (name, intervals) in schedules {
            let intervals = check_partition(&name, intervals)?;
            sorted.insert(name, intervals);
        }

        let mut table = [[RateTier::cheapest(); HOURS_PER_DAY as usize]; 7];
        for (day, name) in week.iter().enumerate() {
            let intervals = sorted
                .get(name)
                .ok_or_else(|| ConfigError::UnknownSchedule {
                    day: weekday_name(day),
                    schedule: name.clone(),
                })?;
            for iv in intervals {
                for hour in iv.start..iv.end {
                    table[day][hour as usize] = iv.rate;
                }
            }
        }

        Ok(Self {
            schedules: sorted,
            week,
            table,
        })
    }

    pub fn tier_at(&self, weekday: Weekday, hour: u32) -> RateTier {
        let day = weekday.num_days_from_monday() as usize;
        self.table[day][(hour % HOURS_PER_DAY) as usize]
    }

    pub fn schedule_name(&self, weekday: Weekday) -> &str {
        &self.week[weekday.num_days_from_monday() as usize]
    }

    pub fn schedule(&self, name: &str) -> Option<&[RateInterval]> {
        self.schedules.get(name).map(Vec::as_slice)
    }
}

impl Default for RateScheme {
    fn default() -> Self {
        let mut schedules = BTreeMap::new();
        schedules.insert(
            "weekday".to_string(),
            vec![
                RateInterval::new(RateTier::Offpeak, 0, 7),
                RateInterval::new(RateTier::Shoulder, 7, 15),
                RateInterval::new(RateTier::Peak, 15, 23),
                RateInterval::new(RateTier::Offpeak, 23, 24),
            ],
        );
        schedules.insert(
            "weekend".to_string(),
            vec![RateInterval::new(RateTier::Offpeak, 0, 24)],
        );
        let week = default_week();

        match Self::new(schedules, week) {
            Ok(scheme) => scheme,
            Err(e) => unreachable!("built-in rate scheme is invalid: {e}"),
        }
    }
}

pub fn default_week() -> Vec<String> {
    ["weekday", "weekday", "weekday", "weekday", "weekday", "weekend", "weekend"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn check_partition(
    name: &str,
    mut intervals: Vec<RateInterval>,
) -> Result<Vec<RateInterval>, ConfigError> {
    if intervals.is_empty() {
        return Err(ConfigError::EmptySchedule(name.to_string()));
    }
    for iv in &intervals {
        if iv.start >= iv.end || iv.end > HOURS_PER_DAY {
            return Err(ConfigError::InvalidInterval {
                schedule: name.to_string(),
                start: iv.start,
                end: iv.end,
            });
        }
    }

    intervals.sort_by_key(|iv| iv.start);
    let mut cursor = 0;
    for iv in &intervals {
        if iv.start > cursor {
            return Err(ConfigError::ScheduleGap {
                schedule: name.to_string(),
                start: cursor,
                end: iv.start,
            });
        }
        if iv.start < cursor {
            return Err(ConfigError::ScheduleOverlap {
                schedule: name.to_string(),
                hour: iv.start,
            });
        }
        cursor = iv.end;
    }
    if cursor < HOURS_PER_DAY {
        return Err(ConfigError::ScheduleGap {
            schedule: name.to_string(),
            start: cursor,
            end: HOURS_PER_DAY,
        });
    }
    Ok(intervals)
}

fn weekday_name(day: usize) -> &'static str {
    ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"][day]
}
