//! # Sunrise / Sunset
//!
//! Day/night classification for a fixed installation site. The astronomy is
//! behind the [`Astronomy`] trait; [`SunriseEquation`] is the built-in
//! implementation, good to a few minutes at non-polar latitudes.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Julian date of the Unix epoch.
const JD_UNIX_EPOCH: f64 = 2_440_587.5;
/// Julian date of J2000.0.
const JD_J2000: f64 = 2_451_545.0;
/// Days from 0001-01-01 (day 1) to 1970-01-01.
const DAYS_CE_TO_UNIX: i64 = 719_163;
/// Days between the Unix epoch and J2000 (rounded to the civil date).
const DAYS_UNIX_TO_J2000: i64 = 10_957;
/// Earth's axial tilt in degrees.
const OBLIQUITY_DEG: f64 = 23.4397;
/// Apparent sun altitude at rise/set: refraction plus solar disc radius.
const HORIZON_DEG: f64 = -0.833;

/// Installation site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub region: String,
    /// Degrees, positive = north
    pub latitude: f64,
    /// Degrees, positive = east
    pub longitude: f64,
    /// IANA zone name, e.g. `Australia/Melbourne`
    pub timezone: String,
    /// Metres above sea level
    pub elevation_m: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            name: "Blackburn".to_string(),
            region: "Victoria".to_string(),
            latitude: -37.82,
            longitude: 145.15,
            timezone: "Australia/Melbourne".to_string(),
            elevation_m: 50.0,
        }
    }
}

/// Sun events for one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunTimes {
    Normal {
        sunrise: DateTime<Utc>,
        sunset: DateTime<Utc>,
    },
    /// Sun never sets on this date
    PolarDay,
    /// Sun never rises on this date
    PolarNight,
}

pub trait Astronomy: Send + Sync {
    fn sun_times(&self, date: NaiveDate, location: &Location) -> SunTimes;
}

/// Standard sunrise equation with refraction and observer elevation correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct SunriseEquation;

impl Astronomy for SunriseEquation {
    fn sun_times(&self, date: NaiveDate, location: &Location) -> SunTimes {
        let to_rad = PI / 180.0;

        let days_since_unix = i64::from(date.num_days_from_ce()) - DAYS_CE_TO_UNIX;
        let n = (days_since_unix - DAYS_UNIX_TO_J2000) as f64;

        // Mean solar time at the site's meridian
        let j_star = n - location.longitude / 360.0;

        let mean_anomaly = (357.5291 + 0.985_600_28 * j_star).rem_euclid(360.0);
        let m = mean_anomaly * to_rad;
        let center = 1.9148 * m.sin() + 0.0200 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin();

        let ecliptic_longitude = (mean_anomaly + center + 180.0 + 102.9372).rem_euclid(360.0);
        let lambda = ecliptic_longitude * to_rad;

        let j_transit = JD_J2000 + j_star + 0.0053 * m.sin() - 0.0069 * (2.0 * lambda).sin();

        let sin_decl = lambda.sin() * (OBLIQUITY_DEG * to_rad).sin();
        let cos_decl = sin_decl.asin().cos();

        let altitude = HORIZON_DEG - 2.076 * location.elevation_m.max(0.0).sqrt() / 60.0;
        let lat = location.latitude * to_rad;
        let cos_hour_angle =
            ((altitude * to_rad).sin() - lat.sin() * sin_decl) / (lat.cos() * cos_decl);

        if cos_hour_angle < -1.0 {
            return SunTimes::PolarDay;
        }
        if cos_hour_angle > 1.0 {
            return SunTimes::PolarNight;
        }

        let hour_angle_deg = cos_hour_angle.acos() / to_rad;
        let sunrise = julian_to_utc(j_transit - hour_angle_deg / 360.0);
        let sunset = julian_to_utc(j_transit + hour_angle_deg / 360.0);

        match (sunrise, sunset) {
            (Some(sunrise), Some(sunset)) => SunTimes::Normal { sunrise, sunset },
            // Out-of-range dates only; treat as permanent night
            _ => SunTimes::PolarNight,
        }
    }
}

fn julian_to_utc(jd: f64) -> Option<DateTime<Utc>> {
    let millis = ((jd - JD_UNIX_EPOCH) * 86_400_000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
}

/// Day/night result for one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolarPhase {
    pub is_night: bool,
    pub sunrise: Option<DateTime<Tz>>,
    pub sunset: Option<DateTime<Tz>>,
}

pub struct SolarClassifier {
    location: Location,
    tz: Tz,
    astronomy: Box<dyn Astronomy>,
}

impl SolarClassifier {
    pub fn new(location: Location, tz: Tz, astronomy: Box<dyn Astronomy>) -> Self {
        Self {
            location,
            tz,
            astronomy,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Night iff `now` is before today's sunrise or after today's sunset,
    /// "today" being the local calendar date at the site.
    pub fn classify<Z: TimeZone>(&self, now: &DateTime<Z>) -> SolarPhase {
        let local = now.with_timezone(&self.tz);
        let date = local.date_naive();

        match self.astronomy.sun_times(date, &self.location) {
            SunTimes::Normal { sunrise, sunset } => {
                let sunrise = sunrise.with_timezone(&self.tz);
                let sunset = sunset.with_timezone(&self.tz);
                SolarPhase {
                    is_night: local < sunrise || local > sunset,
                    sunrise: Some(sunrise),
                    sunset: Some(sunset),
                }
            }
            SunTimes::PolarDay => SolarPhase {
                is_night: false,
                sunrise: None,
                sunset: None,
            },
            SunTimes::PolarNight => SolarPhase {
                is_night: true,
                sunrise: None,
                sunset: None,
            },
        }
    }
}

impl std::fmt::Debug for SolarClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolarClassifier")
            .field("location", &self.location)
            .field("tz", &self.tz)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn melbourne() -> SolarClassifier {
        SolarClassifier::new(
            Location::default(),
            chrono_tz::Australia::Melbourne,
            Box::new(SunriseEquation),
        )
    }

    fn assert_close(actual: DateTime<Utc>, expected: DateTime<Utc>) {
        let diff = (actual - expected).num_seconds().abs();
        assert!(
            diff <= 5 * 60,
            "expected {expected}, got {actual} ({diff}s apart)"
        );
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_melbourne_winter_solstice() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        match SunriseEquation.sun_times(date, &Location::default()) {
            SunTimes::Normal { sunrise, sunset } => {
                // 07:33 and 17:08 AEST
                assert_close(sunrise, utc(2024, 6, 20, 21, 33));
                assert_close(sunset, utc(2024, 6, 21, 7, 8));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_melbourne_summer_solstice() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        match SunriseEquation.sun_times(date, &Location::default()) {
            SunTimes::Normal { sunrise, sunset } => {
                // 05:52 and 20:42 AEDT
                assert_close(sunrise, utc(2024, 12, 20, 18, 52));
                assert_close(sunset, utc(2024, 12, 21, 9, 42));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_western_hemisphere_site() {
        let london = Location {
            name: "London".to_string(),
            region: "England".to_string(),
            latitude: 51.5,
            longitude: -0.12,
            timezone: "Europe/London".to_string(),
            elevation_m: 0.0,
        };
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        match SunriseEquation.sun_times(date, &london) {
            SunTimes::Normal { sunrise, sunset } => {
                assert_close(sunrise, utc(2024, 6, 21, 3, 43));
                assert_close(sunset, utc(2024, 6, 21, 20, 21));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_polar_cases() {
        let tromso = Location {
            latitude: 69.65,
            longitude: 18.96,
            ..Location::default()
        };
        let midsummer = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let midwinter = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        assert_eq!(SunriseEquation.sun_times(midsummer, &tromso), SunTimes::PolarDay);
        assert_eq!(SunriseEquation.sun_times(midwinter, &tromso), SunTimes::PolarNight);
    }

    #[test]
    fn test_classify_day_and_night() {
        let solar = melbourne();

        // Noon AEST
        let noon = utc(2024, 6, 21, 2, 0);
        let phase = solar.classify(&noon);
        assert!(!phase.is_night);
        assert!(phase.sunrise.is_some() && phase.sunset.is_some());

        // 05:00 AEST, before sunrise
        assert!(solar.classify(&utc(2024, 6, 20, 19, 0)).is_night);

        // 22:00 AEST, after sunset
        assert!(solar.classify(&utc(2024, 6, 21, 12, 0)).is_night);
    }

    #[test]
    fn test_classify_boundaries_inclusive_for_day() {
        let solar = melbourne();
        let phase = solar.classify(&utc(2024, 6, 21, 2, 0));
        let sunrise = phase.sunrise.unwrap();
        let sunset = phase.sunset.unwrap();

        assert!(!solar.classify(&sunrise).is_night);
        assert!(!solar.classify(&sunset).is_night);
        assert!(solar.classify(&(sunrise - Duration::seconds(1))).is_night);
        assert!(solar.classify(&(sunset + Duration::seconds(1))).is_night);
    }

    struct FixedSun(SunTimes);

    impl Astronomy for FixedSun {
        fn sun_times(&self, _date: NaiveDate, _location: &Location) -> SunTimes {
            self.0
        }
    }

    #[test]
    fn test_polar_classification() {
        let day = SolarClassifier::new(
            Location::default(),
            chrono_tz::UTC,
            Box::new(FixedSun(SunTimes::PolarDay)),
        );
        let night = SolarClassifier::new(
            Location::default(),
            chrono_tz::UTC,
            Box::new(FixedSun(SunTimes::PolarNight)),
        );
        let now = utc(2024, 1, 1, 0, 0);
        assert!(!day.classify(&now).is_night);
        assert!(night.classify(&now).is_night);
    }
}
