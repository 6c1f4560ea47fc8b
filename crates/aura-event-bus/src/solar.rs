//! Daily solar-schedule computation and publication
//!
//! Sunrise and sunset are derived from the site location and the calendar
//! date using the NOAA sunrise-equation approximation (declination plus
//! equation of time). Accuracy is within a few minutes at temperate
//! latitudes, which is sufficient for household automation offsets.
//!
//! The driver publishes the day's schedule as two [`Event::solar_schedule`]
//! events, once at startup and again just after each local midnight.
//! Per-trigger offsets are applied by the engine when matching clock ticks
//! against the schedule, not here.

use std::time::Duration;

use aura_core::{Event, SolarKind};
use chrono::{DateTime, Datelike, Local, NaiveTime, Offset};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::SharedEventBus;

/// Geographic site location in decimal degrees.
///
/// Latitude is positive north, longitude positive east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SiteLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Sunrise and sunset for one calendar day, local wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySchedule {
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
}

/// Compute the day's sunrise/sunset for a site, in local wall-clock time.
///
/// `utc_offset_minutes` is the site's offset from UTC on that date.
/// Returns `None` during polar day or polar night, when the sun does not
/// cross the horizon at all.
pub fn day_schedule(
    location: SiteLocation,
    date: chrono::NaiveDate,
    utc_offset_minutes: i32,
) -> Option<DaySchedule> {
    let day_of_year = f64::from(date.ordinal());

    // Solar declination, degrees.
    let declination =
        -23.44 * (std::f64::consts::TAU / 365.0 * (day_of_year + 10.0)).cos();

    // Equation of time, minutes.
    let b = std::f64::consts::TAU * (day_of_year - 81.0) / 364.0;
    let eot = 9.87 * (2.0 * b).sin() - 7.53 * b.cos() - 1.5 * b.sin();

    // Solar noon in minutes after midnight UTC (4 minutes per degree).
    let solar_noon = 720.0 - 4.0 * location.longitude - eot;

    // Hour angle at the standard -0.833 degree horizon (refraction + disc).
    let lat = location.latitude.to_radians();
    let decl = declination.to_radians();
    let cos_omega =
        ((-0.833f64).to_radians().sin() - lat.sin() * decl.sin()) / (lat.cos() * decl.cos());
    if !(-1.0..=1.0).contains(&cos_omega) {
        return None;
    }
    let half_day_minutes = 4.0 * cos_omega.acos().to_degrees();

    let sunrise = solar_noon - half_day_minutes + f64::from(utc_offset_minutes);
    let sunset = solar_noon + half_day_minutes + f64::from(utc_offset_minutes);

    Some(DaySchedule {
        sunrise: minutes_to_time(sunrise),
        sunset: minutes_to_time(sunset),
    })
}

fn minutes_to_time(minutes: f64) -> NaiveTime {
    let wrapped = (minutes.round() as i64).rem_euclid(24 * 60) as u32;
    NaiveTime::from_hms_opt(wrapped / 60, wrapped % 60, 0)
        .unwrap_or(NaiveTime::MIN)
}

/// Publishes the day's solar schedule once per day.
pub struct SolarDriver {
    bus: SharedEventBus,
    location: SiteLocation,
}

impl SolarDriver {
    pub fn new(bus: SharedEventBus, location: SiteLocation) -> Self {
        Self { bus, location }
    }

    /// Spawn the daily publication loop; it runs until the shutdown signal
    /// flips to true.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        info!(
            latitude = self.location.latitude,
            longitude = self.location.longitude,
            "starting solar driver"
        );
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = Local::now();
            self.publish_for(now);

            tokio::select! {
                _ = tokio::time::sleep(delay_until_next_midnight(now)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("solar driver stopping");
                        return;
                    }
                }
            }
        }
    }

    fn publish_for(&self, now: DateTime<Local>) {
        let offset_minutes = now.offset().fix().local_minus_utc() / 60;
        match day_schedule(self.location, now.date_naive(), offset_minutes) {
            Some(schedule) => {
                debug!(
                    sunrise = %schedule.sunrise,
                    sunset = %schedule.sunset,
                    "publishing solar schedule"
                );
                self.bus
                    .publish(Event::solar_schedule(SolarKind::Sunrise, schedule.sunrise, now));
                self.bus
                    .publish(Event::solar_schedule(SolarKind::Sunset, schedule.sunset, now));
            }
            None => {
                warn!(date = %now.date_naive(), "no sunrise/sunset today (polar day or night)");
            }
        }
    }
}

fn delay_until_next_midnight(now: DateTime<Local>) -> Duration {
    let fallback = Duration::from_secs(24 * 60 * 60);
    let Some(tomorrow) = now.date_naive().succ_opt() else {
        return fallback;
    };
    let Some(next) = tomorrow.and_hms_opt(0, 0, 1) else {
        return fallback;
    };
    next.signed_duration_since(now.naive_local())
        .to_std()
        .unwrap_or(fallback)
}
