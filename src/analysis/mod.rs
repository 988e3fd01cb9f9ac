//! Lap analytics. Everything here is a pure function over finalized laps.

pub mod distance;
pub mod fuel;
pub mod median;
pub mod peaks;
pub mod variance;

use std::sync::Arc;

use itertools::Itertools;

use crate::laps::Lap;

pub use distance::{TimeDeltaPoint, distance_axis, time_delta_by_distance};
pub use fuel::{FuelConsumption, FuelMap, calculate_remaining_fuel, fuel_projection};
pub use median::median_lap;
pub use peaks::{SpeedExtrema, find_peaks, speed_extrema};
pub use variance::{SpeedVariance, fastest_laps_variance};

/// Formats seconds as `m:ss.sss`, negative values get a leading `-`.
pub fn seconds_to_lap_time(seconds: f64) -> String {
    let (prefix, seconds) = if seconds < 0. {
        ("-", -seconds)
    } else {
        ("", seconds)
    };
    let minutes = (seconds / 60.).floor();
    let remaining = seconds - minutes * 60.;
    format!("{}{:.0}:{:06.3}", prefix, minutes, remaining)
}

/// Lap with the lowest finish time.
pub fn best_lap(laps: &[Arc<Lap>]) -> Option<Arc<Lap>> {
    laps.iter()
        .min_by(|a, b| a.lap_finish_time.total_cmp(&b.lap_finish_time))
        .cloned()
}

/// Keeps laps whose finish time lies within `[min_lap_time, max_lap_time]`.
/// A bound that is not positive is ignored.
pub fn filter_max_min_laps(
    laps: &[Arc<Lap>],
    max_lap_time: f64,
    min_lap_time: f64,
) -> Vec<Arc<Lap>> {
    laps.iter()
        .filter(|lap| max_lap_time <= 0. || lap.lap_finish_time <= max_lap_time)
        .filter(|lap| min_lap_time <= 0. || lap.lap_finish_time >= min_lap_time)
        .cloned()
        .collect()
}

/// Picks the laps a comparison view shows: the latest lap, a reference lap
/// (the selected one, or the best lap once there are two laps) and the median
/// lap once there are three laps. `laps` is newest first.
pub fn last_reference_median(
    laps: &[Arc<Lap>],
    selected_reference: Option<Arc<Lap>>,
) -> (Option<Arc<Lap>>, Option<Arc<Lap>>, Option<Lap>) {
    let last = laps.first().cloned();
    let reference = match selected_reference {
        Some(reference) => Some(reference),
        None if laps.len() >= 2 => best_lap(laps),
        None => None,
    };
    let median = if laps.len() >= 3 {
        median_lap(laps)
    } else {
        None
    };
    (last, reference, median)
}

/// Positions (x, z) where the driver starts braking.
pub fn brake_points(lap: &Lap) -> Vec<(f32, f32)> {
    let series = &lap.series;
    series
        .brake
        .iter()
        .tuple_windows()
        .enumerate()
        .filter(|(_, (before, now))| **before == 0. && **now > 0.)
        .filter_map(|(i, _)| {
            Some((
                *series.position_x.get(i + 1)?,
                *series.position_z.get(i + 1)?,
            ))
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaceLineMode {
    /// More throttle than brake
    Throttle,
    /// More brake than throttle
    Braking,
    /// Neither pedal
    Coasting,
}

/// Race line positions (x, y, z) for the ticks where `mode` applies, `None`
/// for the other ticks so that the line can be drawn with gaps.
pub fn race_line(lap: &Lap, mode: RaceLineMode) -> Vec<Option<(f32, f32, f32)>> {
    let series = &lap.series;
    (0..series.brake.len().min(series.throttle.len()))
        .map(|i| {
            let (brake, throttle) = (series.brake[i], series.throttle[i]);
            let active = match mode {
                RaceLineMode::Throttle => brake < throttle,
                RaceLineMode::Braking => brake > throttle,
                RaceLineMode::Coasting => brake == 0. && throttle == 0.,
            };
            if !active {
                return None;
            }
            Some((
                *series.position_x.get(i)?,
                *series.position_y.get(i)?,
                *series.position_z.get(i)?,
            ))
        })
        .collect()
}

/// One row of the lap table, pedal usage in ticks per thousand.
#[derive(Clone, Debug, PartialEq)]
pub struct LapSummary {
    pub number: i16,
    pub time: String,
    /// Difference to the best lap, `-` for a lap faster than the best lap of
    /// this session, empty for the best lap itself
    pub diff: String,
    pub is_best: bool,
    pub fuel_at_end: f32,
    pub fuel_consumed: f32,
    pub full_throttle: f64,
    pub throttle_and_brake: f64,
    pub full_brake: f64,
    pub coasting: f64,
    pub tires_spinning: f64,
}

impl LapSummary {
    pub fn from_lap(lap: &Lap, best_lap_time: f64) -> Self {
        let per_mille = |ticks: u32| {
            if lap.lap_ticks == 0 {
                0.
            } else {
                ticks as f64 / lap.lap_ticks as f64 * 1000.
            }
        };

        let is_best = best_lap_time == lap.lap_finish_time;
        let diff = if is_best {
            String::new()
        } else if lap.lap_finish_time < best_lap_time {
            // only possible for a lap of another session
            "-".to_string()
        } else if best_lap_time > 0. {
            seconds_to_lap_time((lap.lap_finish_time - best_lap_time) / 1000.)
        } else {
            String::new()
        };

        Self {
            number: lap.number,
            time: seconds_to_lap_time(lap.lap_finish_time / 1000.),
            diff,
            is_best,
            fuel_at_end: lap.fuel_at_end,
            fuel_consumed: lap.fuel_consumed,
            full_throttle: per_mille(lap.full_throttle_ticks),
            throttle_and_brake: per_mille(lap.throttle_and_brake_ticks),
            full_brake: per_mille(lap.full_brake_ticks),
            coasting: per_mille(lap.no_throttle_and_no_brake_ticks),
            tires_spinning: per_mille(lap.tires_spinning_ticks),
        }
    }
}

/// Plain text table of `laps`, one row per lap.
pub fn format_laps_table(laps: &[Arc<Lap>], best_lap_time: f64) -> String {
    let header = format!(
        "{:>3} {:>9} {:>9} {:>5} {:>5} {:>5} {:>5} {:>5} {:>5} {:>5}",
        "#", "Time", "Diff", "Fuel", "FuCo", "fT", "T+B", "fB", "0T", "Spin"
    );
    let rows = laps.iter().map(|lap| {
        let summary = LapSummary::from_lap(lap, best_lap_time);
        format!(
            "{:>3}{}{:>9} {:>9} {:>5.0} {:>5.0} {:>5.0} {:>5.0} {:>5.0} {:>5.0} {:>5.0}",
            summary.number,
            if summary.is_best { "*" } else { " " },
            summary.time,
            summary.diff,
            summary.fuel_at_end,
            summary.fuel_consumed,
            summary.full_throttle,
            summary.throttle_and_brake,
            summary.full_brake,
            summary.coasting,
            summary.tires_spinning,
        )
    });
    std::iter::once(header).chain(rows).join("\n")
}

/// Linear interpolation of `ys` over ascending `xs`. `None` outside the range
/// of `xs`.
pub(crate) fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> Option<f64> {
    let (first, last) = (*xs.first()?, *xs.last()?);
    if x < first || x > last {
        return None;
    }
    let upper = xs.partition_point(|v| *v < x);
    if upper == 0 {
        return ys.first().copied();
    }
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    if x1 == x0 {
        return Some(y1);
    }
    Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}
