use std::sync::Arc;

use itertools::Itertools;

use crate::laps::Lap;

use super::{distance::distance_axis, interpolate};

/// Laps slower than the fastest lap by more than this share are ignored.
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.05;
pub const DEFAULT_VARIANCE_LAPS: usize = 3;

/// Speed standard deviation along the lap distance.
#[derive(Clone, Debug, Default)]
pub struct SpeedVariance {
    /// (distance, standard deviation of speed) pairs, ordered by distance
    pub points: Vec<(f64, f64)>,
    /// Laps the deviation was computed from, fastest first
    pub laps: Vec<Arc<Lap>>,
}

/// Shows where the fastest laps differ the most. Picks up to `max_laps`
/// recorded laps whose finish time is within `threshold` of the fastest lap
/// and measures the spread of their speed at each distance.
pub fn fastest_laps_variance(laps: &[Arc<Lap>], threshold: f64, max_laps: usize) -> SpeedVariance {
    let candidates = laps
        .iter()
        .filter(|lap| !lap.series.is_empty() && !lap.is_replay)
        .sorted_by(|a, b| a.lap_finish_time.total_cmp(&b.lap_finish_time))
        .collect::<Vec<_>>();
    let Some(fastest) = candidates.first() else {
        return SpeedVariance::default();
    };
    let limit = fastest.lap_finish_time * (1. + threshold);

    let selected: Vec<Arc<Lap>> = candidates
        .iter()
        .copied()
        .filter(|lap| lap.lap_finish_time <= limit)
        .take(max_laps)
        .cloned()
        .collect();

    let profiles: Vec<(Vec<f64>, Vec<f64>)> = selected
        .iter()
        .map(|lap| {
            let speed = lap.series.speed.iter().map(|v| f64::from(*v)).collect();
            (distance_axis(lap), speed)
        })
        .collect();

    let points = profiles
        .iter()
        .flat_map(|(distance, _)| distance.iter().copied())
        .sorted_by(f64::total_cmp)
        .dedup()
        .map(|distance| {
            let speeds: Vec<f64> = profiles
                .iter()
                .filter_map(|(distances, speed)| speed_at(distances, speed, distance))
                .collect();
            (distance, sample_std_dev(&speeds))
        })
        .collect();

    SpeedVariance {
        points,
        laps: selected,
    }
}

/// Speed at `distance`, holding the last value once the lap has ended.
fn speed_at(distances: &[f64], speed: &[f64], distance: f64) -> Option<f64> {
    match distances.last() {
        Some(last) if distance > *last => speed.last().copied(),
        _ => interpolate(distances, speed, distance),
    }
}

/// Sample standard deviation, 0 for fewer than two values.
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}
