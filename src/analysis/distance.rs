use itertools::Itertools;

use crate::laps::Lap;

use super::interpolate;

/// Distance covered in one tick at 1 km/h, scaled to the console's units.
const DISTANCE_PER_TICK: f64 = 16.668 / 3.6 / 1000.;
/// Resolution of the time grid laps are resampled on (ms).
const TIME_GRID_MS: f64 = 10.;

/// Cumulative distance per tick, integrated from the speed series.
pub fn distance_axis(lap: &Lap) -> Vec<f64> {
    let mut distance = 0.;
    lap.series
        .speed
        .iter()
        .enumerate()
        .map(|(i, speed)| {
            if i > 0 {
                distance += f64::from(*speed) * DISTANCE_PER_TICK;
            }
            distance
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeDeltaPoint {
    pub distance: f64,
    /// Time the reference lap needed to reach `distance` (ms)
    pub reference_ms: f64,
    /// Time the comparison lap needed to reach `distance` (ms)
    pub comparison_ms: f64,
    /// Positive when the comparison lap is slower
    pub delta_ms: f64,
}

/// Time gained or lost by `comparison` against `reference` along the distance
/// both laps covered. Empty when either lap has fewer than two samples.
pub fn time_delta_by_distance(reference: &Lap, comparison: &Lap) -> Vec<TimeDeltaPoint> {
    let (Some(reference), Some(comparison)) = (time_by_distance(reference), time_by_distance(comparison))
    else {
        return Vec::new();
    };

    let (ref_distance, ref_time) = reference;
    let (cmp_distance, cmp_time) = comparison;

    ref_distance
        .iter()
        .chain(cmp_distance.iter())
        .copied()
        .sorted_by(f64::total_cmp)
        .dedup()
        .filter_map(|distance| {
            let reference_ms = interpolate(&ref_distance, &ref_time, distance)?;
            let comparison_ms = interpolate(&cmp_distance, &cmp_time, distance)?;
            Some(TimeDeltaPoint {
                distance,
                reference_ms,
                comparison_ms,
                delta_ms: comparison_ms - reference_ms,
            })
        })
        .collect()
}

/// Resamples the distance of a lap onto a regular time grid and returns it as
/// strictly increasing distances with the time they were reached.
fn time_by_distance(lap: &Lap) -> Option<(Vec<f64>, Vec<f64>)> {
    let time: Vec<f64> = lap
        .series
        .time
        .iter()
        .map(|seconds| f64::from(*seconds) * 1000.)
        .collect();
    let distance = distance_axis(lap);
    let samples = time.len().min(distance.len());
    if samples < 2 {
        return None;
    }
    let (time, distance) = (&time[..samples], &distance[..samples]);

    let start = (time[0] / TIME_GRID_MS).ceil() as i64;
    let end = (time[samples - 1] / TIME_GRID_MS).floor() as i64;

    let mut distances = Vec::new();
    let mut times = Vec::new();
    for step in start..=end {
        let t = step as f64 * TIME_GRID_MS;
        let Some(d) = interpolate(time, distance, t) else {
            continue;
        };
        if distances.last().is_none_or(|last| d > *last) {
            distances.push(d);
            times.push(t);
        }
    }

    (distances.len() >= 2).then_some((distances, times))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laps::LapSeries;
    use proptest::prelude::*;

    fn lap(time: &[f32], speed: &[f32]) -> Lap {
        Lap {
            series: LapSeries {
                time: time.to_vec(),
                speed: speed.to_vec(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_distance_axis() {
        let distance = distance_axis(&lap(&[0., 1., 2.], &[100., 36., 72.]));
        assert_eq!(distance.len(), 3);
        assert_eq!(distance[0], 0.);
        assert!((distance[1] - 0.16668).abs() < 1e-9);
        assert!((distance[2] - 0.16668 * 3.).abs() < 1e-9);
    }

    #[test]
    fn test_time_delta_between_laps() {
        let reference = lap(
            &[0., 2., 6., 12., 22., 45., 60., 70.],
            &[0., 50., 55., 100., 120., 30., 20., 50.],
        );
        let comparison = lap(
            &[0., 1., 4., 5., 20., 30., 70., 75.],
            &[0., 40., 35., 90., 85., 50., 20., 5.],
        );

        let delta = time_delta_by_distance(&reference, &comparison);
        assert!(!delta.is_empty());
        for point in &delta {
            assert!((point.delta_ms - (point.comparison_ms - point.reference_ms)).abs() < 1e-9);
        }
        assert!(delta.windows(2).all(|w| w[0].distance < w[1].distance));
    }

    #[test]
    fn test_time_delta_needs_two_samples() {
        let short = lap(&[0.], &[10.]);
        let full = lap(&[0., 1., 2.], &[10., 10., 10.]);
        assert!(time_delta_by_distance(&short, &full).is_empty());
        assert!(time_delta_by_distance(&full, &short).is_empty());
    }

    proptest! {
        #[test]
        fn test_constant_time_shift_gives_constant_delta(
            speeds in proptest::collection::vec(10f32..300., 20..80),
            shift_steps in 1u32..100,
        ) {
            let shift = shift_steps as f32 * 0.01;
            let time: Vec<f32> = (0..speeds.len()).map(|i| i as f32 * 0.5).collect();
            let shifted: Vec<f32> = time.iter().map(|t| t + shift).collect();

            let delta = time_delta_by_distance(&lap(&time, &speeds), &lap(&shifted, &speeds));
            prop_assert!(!delta.is_empty());
            for point in delta {
                prop_assert!((point.delta_ms - f64::from(shift) * 1000.).abs() < 1.);
            }
        }
    }
}
