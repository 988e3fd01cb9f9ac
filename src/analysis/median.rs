use std::sync::Arc;

use itertools::Itertools;

use crate::laps::{Aggregation, Lap, LapSeries, SeriesField};

use super::{best_lap, filter_max_min_laps, seconds_to_lap_time};

/// Laps slower or faster than the best lap by more than this are not part of
/// the median (ms).
const MEDIAN_WINDOW_MS: f64 = 10_000.;

/// Median of `values`, the mean of the two middle values for an even count.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let sorted = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .sorted_by(f64::total_cmp)
        .collect::<Vec<_>>();
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(sorted[mid]),
        _ => Some((sorted[mid - 1] + sorted[mid]) / 2.),
    }
}

/// Builds a synthetic lap out of the per-tick medians of all laps whose finish
/// time is within ten seconds of the best lap.
///
/// Laps may have different lengths: a tick only takes the laps that reached it
/// into account, so the median lap is as long as the longest lap.
pub fn median_lap(laps: &[Arc<Lap>]) -> Option<Lap> {
    let best = best_lap(laps)?;
    let laps = filter_max_min_laps(
        laps,
        best.lap_finish_time + MEDIAN_WINDOW_MS,
        best.lap_finish_time - MEDIAN_WINDOW_MS,
    );
    if laps.is_empty() {
        return None;
    }

    let mut series = LapSeries::default();
    for field in SeriesField::ALL {
        let ticks = laps
            .iter()
            .map(|lap| lap.series.len_of(field))
            .max()
            .unwrap_or(0);
        for tick in 0..ticks {
            let value = median(
                laps.iter()
                    .filter_map(|lap| lap.series.value(field, tick))
                    .map(f64::from),
            );
            // a tick where every lap has NaN still gets a sample
            let value = match (field.aggregation(), value) {
                (Aggregation::Discrete, None) => 0.,
                (Aggregation::Continuous, None) => f64::NAN,
                (Aggregation::Discrete, Some(value)) => value.round(),
                (Aggregation::Continuous, Some(value)) => value,
            };
            series.push_value(field, value as f32);
        }
    }

    let scalar = |f: fn(&Lap) -> f64| scalar_median(&laps, f);
    let count = |f: fn(&Lap) -> u32| scalar_median(&laps, |lap| f64::from(f(lap))).round() as u32;

    let lap_finish_time = scalar(|lap| lap.lap_finish_time);
    Some(Lap {
        title: format!(
            "Median ({} Laps): {}",
            laps.len(),
            seconds_to_lap_time(lap_finish_time / 1000.)
        ),
        number: 0,
        lap_ticks: scalar(|lap| lap.lap_ticks as f64).round() as usize,
        lap_finish_time,
        lap_live_time: scalar(|lap| lap.lap_live_time),
        total_laps: best.total_laps,
        car_id: best.car_id,
        estimated_top_speed: best.estimated_top_speed,
        fuel_at_start: scalar(|lap| f64::from(lap.fuel_at_start)) as f32,
        fuel_at_end: scalar(|lap| f64::from(lap.fuel_at_end)) as f32,
        fuel_consumed: scalar(|lap| f64::from(lap.fuel_consumed)) as f32,
        full_throttle_ticks: count(|lap| lap.full_throttle_ticks),
        full_brake_ticks: count(|lap| lap.full_brake_ticks),
        throttle_and_brake_ticks: count(|lap| lap.throttle_and_brake_ticks),
        no_throttle_and_no_brake_ticks: count(|lap| lap.no_throttle_and_no_brake_ticks),
        tires_overheated_ticks: count(|lap| lap.tires_overheated_ticks),
        tires_spinning_ticks: count(|lap| lap.tires_spinning_ticks),
        series,
        ..Default::default()
    })
}

fn scalar_median(laps: &[Arc<Lap>], f: impl Fn(&Lap) -> f64) -> f64 {
    median(laps.iter().map(|lap| f(lap))).unwrap_or(0.)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lap(finish: f64, throttle: &[f32], brake: &[f32]) -> Arc<Lap> {
        Arc::new(Lap {
            lap_finish_time: finish,
            series: LapSeries {
                throttle: throttle.to_vec(),
                brake: brake.to_vec(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn sample_laps() -> Vec<Arc<Lap>> {
        vec![
            lap(
                1000.,
                &[0., 50., 75., 100., 100., 100., 55., 0.],
                &[2., 4., 0., -75., 10.],
            ),
            lap(
                1200.,
                &[0., 25., 75., 98., 100., 0., 0., 0.],
                &[4., 8., 0., -25., 10.],
            ),
            lap(1250., &[], &[8., 16., 0., -10.]),
            lap(1250., &[], &[100., 100., 0., -20.]),
        ]
    }

    #[test]
    fn test_median() {
        assert_eq!(median([3., 1., 2.]), Some(2.));
        assert_eq!(median([4., 1., 2., 3.]), Some(2.5));
        assert_eq!(median(Vec::<f64>::new()), None);
        assert_eq!(median([f64::NAN, 5.]), Some(5.));
    }

    #[test]
    fn test_median_lap_scalars() {
        let median = median_lap(&sample_laps()).unwrap();
        assert_eq!(median.lap_finish_time, 1225.);
        assert_eq!(median.title, "Median (4 Laps): 0:01.225");
    }

    #[test]
    fn test_median_lap_series() {
        let median = median_lap(&sample_laps()).unwrap();
        assert_eq!(
            median.series.throttle,
            vec![0., 37.5, 75., 99., 100., 50., 27.5, 0.]
        );
        assert_eq!(median.series.brake, vec![6., 12., 0., -22.5, 10.]);
    }

    #[test]
    fn test_median_lap_three_laps() {
        let a = [0., 50., 75., 100., 100., 100., 55., 0.];
        let b = [0., 25., 75., 98., 100., 0., 0., 0.];
        let laps = vec![lap(1000., &a, &[]), lap(1100., &b, &[]), lap(1200., &a, &[])];
        let median = median_lap(&laps).unwrap();
        assert_eq!(median.series.throttle, a.to_vec());
        assert_eq!(median.lap_finish_time, 1100.);
        assert_eq!(median.title, "Median (3 Laps): 0:01.100");
    }

    #[test]
    fn test_median_lap_excludes_slow_laps() {
        let mut laps = sample_laps();
        laps.push(lap(60_000., &[1., 1., 1., 1., 1., 1., 1., 1., 1.], &[]));
        let median = median_lap(&laps).unwrap();
        assert_eq!(median.lap_finish_time, 1225.);
        assert_eq!(median.series.throttle.len(), 8);
    }

    #[test]
    fn test_median_lap_discrete_series_are_rounded() {
        let laps = vec![
            Arc::new(Lap {
                lap_finish_time: 1000.,
                series: LapSeries {
                    gear: vec![3, 4],
                    ..Default::default()
                },
                ..Default::default()
            }),
            Arc::new(Lap {
                lap_finish_time: 1000.,
                series: LapSeries {
                    gear: vec![4, 4],
                    ..Default::default()
                },
                ..Default::default()
            }),
        ];
        assert_eq!(median_lap(&laps).unwrap().series.gear, vec![4, 4]);
    }

    #[test]
    fn test_median_lap_keeps_ticks_without_values_aligned() {
        let aligned_lap = || {
            let mut series = LapSeries::default();
            for field in SeriesField::ALL {
                series.push_value(field, 1.);
                let second = if field == SeriesField::Speed { f32::NAN } else { 2. };
                series.push_value(field, second);
            }
            Arc::new(Lap {
                lap_finish_time: 1000.,
                series,
                ..Default::default()
            })
        };
        let median = median_lap(&[aligned_lap(), aligned_lap()]).unwrap();
        assert!(median.series.is_aligned());
        assert_eq!(median.series.len(), 2);
        assert_eq!(median.series.speed[0], 1.);
        assert!(median.series.speed[1].is_nan());
        assert_eq!(median.series.throttle, vec![1., 2.]);
    }

    #[test]
    fn test_median_lap_without_laps() {
        assert!(median_lap(&[]).is_none());
    }
}
