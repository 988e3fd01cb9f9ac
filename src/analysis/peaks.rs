use crate::laps::Lap;

/// Default minimum width (in ticks) of a speed peak or valley.
pub const DEFAULT_MIN_WIDTH: f64 = 100.;

/// Local speed maxima and minima of a lap as (speed, tick) pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeedExtrema {
    pub peaks: Vec<(f32, usize)>,
    pub valleys: Vec<(f32, usize)>,
}

/// Finds the fastest points before braking and the slowest points of corners.
pub fn speed_extrema(lap: &Lap, min_width: f64) -> SpeedExtrema {
    let speed: Vec<f64> = lap.series.speed.iter().map(|v| f64::from(*v)).collect();
    let inverted: Vec<f64> = speed.iter().map(|v| -v).collect();

    let pick = |indices: Vec<usize>| {
        indices
            .into_iter()
            .map(|i| (lap.series.speed[i], i))
            .collect::<Vec<_>>()
    };

    SpeedExtrema {
        peaks: pick(find_peaks(&speed, min_width)),
        valleys: pick(find_peaks(&inverted, min_width)),
    }
}

/// Indices of the local maxima of `x` that are at least `min_width` samples
/// wide, measured at half of their prominence. Flat peaks report their middle
/// sample.
pub fn find_peaks(x: &[f64], min_width: f64) -> Vec<usize> {
    local_maxima(x)
        .into_iter()
        .filter(|peak| {
            let (prominence, left_base, right_base) = prominence(x, *peak);
            width(x, *peak, prominence, left_base, right_base) >= min_width
        })
        .collect()
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Prominence of `peak` and the bases it is measured from.
fn prominence(x: &[f64], peak: usize) -> (f64, usize, usize) {
    let height = x[peak];

    let (mut left_min, mut left_base) = (height, peak);
    for i in (0..=peak).rev() {
        if x[i] > height {
            break;
        }
        if x[i] < left_min {
            left_min = x[i];
            left_base = i;
        }
    }

    let (mut right_min, mut right_base) = (height, peak);
    for (i, value) in x.iter().enumerate().skip(peak) {
        if *value > height {
            break;
        }
        if *value < right_min {
            right_min = *value;
            right_base = i;
        }
    }

    (height - left_min.max(right_min), left_base, right_base)
}

/// Width of `peak` at half its prominence, interpolated between samples.
fn width(x: &[f64], peak: usize, prominence: f64, left_base: usize, right_base: usize) -> f64 {
    let height = x[peak] - prominence / 2.;

    let mut i = peak;
    while left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left = i as f64;
    if x[i] < height {
        left += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < right_base && height < x[i] {
        i += 1;
    }
    let mut right = i as f64;
    if x[i] < height {
        right -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    right - left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laps::LapSeries;

    #[test]
    fn test_find_peaks() {
        let data = [
            0., 2., 3., 5., 5., 4.5, 3., 6., 7., 8., 7., 8., 3., 2.,
        ];
        assert_eq!(find_peaks(&data, 1.), vec![3, 9, 11]);
    }

    #[test]
    fn test_find_peaks_filters_narrow_peaks() {
        let data = [0., 1., 0., 0., 1., 2., 3., 4., 3., 2., 1., 0.];
        assert_eq!(find_peaks(&data, 3.), vec![7]);
    }

    #[test]
    fn test_find_peaks_short_series() {
        assert!(find_peaks(&[], 1.).is_empty());
        assert!(find_peaks(&[1., 2.], 1.).is_empty());
    }

    #[test]
    fn test_speed_extrema_single_bump() {
        let mut speed = vec![100.; 600];
        for (i, value) in speed.iter_mut().enumerate().take(450).skip(150) {
            let offset = (i as f32 - 300.).abs();
            *value = 250. - offset * 0.5;
        }
        let lap = Lap {
            series: LapSeries {
                speed,
                ..Default::default()
            },
            ..Default::default()
        };

        let extrema = speed_extrema(&lap, DEFAULT_MIN_WIDTH);
        assert_eq!(extrema.peaks, vec![(250., 300)]);
        assert!(extrema.valleys.is_empty());
    }
}
