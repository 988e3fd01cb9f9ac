use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gt7_telemetry::analysis;
use gt7_telemetry::laps::{Lap, LapSeries};
use gt7_telemetry::telemetry::{
    Snapshot, decode_packet, encrypt_packet, packet::encode_snapshot,
};
use std::sync::Arc;
use std::time::Duration;

/// A lap of about 90 seconds with a few corners.
fn create_sample_lap(variation: f32, finish_time: f64) -> Lap {
    let ticks = 5400;
    let speed: Vec<f32> = (0..ticks)
        .map(|i| 150. + 80. * (i as f32 / 400.).sin() + variation)
        .collect();
    let time: Vec<f32> = (0..ticks).map(|i| i as f32 / 60.).collect();
    Lap {
        lap_finish_time: finish_time,
        lap_ticks: ticks,
        series: LapSeries {
            throttle: vec![100.; ticks],
            brake: vec![0.; ticks],
            speed,
            time,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn bench_packet_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_operations");

    let snapshot = Snapshot {
        package_id: 1000,
        current_lap: 2,
        car_speed: 180.,
        throttle: 200,
        in_race: true,
        ..Default::default()
    };
    let packet = encrypt_packet(&encode_snapshot(&snapshot), 0xCAFE);

    group.bench_function("decode_packet", |b| {
        b.iter(|| black_box(decode_packet(black_box(&packet))));
    });

    group.finish();
}

fn bench_lap_analytics(c: &mut Criterion) {
    let mut group = c.benchmark_group("lap_analytics");

    let laps: Vec<Arc<Lap>> = (0..5)
        .map(|i| Arc::new(create_sample_lap(i as f32, 90_000. + i as f64 * 100.)))
        .collect();

    group.bench_function("median_lap_5_laps", |b| {
        b.iter(|| black_box(analysis::median_lap(&laps)));
    });

    group.bench_function("time_delta_by_distance", |b| {
        b.iter(|| black_box(analysis::time_delta_by_distance(&laps[0], &laps[1])));
    });

    group.bench_function("speed_extrema", |b| {
        b.iter(|| black_box(analysis::speed_extrema(&laps[0], 100.)));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets = bench_packet_decode, bench_lap_analytics
}
criterion_main!(benches);
