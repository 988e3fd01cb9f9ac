use std::{
    mem,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use snafu::Snafu;

use crate::{analysis::seconds_to_lap_time, telemetry::Snapshot};

use super::{Lap, Session, TICKS_PER_SECOND};

/// Laps shorter than this are never kept (s).
pub const MIN_LAP_LIVE_TIME_S: f64 = 5.;
/// Ticks over which the yaw rate is measured.
const YAW_RATE_WINDOW: usize = 60;

/// Why a finished lap was not stored.
#[derive(Debug, Snafu, PartialEq)]
pub enum LapRejection {
    #[snafu(display("lap index was {lap}, the lap never started"))]
    NotStarted { lap: i16 },
    #[snafu(display("not in a race and not recording replays"))]
    NotRacing,
    #[snafu(display("live time {live_time:.3}s is too short"))]
    TooShort { live_time: f64 },
    #[snafu(display("no telemetry was recorded"))]
    NoSamples,
}

/// A lap ends when either the lap index or the total lap count changes.
pub fn is_new_lap(previous: &Snapshot, current: &Snapshot) -> bool {
    previous.current_lap != current.current_lap || previous.total_laps != current.total_laps
}

/// Decides whether `lap`, which ended right after `previous`, goes into the
/// lap history.
pub fn should_save_lap(
    previous: &Snapshot,
    lap: &Lap,
    always_record: bool,
) -> Result<(), LapRejection> {
    if previous.current_lap <= 0 {
        return Err(LapRejection::NotStarted {
            lap: previous.current_lap,
        });
    }
    if !previous.in_race && !always_record {
        return Err(LapRejection::NotRacing);
    }
    if lap.lap_live_time < MIN_LAP_LIVE_TIME_S {
        return Err(LapRejection::TooShort {
            live_time: lap.lap_live_time,
        });
    }
    if lap.series.is_empty() {
        return Err(LapRejection::NoSamples);
    }
    Ok(())
}

/// Cuts the beginning of `lap` so that it starts where `reference` starts.
///
/// The first tick whose position equals the first position of the reference
/// (rounded to the millimetre) becomes the new first tick. Returns the number
/// of dropped ticks. The lap time is left untouched.
pub fn equalize_start(reference: &Lap, lap: &mut Lap) -> usize {
    let round = |v: f32| (v as f64 * 1000.).round() as i64;
    let reference_series = &reference.series;
    if reference_series.position_x.is_empty() {
        return 0;
    }
    let start = (
        round(reference_series.position_x[0]),
        round(reference_series.position_y[0]),
        round(reference_series.position_z[0]),
    );

    let series = &lap.series;
    let range = series
        .position_x
        .len()
        .min(series.position_y.len())
        .min(series.position_z.len())
        .min(reference_series.position_x.len());
    let cut = (0..range).find(|i| {
        (
            round(series.position_x[*i]),
            round(series.position_y[*i]),
            round(series.position_z[*i]),
        ) == start
    });

    match cut {
        Some(cut) if cut > 0 => {
            debug!("Aligning lap start, dropping {} ticks", cut);
            lap.series.trim_front(cut);
            lap.lap_ticks = lap.series.len();
            cut
        }
        _ => 0,
    }
}

/// Turns the stream of snapshots into laps.
///
/// Holds the session aggregate, the lap being recorded, the last snapshot and
/// the history of finalized laps, newest first.
pub struct LapSegmenter {
    session: Session,
    active: Lap,
    last: Option<Snapshot>,
    history: Vec<Arc<Lap>>,
    always_record: bool,
    reference: Option<Arc<Lap>>,
}

impl Default for LapSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl LapSegmenter {
    pub fn new() -> Self {
        Self {
            session: Session::default(),
            active: Lap::default(),
            last: None,
            history: Vec::new(),
            always_record: false,
            reference: None,
        }
    }

    /// Applies one accepted snapshot. Returns the lap that was finalized by
    /// it, if any.
    pub fn update(&mut self, snapshot: Snapshot) -> Option<Arc<Lap>> {
        let previous = self.last.take().unwrap_or_default();

        if snapshot.current_lap == 0 {
            self.session.special_packet_time = 0.;
        }

        let mut finalized = None;
        if is_new_lap(&previous, &snapshot) {
            debug!(
                "New lap {}/{} -> {}/{}",
                previous.current_lap, previous.total_laps, snapshot.current_lap, snapshot.total_laps
            );
            self.session.special_packet_time += snapshot.last_lap as f64
                - self.active.lap_ticks as f64 * 1000. / TICKS_PER_SECOND;
            self.session.best_lap = snapshot.best_lap;

            self.active.lap_finish_time = if snapshot.last_lap > 0 {
                snapshot.last_lap as f64
            } else {
                self.active.lap_live_time * 1000.
            };

            match should_save_lap(&previous, &self.active, self.always_record) {
                Ok(()) => {
                    finalized = Some(self.finish_lap(&previous, snapshot.current_fuel, false));
                }
                Err(reason) => info!("Lap not saved: {}", reason),
            }
            self.active = Lap::starting_with_fuel(snapshot.current_fuel);
        }

        self.record(&snapshot);
        self.last = Some(snapshot);
        finalized
    }

    /// Finalizes the lap being recorded right now, using its live time as
    /// the lap time.
    pub fn finalize_now(&mut self) -> Option<Arc<Lap>> {
        if self.active.series.is_empty() {
            info!("Lap not saved: {}", LapRejection::NoSamples);
            return None;
        }
        let last = self.last.clone().unwrap_or_default();
        self.active.lap_finish_time = self.active.lap_live_time * 1000.;
        let lap = self.finish_lap(&last, last.current_fuel, true);
        self.active = Lap::starting_with_fuel(last.current_fuel);
        Some(lap)
    }

    fn record(&mut self, snapshot: &Snapshot) {
        if snapshot.is_paused {
            return;
        }

        if snapshot.current_lap <= 0 || !(snapshot.in_race || self.always_record) {
            if self.active.lap_ticks > 0 {
                debug!("Out of lap, discarding {} ticks", self.active.lap_ticks);
                self.active = Lap::starting_with_fuel(self.active.fuel_at_start);
            }
            return;
        }

        if snapshot.body_height < self.session.min_body_height {
            self.session.min_body_height = snapshot.body_height;
        }
        if snapshot.car_speed > self.session.max_speed {
            self.session.max_speed = snapshot.car_speed;
        }

        self.active
            .record_tick(snapshot, self.session.special_packet_time, YAW_RATE_WINDOW);
    }

    fn finish_lap(&mut self, previous: &Snapshot, fuel_now: f32, manual: bool) -> Arc<Lap> {
        let mut lap = mem::take(&mut self.active);

        lap.is_replay = self.always_record;
        lap.is_manual = manual;
        lap.fuel_at_end = fuel_now;
        lap.fuel_consumed = lap.fuel_at_start - lap.fuel_at_end;
        lap.total_laps = previous.total_laps;
        lap.car_id = previous.car_id;
        lap.estimated_top_speed = previous.estimated_top_speed;
        lap.number = previous.current_lap;
        lap.title = seconds_to_lap_time(lap.lap_finish_time / 1000.);
        lap.lap_end_timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        if let Some(reference) = &self.reference {
            equalize_start(reference, &mut lap);
        }

        info!(
            "Lap {} saved: {} ({} ticks)",
            lap.number,
            lap.title,
            lap.series.len()
        );
        let lap = Arc::new(lap);
        self.history.insert(0, lap.clone());
        lap
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn laps(&self) -> &[Arc<Lap>] {
        &self.history
    }

    pub fn active_lap(&self) -> &Lap {
        &self.active
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    pub fn always_record(&self) -> bool {
        self.always_record
    }

    pub fn set_always_record(&mut self, always_record: bool) {
        self.always_record = always_record;
    }

    pub fn set_reference_lap(&mut self, reference: Option<Arc<Lap>>) {
        self.reference = reference;
    }

    pub(crate) fn history_mut(&mut self) -> &mut Vec<Arc<Lap>> {
        &mut self.history
    }

    /// Forgets everything: session, laps, the lap being recorded and the
    /// last snapshot.
    pub fn reset(&mut self) {
        self.session = Session::default();
        self.active = Lap::default();
        self.last = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Vector3;
    use proptest::prelude::*;

    fn racing(package_id: i32, current_lap: i16) -> Snapshot {
        Snapshot {
            package_id,
            current_lap,
            total_laps: 3,
            in_race: true,
            throttle: 255,
            car_speed: 150.,
            body_height: 80.,
            current_fuel: 100. - package_id as f32 * 0.001,
            car_id: 1234,
            estimated_top_speed: 280,
            ..Default::default()
        }
    }

    fn lap_with_live_time(live_time: f64, samples: usize) -> Lap {
        let mut lap = Lap::default();
        lap.lap_live_time = live_time;
        lap.series.speed = vec![100.; samples];
        lap
    }

    /// Drives `ticks` ticks of lap `lap` starting at package `start`.
    fn drive(segmenter: &mut LapSegmenter, start: i32, lap: i16, ticks: i32) -> Vec<Arc<Lap>> {
        (start..start + ticks)
            .filter_map(|id| segmenter.update(racing(id, lap)))
            .collect()
    }

    #[test]
    fn test_is_new_lap() {
        let a = racing(1, 1);
        assert!(!is_new_lap(&a, &racing(2, 1)));
        assert!(is_new_lap(&a, &racing(2, 2)));
        let mut retry = racing(2, 1);
        retry.total_laps = 5;
        assert!(is_new_lap(&a, &retry));
    }

    #[test]
    fn test_should_save_lap_rejects_lap_zero() {
        let lap = lap_with_live_time(90., 5000);
        assert_eq!(
            should_save_lap(&racing(1, 0), &lap, true),
            Err(LapRejection::NotStarted { lap: 0 })
        );
    }

    #[test]
    fn test_should_save_lap_live_time_threshold() {
        let previous = racing(1, 1);
        assert_eq!(
            should_save_lap(&previous, &lap_with_live_time(4.999, 300), false),
            Err(LapRejection::TooShort { live_time: 4.999 })
        );
        assert_eq!(
            should_save_lap(&previous, &lap_with_live_time(5.0, 300), false),
            Ok(())
        );
    }

    #[test]
    fn test_should_save_lap_requires_race_or_replay() {
        let mut previous = racing(1, 1);
        previous.in_race = false;
        let lap = lap_with_live_time(60., 3600);
        assert_eq!(
            should_save_lap(&previous, &lap, false),
            Err(LapRejection::NotRacing)
        );
        assert_eq!(should_save_lap(&previous, &lap, true), Ok(()));
    }

    #[test]
    fn test_should_save_lap_requires_samples() {
        assert_eq!(
            should_save_lap(&racing(1, 1), &lap_with_live_time(10., 0), false),
            Err(LapRejection::NoSamples)
        );
    }

    #[test]
    fn test_lap_is_saved_on_boundary() {
        let mut segmenter = LapSegmenter::new();
        assert!(drive(&mut segmenter, 1, 1, 600).is_empty());

        let mut crossing = racing(601, 2);
        crossing.last_lap = 10_000;
        crossing.best_lap = 10_000;
        let lap = segmenter.update(crossing).unwrap();

        assert_eq!(lap.number, 1);
        assert_eq!(lap.lap_finish_time, 10_000.);
        assert_eq!(lap.title, "0:10.000");
        assert_eq!(lap.lap_ticks, 600);
        assert_eq!(lap.series.len(), 600);
        assert!(lap.series.is_aligned());
        assert_eq!(lap.full_throttle_ticks, 600);
        assert_eq!(lap.car_id, 1234);
        assert_eq!(lap.total_laps, 3);
        assert_eq!(lap.estimated_top_speed, 280);
        assert!(!lap.is_replay);
        assert!(!lap.is_manual);
        assert!(lap.fuel_consumed > 0.);
        assert_eq!(segmenter.session().best_lap, 10_000);
        assert_eq!(segmenter.session().max_speed, 150.);
        assert_eq!(segmenter.session().min_body_height, 80.);
        assert_eq!(segmenter.laps().len(), 1);

        // the next lap starts with the fuel of the crossing snapshot
        assert_eq!(
            segmenter.active_lap().fuel_at_start,
            100. - 601. * 0.001
        );
        assert_eq!(segmenter.active_lap().lap_ticks, 1);
    }

    #[test]
    fn test_special_packet_time_corrects_live_time() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 600);
        // the game says the lap took 10.5s, we counted 10s of ticks
        let mut crossing = racing(601, 2);
        crossing.last_lap = 10_500;
        segmenter.update(crossing);
        assert!((segmenter.session().special_packet_time - 500.).abs() < 1e-9);
        // one tick into the new lap: 1/60 s minus the 0.5 s correction
        let live = segmenter.active_lap().lap_live_time;
        assert!((live - (1. / 60. - 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_lap_index_zero_resets_special_packet_time() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 60);
        let mut crossing = racing(61, 2);
        crossing.last_lap = 5_000;
        segmenter.update(crossing);
        assert!(segmenter.session().special_packet_time != 0.);
        // the change to lap 0 is itself a boundary and adds a correction
        segmenter.update(racing(62, 0));
        segmenter.update(racing(63, 0));
        assert_eq!(segmenter.session().special_packet_time, 0.);
    }

    #[test]
    fn test_newest_lap_first() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 600);
        drive(&mut segmenter, 601, 2, 600);
        drive(&mut segmenter, 1201, 3, 600);
        let numbers: Vec<i16> = segmenter.laps().iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![2, 1]);
    }

    #[test]
    fn test_short_lap_is_discarded() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 200);
        assert!(segmenter.update(racing(201, 2)).is_none());
        assert!(segmenter.laps().is_empty());
    }

    #[test]
    fn test_paused_snapshots_are_not_recorded() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 10);
        let mut paused = racing(11, 1);
        paused.is_paused = true;
        segmenter.update(paused);
        assert_eq!(segmenter.active_lap().lap_ticks, 10);
        assert!(segmenter.last_snapshot().unwrap().is_paused);
    }

    #[test]
    fn test_out_of_lap_discards_active_lap() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 10);
        let mut menu = racing(11, 1);
        menu.in_race = false;
        segmenter.update(menu);
        assert_eq!(segmenter.active_lap().lap_ticks, 0);
        assert!(segmenter.active_lap().series.is_empty());
    }

    #[test]
    fn test_always_record_saves_replays() {
        let mut segmenter = LapSegmenter::new();
        segmenter.set_always_record(true);
        for id in 1..=600 {
            let mut snapshot = racing(id, 1);
            snapshot.in_race = false;
            segmenter.update(snapshot);
        }
        let mut crossing = racing(601, 2);
        crossing.in_race = false;
        crossing.last_lap = 10_000;
        let lap = segmenter.update(crossing).unwrap();
        assert!(lap.is_replay);
    }

    #[test]
    fn test_finalize_now() {
        let mut segmenter = LapSegmenter::new();
        assert!(segmenter.finalize_now().is_none());

        drive(&mut segmenter, 1, 1, 120);
        let lap = segmenter.finalize_now().unwrap();
        assert!(lap.is_manual);
        assert!((lap.lap_finish_time - 2000.).abs() < 1e-6);
        assert_eq!(lap.title, "0:02.000");
        assert_eq!(segmenter.laps().len(), 1);
        assert_eq!(segmenter.active_lap().lap_ticks, 0);
    }

    #[test]
    fn test_reset() {
        let mut segmenter = LapSegmenter::new();
        drive(&mut segmenter, 1, 1, 600);
        drive(&mut segmenter, 601, 2, 1);
        segmenter.reset();
        assert!(segmenter.laps().is_empty());
        assert!(segmenter.last_snapshot().is_none());
        assert_eq!(segmenter.session(), &Session::default());
    }

    fn positioned_lap(positions: &[(f32, f32, f32)]) -> Lap {
        let mut lap = Lap::default();
        for (i, (x, y, z)) in positions.iter().enumerate() {
            let snapshot = Snapshot {
                position: Vector3 { x: *x, y: *y, z: *z },
                car_speed: i as f32,
                ..Default::default()
            };
            lap.record_tick(&snapshot, 0., YAW_RATE_WINDOW);
        }
        lap
    }

    #[test]
    fn test_equalize_start_cuts_to_reference_start() {
        let reference = positioned_lap(&[(1., 2., 3.), (1.5, 2., 3.), (2., 2., 3.)]);
        let mut lap = positioned_lap(&[
            (0.5, 2., 3.),
            (0.9, 2., 3.),
            (1.0001, 2.0004, 2.9996),
            (1.5, 2., 3.),
        ]);
        lap.lap_finish_time = 12_345.;

        assert_eq!(equalize_start(&reference, &mut lap), 2);
        assert_eq!(lap.lap_ticks, 2);
        assert_eq!(lap.series.speed, vec![2., 3.]);
        assert!(lap.series.is_aligned());
        assert_eq!(lap.lap_finish_time, 12_345.);
    }

    #[test]
    fn test_equalize_start_without_match_keeps_lap() {
        let reference = positioned_lap(&[(1., 2., 3.)]);
        let mut lap = positioned_lap(&[(5., 5., 5.), (1., 5., 5.)]);
        assert_eq!(equalize_start(&reference, &mut lap), 0);
        assert_eq!(lap.series.len(), 2);
    }

    #[test]
    fn test_reference_lap_aligns_finalized_laps() {
        let mut segmenter = LapSegmenter::new();
        let reference = positioned_lap(&[(10., 0., 10.); 400]);
        segmenter.set_reference_lap(Some(Arc::new(reference)));

        for id in 1..=400 {
            let mut snapshot = racing(id, 1);
            if id >= 5 {
                snapshot.position = Vector3 { x: 10., y: 0., z: 10. };
            }
            segmenter.update(snapshot);
        }
        let mut crossing = racing(401, 2);
        crossing.last_lap = 6_000;
        let lap = segmenter.update(crossing).unwrap();
        assert_eq!(lap.series.len(), 396);
        assert_eq!(lap.lap_ticks, 396);
        assert_eq!(lap.lap_finish_time, 6_000.);
    }

    proptest! {
        #[test]
        fn prop_finalized_laps_are_always_aligned(
            lap_lengths in proptest::collection::vec(1usize..800, 1..6),
            pause_every in 2usize..50,
        ) {
            let mut segmenter = LapSegmenter::new();
            let mut package_id = 1;
            for (lap_index, length) in lap_lengths.iter().enumerate() {
                for tick in 0..*length {
                    let mut snapshot = racing(package_id, lap_index as i16 + 1);
                    snapshot.is_paused = tick % pause_every == 0;
                    segmenter.update(snapshot);
                    package_id += 1;
                }
            }
            segmenter.finalize_now();
            for lap in segmenter.laps() {
                prop_assert!(lap.series.is_aligned());
                prop_assert_eq!(lap.lap_ticks, lap.series.len());
                prop_assert!(!lap.series.is_empty());
            }
        }
    }
}
