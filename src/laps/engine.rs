use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;

use crate::telemetry::Snapshot;

use super::{Lap, LapSegmenter, Session};

/// Where laps loaded from elsewhere end up in the history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// After the existing laps (older)
    Append,
    /// Before the existing laps (newer)
    Prepend,
    /// Instead of the existing laps
    Replace,
}

/// Shared handle to the lap segmenter.
///
/// The ingest thread calls [`LapEngine::ingest`], any other thread reads the
/// laps, the session and the last snapshot. Every operation holds the same
/// lock, so a reader never sees a lap halfway through being finalized.
#[derive(Clone, Default)]
pub struct LapEngine {
    inner: Arc<Mutex<LapSegmenter>>,
}

impl LapEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LapSegmenter> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds one accepted snapshot to the segmenter.
    pub fn ingest(&self, snapshot: Snapshot) -> Option<Arc<Lap>> {
        self.lock().update(snapshot)
    }

    /// Finalized laps, newest first.
    pub fn laps(&self) -> Vec<Arc<Lap>> {
        self.lock().laps().to_vec()
    }

    pub fn lap_count(&self) -> usize {
        self.lock().laps().len()
    }

    pub fn session(&self) -> Session {
        self.lock().session().clone()
    }

    pub fn last_snapshot(&self) -> Option<Snapshot> {
        self.lock().last_snapshot().cloned()
    }

    /// Live time of the lap being recorded (s).
    pub fn live_time(&self) -> f64 {
        self.lock().active_lap().lap_live_time
    }

    /// Copy of the lap being recorded.
    pub fn active_lap(&self) -> Lap {
        self.lock().active_lap().clone()
    }

    pub fn finalize_now(&self) -> Option<Arc<Lap>> {
        self.lock().finalize_now()
    }

    pub fn set_always_record(&self, always_record: bool) {
        self.lock().set_always_record(always_record)
    }

    pub fn set_reference_lap(&self, reference: Option<Arc<Lap>>) {
        self.lock().set_reference_lap(reference)
    }

    pub fn load_laps(&self, laps: Vec<Lap>, mode: LoadMode) {
        let laps: Vec<Arc<Lap>> = laps
            .into_iter()
            .filter(|lap| {
                let aligned = lap.series.is_aligned();
                if !aligned {
                    warn!("Skipping lap {} with series of different lengths", lap.number);
                }
                aligned
            })
            .map(Arc::new)
            .collect();
        let mut segmenter = self.lock();
        let history = segmenter.history_mut();
        match mode {
            LoadMode::Append => history.extend(laps),
            LoadMode::Prepend => {
                history.splice(0..0, laps);
            }
            LoadMode::Replace => *history = laps,
        }
    }

    pub fn reset(&self) {
        self.lock().reset()
    }
}
