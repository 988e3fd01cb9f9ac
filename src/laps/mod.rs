pub mod engine;
pub mod segmenter;

pub use engine::{LapEngine, LoadMode};
pub use segmenter::{LapRejection, LapSegmenter, equalize_start, is_new_lap, should_save_lap};

use serde::{Deserialize, Serialize};

use crate::telemetry::Snapshot;

/// Number of telemetry packets the console sends per second.
pub const TICKS_PER_SECOND: f64 = 60.;

/// Per-tick samples recorded while a lap is driven. Every vector grows by one
/// element per accepted tick.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LapSeries {
    /// Throttle input (%)
    pub throttle: Vec<f32>,
    /// Brake input (%)
    pub brake: Vec<f32>,
    /// 1 when neither pedal is pressed
    pub coasting: Vec<u8>,
    /// Car speed (km/h)
    pub speed: Vec<f32>,
    /// Lap live time (s)
    pub time: Vec<f32>,
    pub rpm: Vec<f32>,
    pub gear: Vec<u8>,
    /// Sum of the slip ratio of all four wheels
    pub tires: Vec<f32>,
    pub boost: Vec<f32>,
    pub yaw: Vec<f32>,
    /// Absolute yaw change over the last second
    pub yaw_rate: Vec<f32>,
    pub position_x: Vec<f32>,
    pub position_y: Vec<f32>,
    pub position_z: Vec<f32>,
}

/// How values of a series are combined when several laps are aggregated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregation {
    /// Plain median
    Continuous,
    /// Median rounded back to the integer domain of the series
    Discrete,
}

/// Every per-tick series of a lap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SeriesField {
    Throttle,
    Brake,
    Coasting,
    Speed,
    Time,
    Rpm,
    Gear,
    Tires,
    Boost,
    Yaw,
    YawRate,
    PositionX,
    PositionY,
    PositionZ,
}

impl SeriesField {
    pub const ALL: [SeriesField; 14] = [
        SeriesField::Throttle,
        SeriesField::Brake,
        SeriesField::Coasting,
        SeriesField::Speed,
        SeriesField::Time,
        SeriesField::Rpm,
        SeriesField::Gear,
        SeriesField::Tires,
        SeriesField::Boost,
        SeriesField::Yaw,
        SeriesField::YawRate,
        SeriesField::PositionX,
        SeriesField::PositionY,
        SeriesField::PositionZ,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SeriesField::Throttle => "throttle",
            SeriesField::Brake => "brake",
            SeriesField::Coasting => "coasting",
            SeriesField::Speed => "speed",
            SeriesField::Time => "time",
            SeriesField::Rpm => "rpm",
            SeriesField::Gear => "gear",
            SeriesField::Tires => "tires",
            SeriesField::Boost => "boost",
            SeriesField::Yaw => "yaw",
            SeriesField::YawRate => "yaw_rate",
            SeriesField::PositionX => "position_x",
            SeriesField::PositionY => "position_y",
            SeriesField::PositionZ => "position_z",
        }
    }

    pub fn aggregation(&self) -> Aggregation {
        match self {
            SeriesField::Coasting | SeriesField::Gear => Aggregation::Discrete,
            _ => Aggregation::Continuous,
        }
    }
}

impl LapSeries {
    /// Number of recorded ticks, taken from the speed series.
    pub fn len(&self) -> usize {
        self.speed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_empty()
    }

    /// Length of a single series.
    pub fn len_of(&self, field: SeriesField) -> usize {
        match field {
            SeriesField::Coasting => self.coasting.len(),
            SeriesField::Gear => self.gear.len(),
            _ => self.floats(field).map_or(0, |v| v.len()),
        }
    }

    /// Value of `field` at `tick` as a float, `None` past the end of the series.
    pub fn value(&self, field: SeriesField, tick: usize) -> Option<f32> {
        match field {
            SeriesField::Coasting => self.coasting.get(tick).map(|v| *v as f32),
            SeriesField::Gear => self.gear.get(tick).map(|v| *v as f32),
            _ => self.floats(field).and_then(|v| v.get(tick).copied()),
        }
    }

    /// Appends a value to `field`, rounding it for discrete series.
    pub fn push_value(&mut self, field: SeriesField, value: f32) {
        match field {
            SeriesField::Coasting => self.coasting.push(value.round().clamp(0., 1.) as u8),
            SeriesField::Gear => self.gear.push(value.round().clamp(0., 15.) as u8),
            _ => {
                if let Some(series) = self.floats_mut(field) {
                    series.push(value)
                }
            }
        }
    }

    /// True when every series has the same number of samples.
    pub fn is_aligned(&self) -> bool {
        let expected = self.len();
        SeriesField::ALL
            .iter()
            .all(|field| self.len_of(*field) == expected)
    }

    /// Drops the first `ticks` samples of every series.
    pub fn trim_front(&mut self, ticks: usize) {
        fn trim<T>(series: &mut Vec<T>, ticks: usize) {
            let ticks = ticks.min(series.len());
            series.drain(..ticks);
        }
        trim(&mut self.throttle, ticks);
        trim(&mut self.brake, ticks);
        trim(&mut self.coasting, ticks);
        trim(&mut self.speed, ticks);
        trim(&mut self.time, ticks);
        trim(&mut self.rpm, ticks);
        trim(&mut self.gear, ticks);
        trim(&mut self.tires, ticks);
        trim(&mut self.boost, ticks);
        trim(&mut self.yaw, ticks);
        trim(&mut self.yaw_rate, ticks);
        trim(&mut self.position_x, ticks);
        trim(&mut self.position_y, ticks);
        trim(&mut self.position_z, ticks);
    }

    fn floats(&self, field: SeriesField) -> Option<&Vec<f32>> {
        match field {
            SeriesField::Throttle => Some(&self.throttle),
            SeriesField::Brake => Some(&self.brake),
            SeriesField::Speed => Some(&self.speed),
            SeriesField::Time => Some(&self.time),
            SeriesField::Rpm => Some(&self.rpm),
            SeriesField::Tires => Some(&self.tires),
            SeriesField::Boost => Some(&self.boost),
            SeriesField::Yaw => Some(&self.yaw),
            SeriesField::YawRate => Some(&self.yaw_rate),
            SeriesField::PositionX => Some(&self.position_x),
            SeriesField::PositionY => Some(&self.position_y),
            SeriesField::PositionZ => Some(&self.position_z),
            SeriesField::Coasting | SeriesField::Gear => None,
        }
    }

    fn floats_mut(&mut self, field: SeriesField) -> Option<&mut Vec<f32>> {
        match field {
            SeriesField::Throttle => Some(&mut self.throttle),
            SeriesField::Brake => Some(&mut self.brake),
            SeriesField::Speed => Some(&mut self.speed),
            SeriesField::Time => Some(&mut self.time),
            SeriesField::Rpm => Some(&mut self.rpm),
            SeriesField::Tires => Some(&mut self.tires),
            SeriesField::Boost => Some(&mut self.boost),
            SeriesField::Yaw => Some(&mut self.yaw),
            SeriesField::YawRate => Some(&mut self.yaw_rate),
            SeriesField::PositionX => Some(&mut self.position_x),
            SeriesField::PositionY => Some(&mut self.position_y),
            SeriesField::PositionZ => Some(&mut self.position_z),
            SeriesField::Coasting | SeriesField::Gear => None,
        }
    }
}

/// A lap, either still being recorded or finalized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lap {
    /// Formatted lap time, e.g. `1:23.456`
    pub title: String,
    pub number: i16,
    pub lap_ticks: usize,
    /// Lap time after crossing the line (ms)
    pub lap_finish_time: f64,
    /// Running lap time while driving (s)
    pub lap_live_time: f64,
    pub total_laps: i16,
    pub car_id: i32,
    pub estimated_top_speed: i16,
    /// Recorded while forced recording was enabled, most likely a replay
    pub is_replay: bool,
    /// Finalized on request instead of by crossing the line
    pub is_manual: bool,
    /// Unix time in ms when the lap was finalized
    pub lap_end_timestamp_ms: u64,
    pub fuel_at_start: f32,
    pub fuel_at_end: f32,
    pub fuel_consumed: f32,
    pub full_throttle_ticks: u32,
    pub full_brake_ticks: u32,
    pub throttle_and_brake_ticks: u32,
    pub no_throttle_and_no_brake_ticks: u32,
    pub tires_overheated_ticks: u32,
    pub tires_spinning_ticks: u32,
    pub series: LapSeries,
}

impl Default for Lap {
    fn default() -> Self {
        Self {
            title: String::new(),
            number: 0,
            lap_ticks: 0,
            lap_finish_time: 0.,
            lap_live_time: 0.,
            total_laps: 0,
            car_id: 0,
            estimated_top_speed: 0,
            is_replay: false,
            is_manual: false,
            lap_end_timestamp_ms: 0,
            fuel_at_start: 0.,
            fuel_at_end: -1.,
            fuel_consumed: -1.,
            full_throttle_ticks: 0,
            full_brake_ticks: 0,
            throttle_and_brake_ticks: 0,
            no_throttle_and_no_brake_ticks: 0,
            tires_overheated_ticks: 0,
            tires_spinning_ticks: 0,
            series: LapSeries::default(),
        }
    }
}

impl Lap {
    /// A fresh lap that only knows how much fuel it started with.
    pub fn starting_with_fuel(fuel_at_start: f32) -> Self {
        Self {
            fuel_at_start,
            ..Default::default()
        }
    }

    /// Records one tick. `yaw_window` is the number of ticks over which the
    /// yaw rate is measured.
    pub(crate) fn record_tick(&mut self, snapshot: &Snapshot, special_packet_time: f64, yaw_window: usize) {
        self.lap_ticks += 1;

        if snapshot.is_full_throttle() {
            self.full_throttle_ticks += 1;
        }
        if snapshot.is_full_brake() {
            self.full_brake_ticks += 1;
        }
        if snapshot.is_coasting() {
            self.no_throttle_and_no_brake_ticks += 1;
        }
        if snapshot.is_trail_braking() {
            self.throttle_and_brake_ticks += 1;
        }
        if snapshot.tyres_overheated() {
            self.tires_overheated_ticks += 1;
        }
        if snapshot.tyres_spinning() {
            self.tires_spinning_ticks += 1;
        }

        let series = &mut self.series;
        series.throttle.push(snapshot.throttle_pct());
        series.brake.push(snapshot.brake_pct());
        series.coasting.push(snapshot.is_coasting() as u8);
        series.speed.push(snapshot.car_speed);
        series.rpm.push(snapshot.rpm);
        series.gear.push(snapshot.current_gear);
        series.tires.push(snapshot.slip_composite());
        series.boost.push(snapshot.boost);
        series.position_x.push(snapshot.position.x);
        series.position_y.push(snapshot.position.y);
        series.position_z.push(snapshot.position.z);

        let yaw = snapshot.rotation.yaw;
        series.yaw.push(yaw);
        let samples = series.yaw.len();
        let yaw_rate = if samples > yaw_window {
            (yaw - series.yaw[samples - yaw_window]).abs()
        } else {
            0.
        };
        series.yaw_rate.push(yaw_rate);

        self.lap_live_time =
            self.lap_ticks as f64 / TICKS_PER_SECOND - special_packet_time / 1000.;
        series.time.push(self.lap_live_time as f32);

        self.car_id = snapshot.car_id;
    }

    /// "Lap 3, 1:23.456 (5012 Ticks)"
    pub fn format(&self) -> String {
        format!(
            "Lap {:>2}, {} ({} Ticks)",
            self.number,
            self.title,
            self.series.len()
        )
    }
}

/// Aggregate state across all laps of the current run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Best lap reported by the game (ms), -1 when not set
    pub best_lap: i32,
    /// Lowest ride height seen (mm)
    pub min_body_height: f32,
    /// Highest speed seen (km/h)
    pub max_speed: f32,
    /// Drift between tick-counted and game-reported lap time (ms)
    pub special_packet_time: f64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            best_lap: -1,
            min_body_height: 1_000_000.,
            max_speed: 0.,
            special_packet_time: 0.,
        }
    }
}

// special_packet_time is internal bookkeeping and not part of the identity
impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.best_lap == other.best_lap
            && self.min_body_height == other.min_body_height
            && self.max_speed == other.max_speed
    }
}
