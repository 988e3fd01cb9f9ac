use crate::laps::Lap;

/// Fuel mixture settings the console offers, from richest to leanest.
pub const FUEL_MAP_SETTINGS: std::ops::RangeInclusive<i32> = -5..=5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuelConsumption {
    pub consumed_per_lap: f32,
    pub laps_remaining: f32,
    /// Time the remaining fuel lasts at the given lap time (ms)
    pub time_remaining_ms: f64,
}

/// Projects how long the fuel left at the end of a lap lasts. `None` when no
/// fuel was consumed.
pub fn calculate_remaining_fuel(
    fuel_start: f32,
    fuel_end: f32,
    lap_time_ms: f64,
) -> Option<FuelConsumption> {
    let consumed_per_lap = fuel_start - fuel_end;
    if consumed_per_lap <= 0. {
        return None;
    }
    let laps_remaining = fuel_end / consumed_per_lap;
    Some(FuelConsumption {
        consumed_per_lap,
        laps_remaining,
        time_remaining_ms: f64::from(laps_remaining) * lap_time_ms,
    })
}

/// Projected effect of one fuel mixture setting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuelMap {
    pub mixture_setting: i32,
    pub power_percentage: f64,
    pub consumption_percentage: f64,
    pub fuel_consumed_per_lap: f64,
    pub laps_remaining_on_current_fuel: Option<f64>,
    pub time_remaining_on_current_fuel: Option<f64>,
    pub lap_time_diff: f64,
    pub lap_time_expected: f64,
}

impl FuelMap {
    fn new(mixture_setting: i32, lap: &Lap, consumption: Option<FuelConsumption>) -> Self {
        let power_percentage = f64::from(100 - mixture_setting * 4) / 100.;
        let consumption_percentage = f64::from(100 - mixture_setting * 8) / 100.;
        let saving = 1. - consumption_percentage;

        let lap_time_diff = lap.lap_finish_time * (1. - power_percentage);

        Self {
            mixture_setting,
            power_percentage,
            consumption_percentage,
            fuel_consumed_per_lap: consumption
                .map_or(0., |c| f64::from(c.consumed_per_lap) * consumption_percentage),
            laps_remaining_on_current_fuel: consumption.map(|c| {
                let laps = f64::from(c.laps_remaining);
                laps + laps * saving
            }),
            time_remaining_on_current_fuel: consumption
                .map(|c| c.time_remaining_ms + c.time_remaining_ms * saving),
            lap_time_diff,
            lap_time_expected: lap.lap_finish_time + lap_time_diff,
        }
    }
}

/// Fuel and lap time projection for every mixture setting, based on the fuel
/// consumption and finish time of `lap`.
pub fn fuel_projection(lap: &Lap) -> Vec<FuelMap> {
    let consumption = calculate_remaining_fuel(lap.fuel_at_start, lap.fuel_at_end, lap.lap_finish_time);
    FUEL_MAP_SETTINGS
        .map(|setting| FuelMap::new(setting, lap, consumption))
        .collect()
}
