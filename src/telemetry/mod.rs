pub mod collector;
pub mod packet;
pub mod producer;

pub use collector::{collect_telemetry, spawn_collector};
pub use packet::{decode_packet, decrypt_packet, encrypt_packet, PACKET_SIZE};
pub use producer::{ConnectionHandle, MockTelemetryProducer, TelemetryProducer, UdpTelemetryProducer};

use serde::{Deserialize, Serialize};

/// Speed above which a wheel is considered spinning relative to the car.
pub const SLIP_RATIO_SPIN_THRESHOLD: f32 = 1.1;

/// One value per corner of the car.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Wheels<T> {
    pub front_left: T,
    pub front_right: T,
    pub rear_left: T,
    pub rear_right: T,
}

impl<T: Copy> Wheels<T> {
    pub fn new(front_left: T, front_right: T, rear_left: T, rear_right: T) -> Self {
        Self {
            front_left,
            front_right,
            rear_left,
            rear_right,
        }
    }

    /// Values in FL, FR, RL, RR order.
    pub fn to_array(&self) -> [T; 4] {
        [
            self.front_left,
            self.front_right,
            self.rear_left,
            self.rear_right,
        ]
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Wheels<U> {
        Wheels::new(
            f(self.front_left),
            f(self.front_right),
            f(self.rear_left),
            f(self.rear_right),
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// Packet fields whose meaning is not known. They are kept verbatim so that
/// nothing in the packet is silently discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservedFields {
    /// 0x28, sits right after the rotation triple
    pub rotation_extra: f32,
    /// 0x8F, second flag byte
    pub secondary_flags: u8,
    /// 0x93
    pub byte_93: u8,
    /// 0x94..0xA4
    pub floats_94: [f32; 4],
    /// 0xD4..0xF4
    pub floats_d4: [f32; 8],
    /// 0x100, reported next to the gear ratios
    pub gear_extra: f32,
}

/// One decoded telemetry packet.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic packet counter assigned by the console
    pub package_id: i32,
    /// World position (m)
    pub position: Vector3,
    /// World velocity (m/s)
    pub velocity: Vector3,
    pub rotation: Rotation,
    pub angular_velocity: Vector3,
    /// Ride height (mm)
    pub body_height: f32,
    pub rpm: f32,
    /// Fuel in litres, or battery charge for electric cars
    pub current_fuel: f32,
    pub fuel_capacity: f32,
    /// Car speed (km/h)
    pub car_speed: f32,
    /// Turbo boost (bar), zero when naturally aspirated
    pub boost: f32,
    pub oil_pressure: f32,
    pub water_temp: f32,
    pub oil_temp: f32,
    /// Tyre surface temperature (°C)
    pub tyre_temp: Wheels<f32>,
    /// Lap currently driven, 0 before the start line
    pub current_lap: i16,
    pub total_laps: i16,
    /// Best lap time in ms, -1 when none is set
    pub best_lap: i32,
    /// Last lap time in ms, -1 when none is set
    pub last_lap: i32,
    /// Time of day on track (ms)
    pub time_on_track_ms: i32,
    pub current_position: i16,
    pub total_positions: i16,
    pub rpm_rev_warning: u16,
    pub rpm_rev_limiter: u16,
    pub estimated_top_speed: i16,
    /// Raw status byte at 0x8E
    pub flags: u8,
    pub in_race: bool,
    pub is_paused: bool,
    pub current_gear: u8,
    pub suggested_gear: u8,
    /// Raw throttle input, 0-255
    pub throttle: u8,
    /// Raw brake input, 0-255
    pub brake: u8,
    /// Wheel angular velocity (rad/s)
    pub wheel_rps: Wheels<f32>,
    /// Tyre radius (m)
    pub tyre_radius: Wheels<f32>,
    /// Tyre diameter (cm)
    pub tyre_diameter: Wheels<f32>,
    /// Wheel linear speed (km/h)
    pub wheel_speed: Wheels<f32>,
    /// Wheel speed over car speed
    pub slip_ratio: Wheels<f32>,
    pub suspension_height: Wheels<f32>,
    pub clutch: f32,
    pub clutch_engaged: f32,
    pub rpm_after_clutch: f32,
    pub gear_ratios: [f32; 8],
    pub car_id: i32,
    pub reserved: ReservedFields,
}

impl Snapshot {
    /// Throttle input in percent.
    pub fn throttle_pct(&self) -> f32 {
        self.throttle as f32 / 2.55
    }

    /// Brake input in percent.
    pub fn brake_pct(&self) -> f32 {
        self.brake as f32 / 2.55
    }

    pub fn is_full_throttle(&self) -> bool {
        self.throttle == u8::MAX
    }

    pub fn is_full_brake(&self) -> bool {
        self.brake == u8::MAX
    }

    pub fn is_coasting(&self) -> bool {
        self.throttle == 0 && self.brake == 0
    }

    pub fn is_trail_braking(&self) -> bool {
        self.throttle > 0 && self.brake > 0
    }

    pub fn tyres_overheated(&self) -> bool {
        self.tyre_temp.to_array().iter().any(|t| *t > 100.)
    }

    pub fn tyres_spinning(&self) -> bool {
        self.slip_ratio
            .to_array()
            .iter()
            .any(|r| *r > SLIP_RATIO_SPIN_THRESHOLD)
    }

    /// Sum of the four slip ratios.
    pub fn slip_composite(&self) -> f32 {
        self.slip_ratio.to_array().iter().sum()
    }
}
