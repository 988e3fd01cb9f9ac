// Library interface for gt7-telemetry
// The binary and the integration tests both go through these modules

pub mod analysis;
pub mod config;
pub mod errors;
pub mod laps;
pub mod telemetry;
pub mod writer;

// Re-export commonly used types
pub use config::Gt7Config;
pub use errors::Gt7Error;
pub use laps::{Lap, LapEngine, LapSeries, LoadMode, SeriesField, Session};
pub use telemetry::{
    ConnectionHandle, MockTelemetryProducer, Snapshot, TelemetryProducer, UdpTelemetryProducer,
};
