// Error types for gt7-telemetry

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum Gt7Error {
    // Errors for the UDP connection to the console
    #[snafu(display("Could not resolve console address {address}"))]
    UnresolvableAddress { address: String },
    #[snafu(display("Could not bind telemetry socket on port {port}"))]
    SocketBindError { port: u16, source: io::Error },
    #[snafu(display("Could not configure telemetry socket"))]
    SocketConfigError { source: io::Error },

    // Errors while reading telemetry data
    #[snafu(display("Telemetry producer was stopped"))]
    ProducerStopped,
    #[snafu(display("No more telemetry to replay"))]
    ProducerExhausted,
    #[snafu(display("Telemetry producer error"))]
    TelemetryProducerError { description: String },

    // Errors for the lap files
    #[snafu(display("Error writing lap file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error loading lap file"))]
    LapLoaderError { source: io::Error },
    #[snafu(display("Invalid lap file: {path}"))]
    InvalidLapFile { path: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    #[snafu(display("Could not install signal handler: {description}"))]
    SignalHandlerError { description: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_handler_error_is_its_own_variant() {
        let error = Gt7Error::SignalHandlerError {
            description: "Multiple handlers".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Could not install signal handler: Multiple handlers"
        );
        assert!(!matches!(error, Gt7Error::TelemetryProducerError { .. }));
    }
}
