use std::thread::{self, JoinHandle};

use log::{debug, info};

use crate::{Gt7Error, laps::LapEngine};

use super::producer::TelemetryProducer;

/// Starts `producer` on the calling thread and, once it is ready, runs
/// [`collect_telemetry`] on a new thread.
///
/// # Errors
///
/// Returns the error of [`TelemetryProducer::start`] without spawning a
/// thread, e.g. when the console address cannot be resolved.
pub fn spawn_collector<P>(
    mut producer: P,
    engine: LapEngine,
) -> Result<JoinHandle<Result<(), Gt7Error>>, Gt7Error>
where
    P: TelemetryProducer + Send + 'static,
{
    producer.start()?;
    Ok(thread::spawn(move || collect_telemetry(producer, engine)))
}

/// Pulls snapshots from an already started `producer` and feeds them to
/// `engine` until the producer is stopped or runs out of data.
///
/// Meant to run on its own thread. Only an unexpected producer error ends the
/// loop with an error.
pub fn collect_telemetry(
    mut producer: impl TelemetryProducer,
    engine: LapEngine,
) -> Result<(), Gt7Error> {
    loop {
        match producer.telemetry() {
            Ok(Some(snapshot)) => {
                if let Some(lap) = engine.ingest(snapshot) {
                    debug!("Collected lap {} ({})", lap.number, lap.title);
                }
            }
            Ok(None) => continue,
            Err(Gt7Error::ProducerStopped) | Err(Gt7Error::ProducerExhausted) => {
                info!("Telemetry collection finished");
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}
