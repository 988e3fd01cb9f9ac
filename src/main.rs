use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use gt7_telemetry::{
    Gt7Config, Gt7Error, LapEngine, UdpTelemetryProducer,
    analysis::{
        self, LapSummary,
        peaks::DEFAULT_MIN_WIDTH,
        variance::{DEFAULT_VARIANCE_LAPS, DEFAULT_VARIANCE_THRESHOLD},
    },
    laps::Lap,
    telemetry::spawn_collector,
    writer,
};
use log::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Records laps from a console on the local network
    Live {
        /// Console address, overrides the saved config
        #[arg(short, long)]
        ip: Option<String>,

        /// Lap file to write on exit, defaults to a new file in the laps dir
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Prints lap statistics of a saved lap file
    Report {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn live(ip: Option<String>, output: Option<PathBuf>) -> Result<(), Gt7Error> {
    let mut config = Gt7Config::from_local_file()?.unwrap_or_default();
    if let Some(ip) = ip {
        config.playstation_ip = ip;
    }

    let engine = LapEngine::new();
    engine.set_always_record(config.always_record_data);

    let producer = UdpTelemetryProducer::new(config.clone());
    let handle = producer.handle();
    let collector = spawn_collector(producer, engine.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_running = running.clone();
    let ctrlc_handle = handle.clone();
    ctrlc::set_handler(move || {
        info!("Exiting...");
        ctrlc_running.store(false, Ordering::SeqCst);
        ctrlc_handle.stop();
    })
    .map_err(|e| Gt7Error::SignalHandlerError {
        description: e.to_string(),
    })?;

    let mut reported_laps = 0;
    let mut was_connected = false;
    while running.load(Ordering::SeqCst) && !collector.is_finished() {
        thread::sleep(POLL_INTERVAL);

        let connected = handle.is_connected();
        if connected != was_connected {
            info!(
                "Console {}",
                if connected { "connected" } else { "disconnected" }
            );
            was_connected = connected;
        }

        let laps = engine.laps();
        if laps.len() > reported_laps {
            let best = analysis::best_lap(&laps).map_or(-1., |lap| lap.lap_finish_time);
            for lap in laps.iter().take(laps.len() - reported_laps).rev() {
                let summary = LapSummary::from_lap(lap, best);
                info!(
                    "Lap {} {} {} fuel {:.1} full throttle {:.0}\u{2030} spin {:.0}\u{2030}",
                    summary.number,
                    summary.time,
                    summary.diff,
                    summary.fuel_at_end,
                    summary.full_throttle,
                    summary.tires_spinning
                );
            }
        }
        reported_laps = laps.len();
    }

    handle.stop();
    match collector.join() {
        Ok(result) => result?,
        Err(_) => error!("Telemetry collection thread panicked"),
    }

    let laps = engine.laps();
    if laps.is_empty() {
        info!("No laps recorded");
        return Ok(());
    }
    match (output, config.laps_dir()) {
        (Some(output), _) => writer::save_laps(&output, &laps)?,
        (None, Some(dir)) => {
            writer::save_laps_to_dir(&dir, &laps)?;
        }
        (None, None) => warn!("No directory to save {} laps to", laps.len()),
    }
    Ok(())
}

fn report(input: &PathBuf) -> Result<(), Gt7Error> {
    if !input.exists() {
        return Err(Gt7Error::InvalidLapFile {
            path: format!("{:?}", input),
        });
    }
    let laps: Vec<Arc<Lap>> = writer::load_laps(input)?
        .into_iter()
        .map(Arc::new)
        .collect();
    let Some(best) = analysis::best_lap(&laps) else {
        println!("{} contains no laps", input.display());
        return Ok(());
    };

    println!("{}", analysis::format_laps_table(&laps, best.lap_finish_time));

    if let Some(median) = analysis::median_lap(&laps) {
        println!("\n{}", median.title);
    }

    let extrema = analysis::speed_extrema(&best, DEFAULT_MIN_WIDTH);
    println!("\nBest lap {}", best.format());
    for (speed, tick) in &extrema.peaks {
        println!("  peak   {:>6.1} km/h at tick {}", speed, tick);
    }
    for (speed, tick) in &extrema.valleys {
        println!("  valley {:>6.1} km/h at tick {}", speed, tick);
    }

    let variance =
        analysis::fastest_laps_variance(&laps, DEFAULT_VARIANCE_THRESHOLD, DEFAULT_VARIANCE_LAPS);
    if let Some((distance, std)) = variance
        .points
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
    {
        println!(
            "\nLargest speed deviation over {} laps: {:.1} km/h at {:.0} m",
            variance.laps.len(),
            std,
            distance
        );
    }

    let latest = &laps[0];
    println!("\nFuel map for lap {}", latest.number);
    for map in analysis::fuel_projection(latest) {
        println!(
            "  {:>2} power {:>4.0}% fuel/lap {:>5.2} laps {:>6} time diff {:>9}",
            map.mixture_setting,
            map.power_percentage * 100.,
            map.fuel_consumed_per_lap,
            map.laps_remaining_on_current_fuel
                .map_or("-".to_string(), |laps| format!("{:.1}", laps)),
            analysis::seconds_to_lap_time(map.lap_time_diff / 1000.),
        );
    }
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let result = match &cli.command {
        Commands::Live { ip, output } => live(ip.clone(), output.clone()),
        Commands::Report { input } => report(input),
    };
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
