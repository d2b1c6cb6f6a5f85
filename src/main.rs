// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! # ferraris
//!
//! Reads the electrical meter using a reflective light sensor and
//! records counter and consumption values into a round-robin database.
//!
//! ## Usage
//!
//! ```bash
//! # First run: create the database, then start polling
//! ferraris --create
//!
//! # Forward readings to an MQTT broker as well
//! ferraris --telemetry mqtt
//! ```
//!
//! Exits with code 1 if the serial device cannot be opened; otherwise
//! runs until SIGINT/SIGTERM.

use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use ferraris::{
    Config, CounterStore, HttpSink, Meter, MqttSink, NullSink, RrdStore, SerialSource,
    ShutdownHandle, TelemetryConfig, TelemetrySink,
};

/// Program to read the electrical meter using a reflective light sensor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Create the round-robin database if necessary
    #[arg(short, long)]
    create: bool,

    /// Telemetry forwarding variant
    #[arg(long, value_enum, default_value = "none")]
    telemetry: TelemetryArg,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Which telemetry sink to run
#[derive(ValueEnum, Clone, Copy, Debug)]
enum TelemetryArg {
    /// No forwarding
    None,
    /// Publish to the MQTT broker
    Mqtt,
    /// PUT the counter to the HTTP state endpoint
    Http,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("ferraris v{}", env!("CARGO_PKG_VERSION"));

    let config = Config {
        telemetry: match args.telemetry {
            TelemetryArg::None => TelemetryConfig::None,
            TelemetryArg::Mqtt => TelemetryConfig::Mqtt(Default::default()),
            TelemetryArg::Http => TelemetryConfig::Http(Default::default()),
        },
        ..Config::default()
    };

    let mut store = RrdStore::new(&config.rrd_path);
    if args.create {
        info!("creating RRD: {}", config.rrd_path.display());
        if let Err(err) = store.create() {
            // Reported, but startup continues; updates will complain
            // on their own if the store really is unusable.
            error!("{}", err);
        }
    }

    let shutdown = ShutdownHandle::new();
    let handle = shutdown.clone();
    if let Err(err) = ctrlc::set_handler(move || handle.request()) {
        warn!("could not install signal handler: {}", err);
    }

    let mut source = match SerialSource::open(&config.device, config.baud) {
        Ok(source) => source,
        Err(err) => {
            error!("{}", err);
            return ExitCode::from(1);
        }
    };

    let telemetry: Box<dyn TelemetrySink> = match config.telemetry.clone() {
        TelemetryConfig::None => Box::new(NullSink),
        TelemetryConfig::Mqtt(mqtt) => Box::new(MqttSink::new(mqtt)),
        TelemetryConfig::Http(http) => Box::new(HttpSink::new(http)),
    };

    let mut meter = Meter::restore(config.rev_per_kwh, store, telemetry, shutdown);
    match meter.run(&mut source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("poll loop terminated: {}", err);
            ExitCode::from(1)
        }
    }
}
