// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Round-robin persistence of counter and consumption values
//!
//! The store is external: RRDtool owns the file format, retention and
//! consolidation. This module only issues the narrow create / last /
//! update calls the poll loop needs, via the `rrdtool` binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::accumulator::Reading;
use crate::error::StoreError;

/// Sampling step of the store in seconds (one value per minute).
const STEP_SECONDS: u32 = 60;

/// Heartbeat: a data point may be up to one day late before the store
/// records unknowns. Triggers can be hours apart on low consumption.
const HEARTBEAT_SECONDS: u32 = 86_400;

/// Narrow interface the poll loop consumes.
///
/// `update` is called in strictly increasing time order; out-of-order
/// tolerance is whatever the underlying store dictates.
pub trait CounterStore {
    /// Idempotent creation of the store. Never overwrites an existing
    /// file. A failure is reported to the caller, which logs it and
    /// continues startup.
    fn create(&mut self) -> Result<(), StoreError>;

    /// Most recently persisted counter value, or 0.0 when the store is
    /// missing, empty or unreadable.
    fn last_counter(&mut self) -> Result<f64, StoreError>;

    /// Append one timestamped observation.
    fn update(&mut self, timestamp: i64, reading: &Reading) -> Result<(), StoreError>;
}

/// RRDtool-backed store.
///
/// Schema: two data series sampled at a fixed step. `counter` is a
/// GAUGE holding the absolute kWh reading (LAST consolidation),
/// `consum` is ABSOLUTE so the store divides each per-trigger energy
/// quantum by elapsed time, yielding average watts (AVERAGE
/// consolidation). Retention tiers: minutely for 3 days, daily for
/// 30 days, weekly for 10 years.
#[derive(Debug, Clone)]
pub struct RrdStore {
    path: PathBuf,
    rrdtool: PathBuf,
}

impl RrdStore {
    /// Create a handle for the store file at `path`, driving the
    /// `rrdtool` binary found on `PATH`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rrdtool: PathBuf::from("rrdtool"),
        }
    }

    /// Use a specific rrdtool executable instead of the one on `PATH`.
    pub fn with_rrdtool(mut self, rrdtool: impl Into<PathBuf>) -> Self {
        self.rrdtool = rrdtool.into();
        self
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn run(&self, subcommand: &'static str, args: &[String]) -> Result<String, StoreError> {
        let output = Command::new(&self.rrdtool)
            .arg(subcommand)
            .args(args)
            .output()
            .map_err(|source| StoreError::Spawn { subcommand, source })?;

        if !output.status.success() {
            return Err(StoreError::Command {
                subcommand,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn create_args(&self) -> Vec<String> {
        let mut args = vec![
            self.path.display().to_string(),
            "--no-overwrite".to_string(),
            "--step".to_string(),
            STEP_SECONDS.to_string(),
            format!("DS:counter:GAUGE:{}:0:1000000", HEARTBEAT_SECONDS),
            format!("DS:consum:ABSOLUTE:{}:0:1000000", HEARTBEAT_SECONDS),
        ];
        // Three retention tiers, LAST for the counter and AVERAGE for
        // the consumption: 1 value/min for 3 days, 1/day for 30 days,
        // 1/week for 10 years.
        for (steps, rows) in [(1, 4320), (1440, 30), (10080, 520)] {
            args.push(format!("RRA:LAST:0.5:{}:{}", steps, rows));
            args.push(format!("RRA:AVERAGE:0.5:{}:{}", steps, rows));
        }
        args
    }

    fn update_arg(timestamp: i64, reading: &Reading) -> String {
        format!(
            "{}:{:.2}:{:.0}",
            timestamp, reading.counter_kwh, reading.power_w
        )
    }

    /// Extract the counter value from `rrdtool lastupdate` output.
    ///
    /// The output is a header line naming the data sources, a blank
    /// line, then `timestamp: counter consum`. An unknown value is
    /// printed as `U`.
    fn parse_last_counter(output: &str) -> Option<f64> {
        let line = output.lines().rev().find(|l| !l.trim().is_empty())?;
        let (_, values) = line.split_once(':')?;
        values.split_whitespace().next()?.parse().ok()
    }
}

impl CounterStore for RrdStore {
    fn create(&mut self) -> Result<(), StoreError> {
        if self.path.exists() {
            debug!("store {} already exists, not overwriting", self.path.display());
            return Ok(());
        }
        self.run("create", &self.create_args())?;
        Ok(())
    }

    fn last_counter(&mut self) -> Result<f64, StoreError> {
        let args = vec![self.path.display().to_string()];
        match self.run("lastupdate", &args) {
            Ok(output) => Ok(Self::parse_last_counter(&output).unwrap_or(0.0)),
            // A missing or empty store means "start from zero", not a
            // startup failure.
            Err(StoreError::Command { stderr, .. }) => {
                debug!("no previous counter value ({})", stderr);
                Ok(0.0)
            }
            Err(err) => Err(err),
        }
    }

    fn update(&mut self, timestamp: i64, reading: &Reading) -> Result<(), StoreError> {
        let args = vec![
            self.path.display().to_string(),
            Self::update_arg(timestamp, reading),
        ];
        self.run("update", &args)?;
        Ok(())
    }
}

/// A simple in-memory store for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    created: bool,
    samples: Vec<(i64, Reading)>,
    fail_updates: bool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds one persisted counter value,
    /// simulating state left behind by a previous run.
    pub fn with_counter(counter_kwh: f64) -> Self {
        Self {
            created: true,
            samples: vec![(
                0,
                Reading {
                    counter_kwh,
                    power_w: 0.0,
                },
            )],
            fail_updates: false,
        }
    }

    /// Make every subsequent `update` call fail (simulate a broken
    /// store file).
    pub fn set_fail_updates(&mut self, fail: bool) {
        self.fail_updates = fail;
    }

    /// Whether `create` has been called.
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// All persisted observations, in call order.
    pub fn samples(&self) -> &[(i64, Reading)] {
        &self.samples
    }
}

impl CounterStore for MemoryStore {
    fn create(&mut self) -> Result<(), StoreError> {
        self.created = true;
        Ok(())
    }

    fn last_counter(&mut self) -> Result<f64, StoreError> {
        Ok(self
            .samples
            .last()
            .map(|(_, reading)| reading.counter_kwh)
            .unwrap_or(0.0))
    }

    fn update(&mut self, timestamp: i64, reading: &Reading) -> Result<(), StoreError> {
        if self.fail_updates {
            return Err(StoreError::Command {
                subcommand: "update",
                stderr: "simulated update failure".to_string(),
            });
        }
        self.samples.push((timestamp, *reading));
        Ok(())
    }
}
