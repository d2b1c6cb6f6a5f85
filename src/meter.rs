// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! The poll loop
//!
//! Single-threaded and synchronous: read one line, decode it, feed the
//! edge detector, and on a trigger persist and forward the reading
//! before the next read. Store and telemetry failures are logged and
//! never stop the loop; only a fatal source error or a shutdown
//! request ends it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use crate::accumulator::Accumulator;
use crate::error::Result;
use crate::signal::{EdgeDetector, Sample};
use crate::source::SampleSource;
use crate::store::CounterStore;
use crate::telemetry::TelemetrySink;

/// Cloneable flag for requesting a clean loop shutdown, typically set
/// from a signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Create a handle with shutdown not requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; the loop exits before its next read.
    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The meter reader: edge detector, counter and both sinks wired to a
/// sample source.
pub struct Meter<S: CounterStore, T: TelemetrySink> {
    detector: EdgeDetector,
    accumulator: Accumulator,
    store: S,
    telemetry: T,
    shutdown: ShutdownHandle,
}

impl<S: CounterStore, T: TelemetrySink> Meter<S, T> {
    /// Build a meter, restoring the counter from the last value the
    /// store persisted. A missing or unreadable store starts the
    /// counter at 0.0; the counter never regresses across restarts.
    pub fn restore(
        rev_per_kwh: u32,
        mut store: S,
        telemetry: T,
        shutdown: ShutdownHandle,
    ) -> Self {
        let initial = store.last_counter().unwrap_or_else(|err| {
            warn!("could not read last counter value: {}", err);
            0.0
        });
        info!("restoring counter to {:.2} kWh", initial);

        Self {
            detector: EdgeDetector::new(),
            accumulator: Accumulator::new(initial, rev_per_kwh),
            store,
            telemetry,
            shutdown,
        }
    }

    /// Current counter value in kWh.
    pub fn counter_kwh(&self) -> f64 {
        self.accumulator.counter_kwh()
    }

    /// Consume the meter, handing back its store and telemetry sink
    /// (for inspection in tests and for restart scenarios).
    pub fn into_parts(self) -> (S, T) {
        (self.store, self.telemetry)
    }

    /// Run until shutdown is requested or the source fails fatally.
    pub fn run<Src: SampleSource>(&mut self, source: &mut Src) -> Result<()> {
        while !self.shutdown.is_requested() {
            let Some(line) = source.next_line()? else {
                continue;
            };

            let Some(sample) = Sample::parse(&line) else {
                debug!("ignoring malformed sample {:?}", line);
                continue;
            };

            if self.detector.observe(sample) {
                self.handle_trigger();
            }
        }
        info!("shutdown requested, stopping poll loop");
        Ok(())
    }

    /// One disk revolution: advance the counter, persist, forward.
    fn handle_trigger(&mut self) {
        let reading = self.accumulator.record_trigger();
        let timestamp = unix_seconds();

        debug!(
            "trigger: counter {:.2} kWh, consumption {:.0} Ws",
            reading.counter_kwh, reading.power_w
        );

        if let Err(err) = self.store.update(timestamp, &reading) {
            error!("failed to persist reading: {}", err);
        }
        if let Err(err) = self.telemetry.forward(&reading) {
            warn!("telemetry forward failed: {}", err);
        }
    }
}

/// Wall-clock seconds since the Unix epoch.
fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MeterError, SourceError};
    use crate::source::ScriptedSource;
    use crate::store::MemoryStore;
    use crate::telemetry::RecordingSink;
    use approx::assert_relative_eq;

    fn run_script(lines: &[&str], store: MemoryStore) -> (MemoryStore, RecordingSink) {
        let shutdown = ShutdownHandle::new();
        let mut source =
            ScriptedSource::new(lines.iter().copied()).shutdown_when_done(shutdown.clone());
        let mut meter = Meter::restore(75, store, RecordingSink::new(), shutdown);
        meter.run(&mut source).unwrap();
        meter.into_parts()
    }

    #[test]
    fn test_single_falling_edge() {
        let (store, sink) = run_script(&["1", "0"], MemoryStore::with_counter(10.0));

        // One trigger: counter 10 + 1/75, consumption constant.
        assert_eq!(sink.readings().len(), 1);
        assert_relative_eq!(sink.readings()[0].counter_kwh, 10.0 + 1.0 / 75.0);
        assert_relative_eq!(sink.readings()[0].power_w, 48_000.0);
        assert_eq!(store.samples().len(), 2); // seeded value + one update
    }

    #[test]
    fn test_repeated_levels_single_trigger() {
        let (store, sink) = run_script(&["1", "1", "0", "0"], MemoryStore::new());
        assert_eq!(sink.readings().len(), 1);
        assert_eq!(store.samples().len(), 1);
    }

    #[test]
    fn test_malformed_samples_are_ignored() {
        let (store, sink) = run_script(&["", "2", "xyz"], MemoryStore::new());
        assert!(sink.readings().is_empty());
        assert!(store.samples().is_empty());
    }

    #[test]
    fn test_empty_store_starts_at_zero() {
        let shutdown = ShutdownHandle::new();
        let meter = Meter::restore(
            75,
            MemoryStore::new(),
            RecordingSink::new(),
            shutdown,
        );
        assert_eq!(meter.counter_kwh(), 0.0);
    }

    #[test]
    fn test_restart_recovers_counter() {
        // First run: three revolutions from zero.
        let (store, _) = run_script(&["1", "0", "1", "0", "1", "0"], MemoryStore::new());
        let counter_after_first = store.samples().last().unwrap().1.counter_kwh;
        assert_relative_eq!(counter_after_first, 3.0 / 75.0);

        // Restart against the same store, replay two more revolutions.
        let (store, _) = run_script(&["1", "0", "1", "0"], store);
        let counter_after_second = store.samples().last().unwrap().1.counter_kwh;
        assert_relative_eq!(counter_after_second, 5.0 / 75.0);
    }

    #[test]
    fn test_store_failure_does_not_stop_loop() {
        let mut store = MemoryStore::new();
        store.set_fail_updates(true);
        let (_, sink) = run_script(&["1", "0", "1", "0"], store);

        // Both triggers still reached telemetry.
        assert_eq!(sink.readings().len(), 2);
    }

    #[test]
    fn test_telemetry_failure_does_not_stop_loop() {
        let shutdown = ShutdownHandle::new();
        let mut source =
            ScriptedSource::new(["1", "0", "1", "0"]).shutdown_when_done(shutdown.clone());
        let mut sink = RecordingSink::new();
        sink.set_fail(true);
        let mut meter = Meter::restore(75, MemoryStore::new(), sink, shutdown);

        meter.run(&mut source).unwrap();
        let (store, _) = meter.into_parts();
        assert_eq!(store.samples().len(), 2);
    }

    #[test]
    fn test_source_close_is_fatal() {
        let shutdown = ShutdownHandle::new();
        let mut source = ScriptedSource::new(["1", "0"]);
        let mut meter = Meter::restore(75, MemoryStore::new(), RecordingSink::new(), shutdown);

        let err = meter.run(&mut source).unwrap_err();
        assert!(matches!(
            err,
            MeterError::Source(SourceError::Closed)
        ));
    }

    #[test]
    fn test_shutdown_before_run_exits_immediately() {
        let shutdown = ShutdownHandle::new();
        shutdown.request();
        let mut source = ScriptedSource::new(["1", "0"]);
        let mut meter =
            Meter::restore(75, MemoryStore::new(), RecordingSink::new(), shutdown);

        meter.run(&mut source).unwrap();
        assert_eq!(meter.counter_kwh(), 0.0);
    }
}
