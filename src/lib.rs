//! # ferraris - Ferraris meter pulse logger
//!
//! Reads an electricity meter through a reflective light sensor
//! attached to a serial MCU, turns the pulse stream into energy
//! readings and records them into a round-robin database, optionally
//! forwarding each reading to a telemetry sink.
//!
//! ## How it works
//!
//! The sensor MCU emits one ASCII line per sample: `"1"` while the
//! meter disk's reflective mark faces the sensor, `"0"` otherwise. One
//! falling edge equals one disk revolution, i.e. a fixed energy
//! quantum of `1 / rev_per_kwh` kWh. The poll loop counts edges,
//! accumulates the counter and writes every reading to the store.
//!
//! ## Quick Start
//!
//! ```rust
//! use ferraris::{Meter, MemoryStore, RecordingSink, ScriptedSource, ShutdownHandle};
//!
//! // A scripted source stands in for the serial line: one full
//! // revolution (active, then inactive), then shut down.
//! let shutdown = ShutdownHandle::new();
//! let mut source = ScriptedSource::new(["1", "0"]).shutdown_when_done(shutdown.clone());
//!
//! let mut meter = Meter::restore(75, MemoryStore::new(), RecordingSink::new(), shutdown);
//! meter.run(&mut source).unwrap();
//!
//! // One trigger advanced the counter by one quantum.
//! assert!((meter.counter_kwh() - 1.0 / 75.0).abs() < 1e-9);
//! ```
//!
//! ## Modules
//!
//! - [`signal`]: sample decoding and falling-edge detection
//! - [`accumulator`]: energy counter accumulation
//! - [`source`]: serial sample source
//! - [`store`]: round-robin persistence (RRDtool)
//! - [`telemetry`]: best-effort MQTT / HTTP forwarding
//! - [`meter`]: the poll loop

// Modules
pub mod accumulator;
pub mod config;
pub mod error;
pub mod meter;
pub mod signal;
pub mod source;
pub mod store;
pub mod telemetry;

// Re-exports for convenient access
pub use accumulator::{Accumulator, Reading, JOULES_PER_KWH};
pub use config::{Config, HttpConfig, MqttConfig, TelemetryConfig};
pub use error::{MeterError, Result, SourceError, StoreError, TelemetryError};
pub use meter::{Meter, ShutdownHandle};
pub use signal::{EdgeDetector, Sample};
pub use source::{SampleSource, ScriptedSource, SerialSource};
pub use store::{CounterStore, MemoryStore, RrdStore};
pub use telemetry::{HttpSink, MqttSink, NullSink, RecordingSink, TelemetrySink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
