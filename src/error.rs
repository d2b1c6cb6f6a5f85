//! Error types for ferraris
//!
//! This module defines all error types used throughout the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for meter operations
pub type Result<T> = std::result::Result<T, MeterError>;

/// Main error type for meter operations
#[derive(Error, Debug)]
pub enum MeterError {
    /// Signal source error
    #[error("Signal source error: {0}")]
    Source(#[from] SourceError),

    /// Persistence error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Telemetry error
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

/// Errors from the serial signal source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Serial device could not be opened (fatal at startup, exit code 1)
    #[error("Unable to open serial port {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: serialport::Error,
    },

    /// Read from the open device failed
    #[error("Read from signal source failed: {0}")]
    Read(#[from] io::Error),

    /// Device reported end of stream
    #[error("Signal source closed")]
    Closed,
}

/// Errors from the round-robin store
#[derive(Error, Debug)]
pub enum StoreError {
    /// rrdtool binary could not be spawned
    #[error("Failed to run rrdtool {subcommand}: {source}")]
    Spawn {
        subcommand: &'static str,
        #[source]
        source: io::Error,
    },

    /// rrdtool exited with a non-zero status
    #[error("rrdtool {subcommand} failed: {stderr}")]
    Command {
        subcommand: &'static str,
        stderr: String,
    },
}

/// Errors from the telemetry forwarders
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Publish to the broker failed
    #[error("MQTT publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Credential file unreadable
    #[error("Credential file {path}: {source}")]
    Credentials {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// HTTP state update failed
    #[error("HTTP PUT to {url} failed: {reason}")]
    Http { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeterError::Store(StoreError::Command {
            subcommand: "update",
            stderr: "illegal attempt to update".to_string(),
        });
        let msg = format!("{}", err);
        assert!(msg.contains("rrdtool update"));
        assert!(msg.contains("illegal attempt"));
    }

    #[test]
    fn test_error_conversion() {
        let source_err = SourceError::Closed;
        let meter_err: MeterError = source_err.into();
        assert!(matches!(meter_err, MeterError::Source(_)));
    }
}
