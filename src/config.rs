// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Configuration for the meter reader
//!
//! All fixed constants live here in one structure passed at startup:
//! serial device, meter rating, store path, and the telemetry target.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Serial device the sensor MCU is attached to
    pub device: String,

    /// Serial baud rate
    pub baud: u32,

    /// Meter rating: disk revolutions per kWh
    pub rev_per_kwh: u32,

    /// Path of the round-robin database file
    pub rrd_path: PathBuf,

    /// Telemetry forwarding target
    pub telemetry: TelemetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            rev_per_kwh: 75,
            rrd_path: default_rrd_path(),
            telemetry: TelemetryConfig::None,
        }
    }
}

/// Telemetry forwarding target (best-effort, variant-dependent)
#[derive(Debug, Clone, Default)]
pub enum TelemetryConfig {
    /// No forwarding
    #[default]
    None,
    /// Publish each reading to an MQTT broker
    Mqtt(MqttConfig),
    /// PUT the counter to an HTTP state endpoint
    Http(HttpConfig),
}

/// MQTT broker target
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Topic for the absolute counter value (kWh)
    pub topic_counter: String,

    /// Topic for the per-trigger consumption value
    pub topic_power: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "ferraris".to_string(),
            topic_counter: "ferraris/counter".to_string(),
            topic_power: "ferraris/power".to_string(),
        }
    }
}

/// HTTP state endpoint target
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Full URL of the state item to PUT the counter to
    pub endpoint: String,

    /// Local file holding the `user:password` credential, read on
    /// every forward (never cached)
    pub credential_path: PathBuf,

    /// Request timeout; the poll loop must not stall on a slow sink
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/rest/items/PowerCounter/state".to_string(),
            credential_path: PathBuf::from("/etc/ferraris/credentials"),
            timeout: Duration::from_secs(1),
        }
    }
}

/// Store file next to the executable, falling back to the working
/// directory when the executable path cannot be resolved.
fn default_rrd_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("ferraris.rrd")))
        .unwrap_or_else(|| PathBuf::from("ferraris.rrd"))
}
