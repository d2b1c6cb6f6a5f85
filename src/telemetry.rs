// ferraris - Ferraris meter pulse logger
//
// Licensed under AGPL-3.0. See LICENSE file for details.

//! Best-effort telemetry forwarding
//!
//! Every trigger's reading is republished to at most one external
//! sink. Forwarding is strictly best-effort: a failure is returned to
//! the poll loop, which logs it and moves on. Nothing here may block
//! the loop for long or crash it.

use std::fs;
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rumqttc::{Client, MqttOptions, QoS};
use tracing::debug;

use crate::accumulator::Reading;
use crate::config::{HttpConfig, MqttConfig};
use crate::error::TelemetryError;

/// Trait for telemetry sinks
pub trait TelemetrySink {
    /// Forward one reading. Errors are reported, never retried within
    /// the same trigger event.
    fn forward(&mut self, reading: &Reading) -> Result<(), TelemetryError>;
}

impl<T: TelemetrySink + ?Sized> TelemetrySink for Box<T> {
    fn forward(&mut self, reading: &Reading) -> Result<(), TelemetryError> {
        (**self).forward(reading)
    }
}

/// Sink that discards every reading (telemetry disabled).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn forward(&mut self, _reading: &Reading) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// MQTT sink publishing counter and consumption as two independent
/// messages to two fixed topics.
///
/// The connection handle is owned by the sink and established lazily
/// on the first forward. The broker delivery loop runs on a background
/// thread owned by the client library. A publish failure drops the
/// handle so the next trigger reconnects from scratch.
pub struct MqttSink {
    config: MqttConfig,
    client: Option<Client>,
}

impl MqttSink {
    /// Create a sink for the given broker. Does not connect yet.
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Whether a connection handle is currently cached.
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn publish_reading(
        client: &mut Client,
        config: &MqttConfig,
        reading: &Reading,
    ) -> Result<(), TelemetryError> {
        let messages = [
            (&config.topic_counter, format!("{:.2}", reading.counter_kwh)),
            (&config.topic_power, format!("{:.0}", reading.power_w)),
        ];
        for (topic, payload) in messages {
            client
                .publish(topic.as_str(), QoS::AtMostOnce, false, payload)
                .map_err(|err| TelemetryError::Publish {
                    topic: topic.clone(),
                    reason: err.to_string(),
                })?;
        }
        Ok(())
    }
}

impl TelemetrySink for MqttSink {
    fn forward(&mut self, reading: &Reading) -> Result<(), TelemetryError> {
        let config = &self.config;
        let client = self.client.get_or_insert_with(|| spawn_client(config));

        if let Err(err) = Self::publish_reading(client, config, reading) {
            // Drop the stale handle; the next trigger reconnects.
            self.client = None;
            return Err(err);
        }
        Ok(())
    }
}

/// Start a broker connection and its delivery thread.
fn spawn_client(config: &MqttConfig) -> Client {
    let mut options =
        MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(30));

    let (client, mut connection) = Client::new(options, 10);
    let broker = format!("{}:{}", config.host, config.port);
    thread::spawn(move || {
        for event in connection.iter() {
            if let Err(err) = event {
                debug!("mqtt connection to {} ended: {}", broker, err);
                break;
            }
        }
    });
    client
}

/// HTTP sink issuing an authenticated PUT of the counter value to a
/// state endpoint.
///
/// The credential file is read on every call so it can be rotated
/// without restarting the reader. The request timeout is short; a slow
/// endpoint costs at most one timeout per trigger.
pub struct HttpSink {
    config: HttpConfig,
    agent: ureq::Agent,
}

impl HttpSink {
    /// Create a sink for the given endpoint.
    pub fn new(config: HttpConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Self { config, agent }
    }
}

impl TelemetrySink for HttpSink {
    fn forward(&mut self, reading: &Reading) -> Result<(), TelemetryError> {
        let credential = fs::read_to_string(&self.config.credential_path).map_err(|source| {
            TelemetryError::Credentials {
                path: self.config.credential_path.clone(),
                source,
            }
        })?;

        self.agent
            .put(&self.config.endpoint)
            .set("Authorization", &basic_auth(credential.trim()))
            .set("Content-Type", "text/plain")
            .send_string(&format!("{:.2}", reading.counter_kwh))
            .map_err(|err| TelemetryError::Http {
                url: self.config.endpoint.clone(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}

/// Encode a `user:password` credential as an HTTP basic-auth header value.
fn basic_auth(credential: &str) -> String {
    format!("Basic {}", STANDARD.encode(credential))
}

/// Sink that records every forwarded reading, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    readings: Vec<Reading>,
    fail: bool,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent forward fail (after recording it).
    pub fn set_fail(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// All readings forwarded so far, in order.
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }
}

impl TelemetrySink for RecordingSink {
    fn forward(&mut self, reading: &Reading) -> Result<(), TelemetryError> {
        self.readings.push(*reading);
        if self.fail {
            return Err(TelemetryError::Http {
                url: "recording".to_string(),
                reason: "simulated forward failure".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading() -> Reading {
        Reading {
            counter_kwh: 10.01,
            power_w: 48_000.0,
        }
    }

    #[test]
    fn test_basic_auth_encoding() {
        assert_eq!(basic_auth("user:pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_null_sink_always_ok() {
        let mut sink = NullSink;
        assert!(sink.forward(&reading()).is_ok());
    }

    #[test]
    fn test_mqtt_sink_does_not_connect_eagerly() {
        let sink = MqttSink::new(MqttConfig::default());
        assert!(!sink.is_connected());
    }

    #[test]
    fn test_http_sink_missing_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let config = HttpConfig {
            credential_path: dir.path().join("no-such-file"),
            ..HttpConfig::default()
        };
        let mut sink = HttpSink::new(config);

        // Fails on the credential read, before any network traffic.
        let err = sink.forward(&reading()).unwrap_err();
        assert!(matches!(err, TelemetryError::Credentials { .. }));
    }

    #[test]
    fn test_recording_sink_records_failures_too() {
        let mut sink = RecordingSink::new();
        sink.forward(&reading()).unwrap();
        sink.set_fail(true);
        assert!(sink.forward(&reading()).is_err());
        assert_eq!(sink.readings().len(), 2);
    }

    #[test]
    fn test_boxed_sink_forwards() {
        let mut sink: Box<dyn TelemetrySink> = Box::new(RecordingSink::new());
        assert!(sink.forward(&reading()).is_ok());
    }
}
