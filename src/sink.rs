//! Client for the telemetry collector.
//!
//! The collector accepts a flat JSON object of key → numeric/boolean values
//! via `POST /api/v1/{token}/telemetry`. Posting is fire-and-forget from the
//! caller's perspective: failures are reported, logged by the caller, and
//! never retried.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::trace;

use crate::SensorValue;
use crate::config::ResolvedTelemetryConfig;

#[derive(Debug, Clone)]
pub struct TelemetrySink {
    client: reqwest::Client,
    endpoint: String,
}

impl TelemetrySink {
    pub fn new(config: &ResolvedTelemetryConfig) -> Self {
        let endpoint = format!(
            "{}/api/v1/{}/telemetry",
            config.url.trim_end_matches('/'),
            config.token
        );

        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            endpoint,
        }
    }

    /// Post a single key/value observation. The collector assigns the
    /// timestamp on arrival.
    pub async fn post(&self, key: &str, value: SensorValue) -> Result<(), SinkError> {
        let mut values = BTreeMap::new();
        values.insert(key.to_string(), value);
        self.send_json(&values).await
    }

    /// Post a batch of values carrying their own timestamp, as produced by
    /// the monitoring forwarder.
    pub async fn post_timestamped(
        &self,
        message: &TimestampedTelemetry,
    ) -> Result<(), SinkError> {
        self.send_json(message).await
    }

    async fn send_json<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(SinkError::Http)?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status()));
        }

        trace!("posted telemetry to {}", self.endpoint);
        Ok(())
    }
}

/// A telemetry message with an explicit timestamp (milliseconds since the
/// epoch), used for replayed monitoring data.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedTelemetry {
    pub ts: i64,
    pub values: BTreeMap<String, SensorValue>,
}

/// Telemetry key for a resource: the last path segment.
pub fn telemetry_key(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug)]
pub enum SinkError {
    /// The request never produced a response (connection refused, timeout).
    Http(reqwest::Error),

    /// The collector answered with a non-success status.
    Status(reqwest::StatusCode),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Http(err) => write!(f, "telemetry request failed: {err}"),
            SinkError::Status(status) => {
                write!(f, "collector rejected telemetry with status {status}")
            }
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Http(err) => Some(err),
            SinkError::Status(_) => None,
        }
    }
}
