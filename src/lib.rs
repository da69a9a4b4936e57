pub mod actors;
pub mod client;
pub mod config;
pub mod oml;
pub mod sink;
pub mod state;
pub mod util;

use std::fmt;

use serde::Serialize;

/// A decoded scalar reading from a sensor resource.
///
/// Resources report plain-text numeric payloads; alarms report integer
/// status flags. The collector endpoint accepts numbers and booleans, so all
/// three shapes serialize transparently into a telemetry body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl SensorValue {
    /// Decode a plain-text payload into a scalar value.
    ///
    /// Integers win over floats, so alarm status flags keep their integer
    /// identity on the wire.
    pub fn parse(payload: &[u8]) -> Result<Self, MalformedPayload> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| MalformedPayload::new(payload))?
            .trim();

        if let Ok(value) = text.parse::<i64>() {
            return Ok(SensorValue::Integer(value));
        }

        if let Ok(value) = text.parse::<f64>()
            && value.is_finite()
        {
            return Ok(SensorValue::Float(value));
        }

        Err(MalformedPayload::new(payload))
    }

    /// Truthiness of a reading: any non-zero value counts as "set".
    pub fn as_bool(&self) -> bool {
        match self {
            SensorValue::Integer(value) => *value != 0,
            SensorValue::Float(value) => *value != 0.0,
            SensorValue::Bool(value) => *value,
        }
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Integer(value) => write!(f, "{value}"),
            SensorValue::Float(value) => write!(f, "{value}"),
            SensorValue::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<bool> for SensorValue {
    fn from(value: bool) -> Self {
        SensorValue::Bool(value)
    }
}

/// A payload that could not be decoded into a scalar value.
#[derive(Debug)]
pub struct MalformedPayload {
    payload: String,
}

impl MalformedPayload {
    fn new(payload: &[u8]) -> Self {
        Self {
            payload: String::from_utf8_lossy(payload).into_owned(),
        }
    }
}

impl fmt::Display for MalformedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed payload {:?}", self.payload)
    }
}

impl std::error::Error for MalformedPayload {}
