//! Parsing for OML monitoring logs.
//!
//! The testbed writes one `.oml` file per node and monitoring type
//! (`consumption`, `radio`): a free-form header, a blank separator line,
//! then whitespace-separated datapoint rows. Only the columns the forwarder
//! needs are decoded.

use std::fmt;
use std::path::Path;

/// Datapoint rows of an OML file, with the header stripped.
///
/// The header runs up to the first blank line; a file without one is either
/// truncated or too young to contain data.
pub fn data_lines(content: &str) -> Result<Vec<&str>, OmlError> {
    let lines: Vec<&str> = content.lines().collect();
    let separator = lines
        .iter()
        .position(|line| line.trim().is_empty())
        .ok_or(OmlError::MissingHeader)?;

    Ok(lines[separator + 1..].to_vec())
}

/// One energy-consumption datapoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySample {
    /// Milliseconds since the epoch
    pub timestamp_ms: i64,
    pub current: f64,
    pub voltage: f64,
    pub power: f64,
}

pub fn parse_energy_sample(line: &str) -> Result<EnergySample, OmlError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let [_, _, _, secs, subsec, current, voltage, power, ..] = fields.as_slice() else {
        return Err(OmlError::malformed(line));
    };

    Ok(EnergySample {
        timestamp_ms: oml_timestamp(secs, subsec).ok_or_else(|| OmlError::malformed(line))?,
        current: current.parse().map_err(|_| OmlError::malformed(line))?,
        voltage: voltage.parse().map_err(|_| OmlError::malformed(line))?,
        power: power.parse().map_err(|_| OmlError::malformed(line))?,
    })
}

/// One radio-monitoring datapoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioSample {
    /// Milliseconds since the epoch
    pub timestamp_ms: i64,
    pub channel: String,
    pub rssi: f64,
}

pub fn parse_radio_sample(line: &str) -> Result<RadioSample, OmlError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let [_, _, _, secs, subsec, channel, rssi, ..] = fields.as_slice() else {
        return Err(OmlError::malformed(line));
    };

    Ok(RadioSample {
        timestamp_ms: oml_timestamp(secs, subsec).ok_or_else(|| OmlError::malformed(line))?,
        channel: (*channel).to_string(),
        rssi: rssi.parse().map_err(|_| OmlError::malformed(line))?,
    })
}

/// Seconds column plus the first three subsecond digits (the subsecond
/// column is microseconds).
fn oml_timestamp(secs: &str, subsec: &str) -> Option<i64> {
    let millis = subsec.get(..3).unwrap_or(subsec);
    format!("{secs}{millis}").parse().ok()
}

/// Nodes with consumption monitoring data under an experiment directory.
/// Node ids are normalized to underscores, matching the telemetry keys.
pub fn discover_nodes(experiment_dir: &Path) -> std::io::Result<Vec<String>> {
    let mut nodes = Vec::new();

    for entry in std::fs::read_dir(experiment_dir.join("consumption"))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("oml")
            && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
        {
            nodes.push(stem.replace('-', "_"));
        }
    }

    nodes.sort();
    Ok(nodes)
}

#[derive(Debug)]
pub enum OmlError {
    /// No blank line separating header and data, not enough data yet?
    MissingHeader,

    /// A datapoint row that does not match the expected columns
    MalformedSample(String),
}

impl OmlError {
    fn malformed(line: &str) -> Self {
        OmlError::MalformedSample(line.to_string())
    }
}

impl fmt::Display for OmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmlError::MissingHeader => {
                write!(
                    f,
                    "could not find end of OML header (not enough data yet?)"
                )
            }
            OmlError::MalformedSample(line) => write!(f, "malformed datapoint {line:?}"),
        }
    }
}

impl std::error::Error for OmlError {}
