use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::util;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Address of the resource server (bare IP or `ip:port`).
    /// Falls back to the `RESOURCE_SERVER` environment variable.
    pub resource_server: Option<String>,

    pub telemetry: Option<TelemetryConfig>,

    pub sensors: Option<Vec<SensorConfig>>,

    pub alarms: Option<Vec<AlarmConfig>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TelemetryConfig {
    /// Base URL of the collector, e.g. `http://collector.example.net:8080`.
    pub url: Option<String>,

    /// Device access token; falls back to the `TELEMETRY_TOKEN` environment
    /// variable so it can be kept out of the config file.
    pub token: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SensorConfig {
    pub path: String,
    pub display: Option<String>,
    #[serde(default = "default_fast_interval")]
    pub fast_interval: f64,
    #[serde(default = "default_slow_interval")]
    pub slow_interval: f64,
}

impl SensorConfig {
    pub fn display_name(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.path)
    }

    /// Sleep duration for the next poll cycle, chosen from the current
    /// activity state. Non-positive intervals collapse to an immediate
    /// re-poll; configuration validation rejects them up front, the running
    /// loop tolerates them.
    pub fn poll_delay(&self, moving: bool) -> Duration {
        let secs = if moving {
            self.fast_interval
        } else {
            self.slow_interval
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

fn default_fast_interval() -> f64 {
    1.0
}

fn default_slow_interval() -> f64 {
    10.0
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlarmConfig {
    pub path: String,
    #[serde(flatten)]
    pub action: AlarmAction,
}

/// What to do with each observation pushed by an alarm resource.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlarmAction {
    /// Flip the shared activity state from the alarm status.
    Motion,
    /// Forward the alarm status to the collector under the given key.
    Forward { key: String },
}

/// Configuration with every optional field resolved, validated once at
/// startup before any task is spawned.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub resource_server: SocketAddr,
    pub telemetry: ResolvedTelemetryConfig,
    pub sensors: Vec<SensorConfig>,
    pub alarms: Vec<AlarmConfig>,
}

#[derive(Debug, Clone)]
pub struct ResolvedTelemetryConfig {
    pub url: String,
    pub token: String,
}

impl Config {
    pub fn resolve(self) -> anyhow::Result<ResolvedConfig> {
        let resource_server = self
            .resource_server
            .or_else(util::get_resource_server)
            .context("no resource server address configured")?;
        let resource_server = util::parse_resource_server(&resource_server)?;

        let telemetry = self.telemetry.unwrap_or(TelemetryConfig {
            url: None,
            token: None,
        });
        let telemetry = ResolvedTelemetryConfig {
            url: telemetry
                .url
                .or_else(util::get_telemetry_url)
                .context("no telemetry endpoint configured")?,
            token: telemetry
                .token
                .or_else(util::get_telemetry_token)
                .context("no telemetry token configured")?,
        };

        let sensors = self.sensors.unwrap_or_default();
        for sensor in &sensors {
            if sensor.path.is_empty() {
                anyhow::bail!("sensor with empty resource path");
            }
            for interval in [sensor.fast_interval, sensor.slow_interval] {
                if !interval.is_finite() || interval <= 0.0 {
                    anyhow::bail!(
                        "non-positive poll interval for sensor {}",
                        sensor.path
                    );
                }
            }
        }

        let alarms = self.alarms.unwrap_or_default();
        let mut motion_alarms = 0;
        for alarm in &alarms {
            if alarm.path.is_empty() {
                anyhow::bail!("alarm with empty resource path");
            }
            if alarm.action == AlarmAction::Motion {
                motion_alarms += 1;
            }
        }
        // the activity state has exactly one writer
        if motion_alarms > 1 {
            anyhow::bail!("multiple motion alarms configured");
        }

        Ok(ResolvedConfig {
            resource_server,
            telemetry,
            sensors,
            alarms,
        })
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config: &Config| trace!("loaded config: {config:?}"))
}
