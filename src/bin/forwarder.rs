//! Replays testbed monitoring logs into the telemetry collector.
//!
//! Unrelated to the live bridge: this utility tails the per-node OML files
//! written by the experiment infrastructure and forwards new
//! energy-consumption datapoints (and optionally radio datapoints) as
//! timestamped telemetry. Forwarding is not fast enough to keep up with the
//! full sampling rate, so the stream is thinned to every Nth datapoint.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sensor_bridge::{
    SensorValue,
    config::ResolvedTelemetryConfig,
    oml::{self, EnergySample, RadioSample},
    sink::{TelemetrySink, TimestampedTelemetry},
    util,
};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Experiment directory containing consumption/ and radio/ subdirectories
    #[arg(short, long)]
    experiment_dir: PathBuf,

    /// Seconds between forwarding passes
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Forward every Nth energy datapoint
    #[arg(long, default_value_t = 2)]
    rate: usize,

    /// Also forward radio monitoring data
    #[arg(long)]
    radio: bool,

    /// Collector base URL (falls back to TELEMETRY_URL)
    #[arg(long)]
    url: Option<String>,

    /// Collector device token (falls back to TELEMETRY_TOKEN)
    #[arg(long)]
    token: Option<String>,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("sensor_bridge", LevelFilter::TRACE),
        ("monitoring_forwarder", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let telemetry = ResolvedTelemetryConfig {
        url: args
            .url
            .clone()
            .or_else(util::get_telemetry_url)
            .context("no telemetry endpoint configured")?,
        token: args
            .token
            .clone()
            .or_else(util::get_telemetry_token)
            .context("no telemetry token configured")?,
    };
    let sink = TelemetrySink::new(&telemetry);

    let nodes = oml::discover_nodes(&args.experiment_dir)
        .context("could not list monitored nodes")?;
    if nodes.is_empty() {
        anyhow::bail!(
            "no monitoring data under {} (is exactly one experiment running?)",
            args.experiment_dir.display()
        );
    }
    info!("forwarding monitoring data for {} nodes", nodes.len());

    let mut forwarder = Forwarder {
        sink,
        experiment_dir: args.experiment_dir.clone(),
        rate: args.rate.max(1),
        radio: args.radio,
        energy_cursors: HashMap::new(),
        radio_cursors: HashMap::new(),
    };

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.interval)) => {
                forwarder.pass(&nodes).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

struct Forwarder {
    sink: TelemetrySink,
    experiment_dir: PathBuf,
    rate: usize,
    radio: bool,
    /// Datapoints already forwarded, per node
    energy_cursors: HashMap<String, usize>,
    radio_cursors: HashMap<String, usize>,
}

impl Forwarder {
    async fn pass(&mut self, nodes: &[String]) {
        for node in nodes {
            self.forward_energy(node).await;
            if self.radio {
                self.forward_radio(node).await;
            }
        }
    }

    async fn forward_energy(&mut self, node: &str) {
        let file = monitoring_file(&self.experiment_dir, "consumption", node);
        let Some(lines) = read_data_lines(&file, node).await else {
            return;
        };

        // the final line is usually still being written, skip it this pass
        let end = lines.len().saturating_sub(1);
        let start = self.energy_cursors.get(node).copied().unwrap_or(0).min(end);

        let mut forwarded = 0;
        for line in lines[start..end].iter().step_by(self.rate) {
            match oml::parse_energy_sample(line) {
                Ok(sample) => {
                    let message = energy_message(&sample, node);
                    if let Err(e) = self.sink.post_timestamped(&message).await {
                        warn!("{node}: failed to forward datapoint: {e}");
                    } else {
                        forwarded += 1;
                    }
                }
                Err(e) => warn!("{node}: skipping datapoint: {e}"),
            }
        }

        self.energy_cursors.insert(node.to_string(), end);
        debug!("{node}: forwarded {forwarded} energy datapoints");
    }

    async fn forward_radio(&mut self, node: &str) {
        let file = monitoring_file(&self.experiment_dir, "radio", node);
        let Some(lines) = read_data_lines(&file, node).await else {
            return;
        };

        let end = lines.len().saturating_sub(1);
        let start = self.radio_cursors.get(node).copied().unwrap_or(0).min(end);

        for line in &lines[start..end] {
            match oml::parse_radio_sample(line) {
                Ok(sample) => {
                    let message = radio_message(&sample, node);
                    if let Err(e) = self.sink.post_timestamped(&message).await {
                        warn!("{node}: failed to forward datapoint: {e}");
                    }
                }
                Err(e) => warn!("{node}: skipping datapoint: {e}"),
            }
        }

        self.radio_cursors.insert(node.to_string(), end);
    }
}

fn monitoring_file(experiment_dir: &Path, kind: &str, node: &str) -> PathBuf {
    experiment_dir.join(kind).join(format!("{node}.oml"))
}

async fn read_data_lines(file: &Path, node: &str) -> Option<Vec<String>> {
    let content = match tokio::fs::read_to_string(file).await {
        Ok(content) => content,
        Err(e) => {
            warn!("{node}: could not read {}: {e}", file.display());
            return None;
        }
    };

    match oml::data_lines(&content) {
        Ok(lines) => Some(lines.into_iter().map(str::to_string).collect()),
        Err(e) => {
            warn!("{node}: {e}");
            None
        }
    }
}

fn energy_message(sample: &EnergySample, node: &str) -> TimestampedTelemetry {
    let mut values = BTreeMap::new();
    values.insert(format!("current-{node}"), SensorValue::Float(sample.current));
    values.insert(format!("voltage-{node}"), SensorValue::Float(sample.voltage));
    values.insert(format!("power-{node}"), SensorValue::Float(sample.power));

    TimestampedTelemetry {
        ts: sample.timestamp_ms,
        values,
    }
}

fn radio_message(sample: &RadioSample, node: &str) -> TimestampedTelemetry {
    let mut values = BTreeMap::new();
    values.insert(
        format!("{}-{node}", sample.channel),
        SensorValue::Float(sample.rssi),
    );

    TimestampedTelemetry {
        ts: sample.timestamp_ms,
        values,
    }
}
