use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use futures::future::join_all;
use sensor_bridge::{
    actors::{
        observer::{AlarmHandler, ObserverHandle},
        poller::PollerHandle,
    },
    client::{FetchError, ResourceClient, coap::CoapClient},
    config::{AlarmAction, ResolvedConfig, read_config_file},
    sink::TelemetrySink,
    state::motion_state,
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// Bounded wait for all tasks to finish their cancellation cleanup.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("sensor_bridge", LevelFilter::TRACE),
        ("bridge", LevelFilter::TRACE),
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

    let config = read_config_file(&args.file)?.resolve()?;

    if config.sensors.is_empty() && config.alarms.is_empty() {
        warn!("no sensors or alarms configured, nothing to monitor");
    }

    let client: Arc<dyn ResourceClient> = Arc::new(CoapClient::new(config.resource_server));
    probe_resources(client.as_ref(), &config).await?;

    let sink = TelemetrySink::new(&config.telemetry);

    let (motion_writer, motion_reader) = motion_state();
    let mut motion_writer = Some(motion_writer);

    let mut pollers = Vec::new();
    let mut observers = Vec::new();
    let mut tasks = Vec::new();

    for sensor in &config.sensors {
        let (handle, join) = PollerHandle::spawn(
            sensor.clone(),
            client.clone(),
            sink.clone(),
            motion_reader.clone(),
        );
        debug!("spawned poller for {}", handle.display_name);
        pollers.push(handle);
        tasks.push(join);
    }

    for alarm in &config.alarms {
        let handler = match &alarm.action {
            AlarmAction::Motion => AlarmHandler::Motion(
                motion_writer
                    .take()
                    .context("motion alarm configured twice")?,
            ),
            AlarmAction::Forward { key } => AlarmHandler::Forward {
                key: key.clone(),
                sink: sink.clone(),
            },
        };

        let (handle, join) = ObserverHandle::spawn(alarm.clone(), client.clone(), handler);
        debug!("spawned observer for {}", handle.path);
        observers.push(handle);
        tasks.push(join);
    }

    info!(
        "monitoring {} sensors and {} alarms on {}",
        pollers.len(),
        observers.len(),
        config.resource_server
    );

    wait_for_shutdown().await;
    info!("shutting down");

    for poller in &pollers {
        if let Err(e) = poller.shutdown().await {
            error!("{}: {e}", poller.display_name);
        }
    }
    for observer in &observers {
        if let Err(e) = observer.shutdown().await {
            error!("{}: {e}", observer.path);
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, join_all(tasks)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    error!("task ended abnormally: {e}");
                }
            }
            info!("clean shutdown");
            Ok(())
        }
        Err(_) => {
            error!("tasks failed to stop within {SHUTDOWN_GRACE:?}");
            std::process::exit(1);
        }
    }
}

/// One startup probe per configured path. A server that does not know the
/// path means the configuration is wrong, which is fatal before any task is
/// spawned; a transient failure is only a warning, the loops retry anyway.
async fn probe_resources(
    client: &dyn ResourceClient,
    config: &ResolvedConfig,
) -> anyhow::Result<()> {
    let paths = config
        .sensors
        .iter()
        .map(|sensor| sensor.path.as_str())
        .chain(config.alarms.iter().map(|alarm| alarm.path.as_str()));

    for path in paths {
        match client.fetch(path).await {
            Ok(value) => trace!("{path}: initial value {value}"),
            Err(FetchError::NotFound) => anyhow::bail!("unknown resource path: {path}"),
            Err(e) => warn!("{path}: probe failed ({e}), continuing"),
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
