//! AlarmObserverActor - Holds one long-lived alarm observation
//!
//! ## Message Flow
//!
//! ```text
//! Subscribe once → handler(initial) → handler(notification) → ...
//!        │                                   ▲
//!        │ failure: log + terminate          └─── pushed by the server
//!        └─── (this alarm stays unmonitored, siblings unaffected)
//! ```
//!
//! A poller that fails keeps retrying every cycle; an observer that fails to
//! subscribe does not. That asymmetry is deliberate and preserved: the gap
//! is surfaced once at error severity instead of being silently masked.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::SensorValue;
use crate::client::ResourceClient;
use crate::config::AlarmConfig;
use crate::sink::TelemetrySink;
use crate::state::MotionWriter;

use super::messages::ObserverCommand;

/// Keep-alive cadence while no notification is pending. The tick itself
/// performs no action.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Behavior attached to an alarm observation, applied to the initial value
/// and to every pushed notification.
pub enum AlarmHandler {
    /// Flip the shared activity state from the alarm status.
    Motion(MotionWriter),

    /// Forward the alarm status to the collector under a fixed key.
    Forward { key: String, sink: TelemetrySink },
}

impl AlarmHandler {
    async fn apply(&self, alarm: &str, value: SensorValue) {
        match self {
            AlarmHandler::Motion(writer) => {
                let moving = value.as_bool();
                writer.set(moving);
                debug!("{alarm}: motion state set to {moving}");
            }

            AlarmHandler::Forward { key, sink } => {
                debug!("{alarm}: forwarding status {value} as {key}");
                if let Err(e) = sink.post(key, value).await {
                    warn!("{alarm}: failed to forward status: {e}");
                }
            }
        }
    }
}

/// Actor that owns one alarm observation.
pub struct AlarmObserverActor {
    /// Alarm configuration
    config: AlarmConfig,

    /// Resource protocol client (shared across all tasks)
    client: Arc<dyn ResourceClient>,

    /// What to do with each notification
    handler: AlarmHandler,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<ObserverCommand>,

    /// Keep-alive cadence
    keepalive: Duration,
}

impl AlarmObserverActor {
    pub fn new(
        config: AlarmConfig,
        client: Arc<dyn ResourceClient>,
        handler: AlarmHandler,
        command_rx: mpsc::Receiver<ObserverCommand>,
    ) -> Self {
        Self {
            config,
            client,
            handler,
            command_rx,
            keepalive: KEEPALIVE_INTERVAL,
        }
    }

    /// Run the actor: subscribe once, then dispatch notifications until
    /// cancelled. Deregisters the observation on the way out.
    #[instrument(skip(self), fields(alarm = %self.config.path))]
    pub async fn run(mut self) {
        let path = self.config.path.clone();
        debug!("starting alarm observer ({:?})", self.config.action);

        let mut subscription = match self.client.subscribe(&path).await {
            Ok(subscription) => subscription,
            Err(e) => {
                // terminal for this alarm only, siblings keep running
                error!("failed to establish observation: {e}");
                return;
            }
        };

        self.handler.apply(&path, subscription.initial()).await;

        let mut keepalive = interval(self.keepalive);
        let mut stream_open = true;

        loop {
            tokio::select! {
                notification = subscription.next(), if stream_open => match notification {
                    Some(value) => self.handler.apply(&path, value).await,
                    None => {
                        warn!("notification stream closed, awaiting shutdown");
                        stream_open = false;
                    }
                },

                _ = keepalive.tick() => {
                    trace!("keep-alive tick");
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(ObserverCommand::Shutdown) => {
                        debug!("received shutdown command");
                        break;
                    }

                    None => {
                        warn!("command channel closed, shutting down");
                        break;
                    }
                }
            }
        }

        subscription.cancel();
        debug!("alarm observer stopped");
    }
}

/// Handle for controlling an AlarmObserverActor
#[derive(Clone)]
pub struct ObserverHandle {
    sender: mpsc::Sender<ObserverCommand>,

    /// Resource path this observer watches
    pub path: String,
}

impl ObserverHandle {
    /// Spawn a new observer actor for one alarm.
    pub fn spawn(
        config: AlarmConfig,
        client: Arc<dyn ResourceClient>,
        handler: AlarmHandler,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let path = config.path.clone();

        let actor = AlarmObserverActor::new(config, client, handler, cmd_rx);
        let join = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                path,
            },
            join,
        )
    }

    /// Gracefully shut down the observer. The observation is deregistered
    /// before the task terminates.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ObserverCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
