//! SensorPollerActor - Polls one sensor resource at an adaptive interval
//!
//! ## Message Flow
//!
//! ```text
//! Fetch resource → Forward reading → Sleep (fast or slow) ─┐
//!     ▲                                                    │
//!     └────────────────────────────────────────────────────┘
//!                         ▲
//!                         └─── Commands (PollNow, Shutdown)
//! ```
//!
//! The sleep duration is recomputed after every cycle from the shared
//! activity state, so a motion transition takes effect on the very next
//! cycle. Fetch and sink failures are logged and skipped; the loop only
//! terminates on `Shutdown`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

use crate::client::{FetchError, ResourceClient};
use crate::config::SensorConfig;
use crate::sink::{TelemetrySink, telemetry_key};
use crate::state::MotionReader;

use super::messages::PollerCommand;

/// Actor that polls a single sensor resource.
pub struct SensorPollerActor {
    /// Sensor configuration
    config: SensorConfig,

    /// Resource protocol client (shared across all tasks)
    client: Arc<dyn ResourceClient>,

    /// Telemetry collector client
    sink: TelemetrySink,

    /// Read half of the shared activity state
    motion: MotionReader,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<PollerCommand>,

    /// Display name for logging
    display_name: String,
}

impl SensorPollerActor {
    pub fn new(
        config: SensorConfig,
        client: Arc<dyn ResourceClient>,
        sink: TelemetrySink,
        motion: MotionReader,
        command_rx: mpsc::Receiver<PollerCommand>,
    ) -> Self {
        let display_name = config.display_name().to_string();

        Self {
            config,
            client,
            sink,
            motion,
            command_rx,
            display_name,
        }
    }

    /// Run the actor's main loop until a `Shutdown` command arrives or the
    /// command channel closes.
    #[instrument(skip(self), fields(sensor = %self.display_name))]
    pub async fn run(mut self) {
        debug!("starting sensor poller");

        loop {
            if let Err(e) = self.poll_once().await {
                warn!("poll failed: {e}");
            }

            let delay = self.config.poll_delay(self.motion.is_moving());
            trace!("sleeping for {delay:?}");

            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);

            let shutdown = loop {
                tokio::select! {
                    _ = &mut sleep => break false,

                    cmd = self.command_rx.recv() => match cmd {
                        Some(PollerCommand::PollNow { respond_to }) => {
                            debug!("received PollNow command");
                            let result = self.poll_once().await;
                            let _ = respond_to.send(result);
                        }

                        Some(PollerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break true;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break true;
                        }
                    }
                }
            };

            if shutdown {
                break;
            }
        }

        debug!("sensor poller stopped");
    }

    /// Fetch the resource once and forward the reading.
    ///
    /// A sink failure is logged and the reading dropped; the datapoint is
    /// not retried and the fetch still counts as successful.
    async fn poll_once(&self) -> Result<(), FetchError> {
        trace!("requesting {}", self.config.path);

        let value = self.client.fetch(&self.config.path).await?;
        debug!("{}: {value}", self.display_name);

        let key = telemetry_key(&self.config.path);
        if let Err(e) = self.sink.post(key, value).await {
            warn!("{}: failed to forward reading: {e}", self.display_name);
        }

        Ok(())
    }
}

/// Handle for controlling a SensorPollerActor
///
/// Can be cloned and shared; the join handle returned by [`PollerHandle::spawn`]
/// is what the orchestrator awaits during the shutdown grace period.
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,

    /// Resource path this poller watches
    pub path: String,

    /// Display name
    pub display_name: String,
}

impl PollerHandle {
    /// Spawn a new poller actor for one sensor.
    pub fn spawn(
        config: SensorConfig,
        client: Arc<dyn ResourceClient>,
        sink: TelemetrySink,
        motion: MotionReader,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let path = config.path.clone();
        let display_name = config.display_name().to_string();

        let actor = SensorPollerActor::new(config, client, sink, motion, cmd_rx);
        let join = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                path,
                display_name,
            },
            join,
        )
    }

    /// Trigger an immediate poll, bypassing the interval timer.
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Gracefully shut down the poller.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
