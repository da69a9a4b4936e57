//! Message types for actor communication

use tokio::sync::oneshot;

use crate::client::FetchError;

/// Commands that can be sent to a SensorPollerActor
#[derive(Debug)]
pub enum PollerCommand {
    /// Trigger an immediate poll (bypassing the interval timer)
    ///
    /// Used for testing and manual refresh operations.
    PollNow {
        /// Channel to send the result back
        respond_to: oneshot::Sender<Result<(), FetchError>>,
    },

    /// Gracefully shut down the poller
    Shutdown,
}

/// Commands that can be sent to an AlarmObserverActor
#[derive(Debug)]
pub enum ObserverCommand {
    /// Gracefully shut down the observer
    ///
    /// The actor deregisters its observation before terminating.
    Shutdown,
}
