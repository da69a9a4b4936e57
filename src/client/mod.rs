//! Client side of the resource protocol.
//!
//! The core only depends on the [`ResourceClient`] trait: a single-shot
//! `fetch` plus a long-lived `subscribe` that yields an initial value and a
//! stream of pushed notifications. The production implementation speaks CoAP
//! over UDP ([`coap::CoapClient`]); tests substitute scripted in-memory
//! clients.

pub mod coap;
pub mod error;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::SensorValue;

pub use error::{FetchError, SubscribeError};

#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Request the current value of a resource.
    async fn fetch(&self, path: &str) -> Result<SensorValue, FetchError>;

    /// Establish a long-lived observation of a resource. On success the
    /// server's current value is available immediately; every later change
    /// arrives as a pushed notification.
    async fn subscribe(&self, path: &str) -> Result<Subscription, SubscribeError>;
}

/// One active observation, owned by its observer task.
///
/// Dropping the handle deregisters the observation as well, but observers
/// cancel explicitly so the deregistration happens before task termination.
#[derive(Debug)]
pub struct Subscription {
    initial: SensorValue,
    notifications: mpsc::Receiver<SensorValue>,
    canceller: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(
        initial: SensorValue,
        notifications: mpsc::Receiver<SensorValue>,
        canceller: oneshot::Sender<()>,
    ) -> Self {
        Self {
            initial,
            notifications,
            canceller: Some(canceller),
        }
    }

    /// The value reported by the server when the observation was
    /// established.
    pub fn initial(&self) -> SensorValue {
        self.initial
    }

    /// Wait for the next pushed notification. Returns `None` once the
    /// notification stream has ended.
    pub async fn next(&mut self) -> Option<SensorValue> {
        self.notifications.recv().await
    }

    /// Deregister the observation. Idempotent: a second call is a no-op.
    pub fn cancel(&mut self) {
        if let Some(canceller) = self.canceller.take() {
            let _ = canceller.send(());
        }
    }
}
