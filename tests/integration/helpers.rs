//! Test helpers: a scriptable in-memory resource client plus sink plumbing

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sensor_bridge::SensorValue;
use sensor_bridge::client::{FetchError, ResourceClient, SubscribeError, Subscription};
use sensor_bridge::config::{AlarmAction, AlarmConfig, ResolvedTelemetryConfig, SensorConfig};
use sensor_bridge::sink::TelemetrySink;
use tokio::sync::{mpsc, oneshot};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SINK_PATH: &str = "/api/v1/test-token/telemetry";

/// A sink pointed at a mock collector.
pub fn test_sink(uri: &str) -> TelemetrySink {
    TelemetrySink::new(&ResolvedTelemetryConfig {
        url: uri.to_string(),
        token: "test-token".to_string(),
    })
}

/// A mock collector accepting everything.
pub async fn start_collector() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    mock_server
}

/// Number of telemetry posts the collector has received so far.
pub async fn posts(collector: &MockServer) -> usize {
    collector
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == SINK_PATH)
        .count()
}

pub fn sensor_config(path: &str, fast_interval: f64, slow_interval: f64) -> SensorConfig {
    SensorConfig {
        path: path.to_string(),
        display: None,
        fast_interval,
        slow_interval,
    }
}

pub fn alarm_config(path: &str, action: AlarmAction) -> AlarmConfig {
    AlarmConfig {
        path: path.to_string(),
        action,
    }
}

/// In-memory [`ResourceClient`] with scriptable fetch results and
/// test-driven observations.
#[derive(Default)]
pub struct MockResourceClient {
    values: Mutex<HashMap<String, SensorValue>>,
    scripted_failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    fetch_counts: Mutex<HashMap<String, usize>>,
    pending: Mutex<HashMap<String, PendingObservation>>,
    unsubscribes: Arc<AtomicUsize>,
}

struct PendingObservation {
    initial: SensorValue,
    notifications: mpsc::Receiver<SensorValue>,
}

impl MockResourceClient {
    /// Fixed value returned by every fetch of `path`.
    pub fn set_value(&self, path: &str, value: SensorValue) {
        self.values
            .lock()
            .unwrap()
            .insert(path.to_string(), value);
    }

    /// Queue a failure for the next fetch of `path`; later fetches fall
    /// back to the fixed value.
    pub fn fail_next_fetch(&self, path: &str, error: FetchError) {
        self.scripted_failures
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetch_counts
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Register an observation source for `path`. The returned sender
    /// pushes notifications into a later subscription.
    pub fn on_subscribe(&self, path: &str, initial: SensorValue) -> mpsc::Sender<SensorValue> {
        let (tx, rx) = mpsc::channel(16);
        self.pending.lock().unwrap().insert(
            path.to_string(),
            PendingObservation {
                initial,
                notifications: rx,
            },
        );
        tx
    }

    /// Number of explicit unsubscribe calls across all observations.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    async fn fetch(&self, path: &str) -> Result<SensorValue, FetchError> {
        *self
            .fetch_counts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;

        if let Some(error) = self
            .scripted_failures
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }

        self.values
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or(FetchError::NotFound)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, SubscribeError> {
        let Some(pending) = self.pending.lock().unwrap().remove(path) else {
            return Err(SubscribeError::Rejected(
                "no observation registered".to_string(),
            ));
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let unsubscribes = self.unsubscribes.clone();
        tokio::spawn(async move {
            // only an explicit cancel counts as an unsubscribe call
            if cancel_rx.await.is_ok() {
                unsubscribes.fetch_add(1, Ordering::SeqCst);
            }
        });

        Ok(Subscription::new(
            pending.initial,
            pending.notifications,
            cancel_tx,
        ))
    }
}
