//! Failure containment: an error inside one task never stops a sibling.

use std::sync::Arc;
use std::time::Duration;

use sensor_bridge::SensorValue;
use sensor_bridge::actors::observer::{AlarmHandler, ObserverHandle};
use sensor_bridge::actors::poller::PollerHandle;
use sensor_bridge::client::ResourceClient;
use sensor_bridge::config::AlarmAction;
use sensor_bridge::state::motion_state;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn subscribe_failure_leaves_siblings_running() {
    let collector = start_collector().await;

    let client = Arc::new(MockResourceClient::default());
    client.set_value("my_res/light", SensorValue::Integer(256));
    // only the lights alarm is observable; the accel registration will fail
    let push = client.on_subscribe("my_res/alarm_lights", SensorValue::Integer(0));

    let (writer, reader) = motion_state();
    let dyn_client: Arc<dyn ResourceClient> = client.clone();

    let (_dead_observer, dead_join) = ObserverHandle::spawn(
        alarm_config("my_res/alarm_accel", AlarmAction::Motion),
        dyn_client.clone(),
        AlarmHandler::Motion(writer),
    );

    let (live_observer, _live_join) = ObserverHandle::spawn(
        alarm_config(
            "my_res/alarm_lights",
            AlarmAction::Forward {
                key: "light_alarm".to_string(),
            },
        ),
        dyn_client.clone(),
        AlarmHandler::Forward {
            key: "light_alarm".to_string(),
            sink: test_sink(&collector.uri()),
        },
    );

    let (poller, _poller_join) = PollerHandle::spawn(
        sensor_config("my_res/light", 0.05, 0.05),
        dyn_client,
        test_sink(&collector.uri()),
        reader,
    );

    // the failing observer terminates on its own...
    tokio::time::timeout(Duration::from_secs(1), dead_join)
        .await
        .expect("observer with failed subscription did not terminate")
        .unwrap();

    // ...while its siblings keep working
    push.send(SensorValue::Integer(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let bodies: Vec<serde_json::Value> = collector
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == SINK_PATH)
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect();

    assert!(
        bodies
            .iter()
            .any(|body| *body == serde_json::json!({ "light_alarm": 1 }))
    );
    assert!(
        bodies
            .iter()
            .any(|body| *body == serde_json::json!({ "light": 256 }))
    );

    poller.shutdown().await.unwrap();
    live_observer.shutdown().await.unwrap();
}

#[tokio::test]
async fn sink_failures_do_not_stop_the_poller() {
    // a collector that rejects everything
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SINK_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&collector)
        .await;

    let client = Arc::new(MockResourceClient::default());
    client.set_value("my_res/light", SensorValue::Integer(256));

    let (_writer, reader) = motion_state();
    let dyn_client: Arc<dyn ResourceClient> = client.clone();

    let (poller, _poller_join) = PollerHandle::spawn(
        sensor_config("my_res/light", 0.02, 0.02),
        dyn_client,
        test_sink(&collector.uri()),
        reader,
    );

    tokio::time::sleep(Duration::from_millis(200)).await;

    // the loop kept polling even though every forward failed
    assert!(client.fetch_count("my_res/light") >= 3);
    // a dropped datapoint is not a fetch error
    poller.poll_now().await.unwrap();

    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn repeated_fetch_failures_never_terminate_the_poller() {
    let collector = start_collector().await;

    let client = Arc::new(MockResourceClient::default());
    client.set_value("my_res/rain", SensorValue::Float(0.2));
    for _ in 0..5 {
        client.fail_next_fetch("my_res/rain", sensor_bridge::client::FetchError::Timeout);
    }

    let (_writer, reader) = motion_state();
    let dyn_client: Arc<dyn ResourceClient> = client.clone();

    let (poller, _poller_join) = PollerHandle::spawn(
        sensor_config("my_res/rain", 0.01, 0.01),
        dyn_client,
        test_sink(&collector.uri()),
        reader,
    );

    tokio::time::sleep(Duration::from_millis(300)).await;

    // five failed cycles, then readings flow again
    assert!(client.fetch_count("my_res/rain") > 5);
    assert!(posts(&collector).await >= 1);

    poller.shutdown().await.unwrap();
}
