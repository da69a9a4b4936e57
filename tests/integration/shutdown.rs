//! Cancellation and cleanup: observers deregister exactly once, all tasks
//! stop inside the grace period.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use sensor_bridge::SensorValue;
use sensor_bridge::actors::observer::{AlarmHandler, ObserverHandle};
use sensor_bridge::actors::poller::PollerHandle;
use sensor_bridge::client::{ResourceClient, Subscription};
use sensor_bridge::config::AlarmAction;
use sensor_bridge::state::motion_state;
use tokio::sync::{mpsc, oneshot};

use crate::helpers::*;

#[tokio::test]
async fn observer_cancellation_unsubscribes_exactly_once() {
    let client = Arc::new(MockResourceClient::default());
    let _push = client.on_subscribe("my_res/alarm_accel", SensorValue::Integer(0));

    let (writer, _reader) = motion_state();
    let dyn_client: Arc<dyn ResourceClient> = client.clone();

    let (observer, join) = ObserverHandle::spawn(
        alarm_config("my_res/alarm_accel", AlarmAction::Motion),
        dyn_client,
        AlarmHandler::Motion(writer),
    );

    // the observer is suspended awaiting a notification
    tokio::time::sleep(Duration::from_millis(50)).await;

    observer.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), join)
        .await
        .expect("observer did not terminate within the grace period")
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.unsubscribe_count(), 1);
}

#[tokio::test]
async fn cancelling_a_subscription_twice_is_a_no_op() {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let (_notification_tx, notification_rx) = mpsc::channel::<SensorValue>(1);

    let mut subscription =
        Subscription::new(SensorValue::Integer(0), notification_rx, cancel_tx);

    subscription.cancel();
    subscription.cancel();

    // exactly one cancellation signal was delivered
    assert!(cancel_rx.await.is_ok());
}

#[tokio::test]
async fn all_tasks_stop_within_the_grace_period() {
    let collector = start_collector().await;

    let client = Arc::new(MockResourceClient::default());
    client.set_value("my_res/light", SensorValue::Integer(256));
    client.set_value("my_res/rain", SensorValue::Float(0.0));
    let _accel = client.on_subscribe("my_res/alarm_accel", SensorValue::Integer(0));
    let _lights = client.on_subscribe("my_res/alarm_lights", SensorValue::Integer(0));

    let (writer, reader) = motion_state();
    let dyn_client: Arc<dyn ResourceClient> = client.clone();

    let mut pollers = Vec::new();
    let mut observers = Vec::new();
    let mut tasks = Vec::new();

    for path in ["my_res/light", "my_res/rain"] {
        let (handle, join) = PollerHandle::spawn(
            sensor_config(path, 0.05, 0.05),
            dyn_client.clone(),
            test_sink(&collector.uri()),
            reader.clone(),
        );
        pollers.push(handle);
        tasks.push(join);
    }

    let (handle, join) = ObserverHandle::spawn(
        alarm_config("my_res/alarm_accel", AlarmAction::Motion),
        dyn_client.clone(),
        AlarmHandler::Motion(writer),
    );
    observers.push(handle);
    tasks.push(join);

    let (handle, join) = ObserverHandle::spawn(
        alarm_config(
            "my_res/alarm_lights",
            AlarmAction::Forward {
                key: "light_alarm".to_string(),
            },
        ),
        dyn_client,
        AlarmHandler::Forward {
            key: "light_alarm".to_string(),
            sink: test_sink(&collector.uri()),
        },
    );
    observers.push(handle);
    tasks.push(join);

    tokio::time::sleep(Duration::from_millis(100)).await;

    for poller in &pollers {
        poller.shutdown().await.unwrap();
    }
    for observer in &observers {
        observer.shutdown().await.unwrap();
    }

    let results = tokio::time::timeout(Duration::from_secs(1), join_all(tasks))
        .await
        .expect("tasks did not stop within the grace period");
    assert!(results.iter().all(|result| result.is_ok()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.unsubscribe_count(), 2);
}
