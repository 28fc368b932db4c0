mod common;

use common::{instant_switch_config, text_frame, Faults, Harness};
use potbridge::bridge::{BridgeError, BridgeHandle, BridgeStatus, JoystickState};
use std::time::Duration;

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 2s");
}

fn slow_reads() -> Harness {
    Harness {
        idle_read: Duration::from_millis(5),
        ..Harness::new()
    }
}

#[tokio::test]
async fn stop_returns_summary_and_neutralizes_outputs() {
    let harness = slow_reads();
    harness.push(text_frame([220; 8], 255, 0));
    let mut handle = BridgeHandle::spawn(instant_switch_config(), harness.connector());

    wait_until(|| !harness.updates().is_empty()).await;
    assert!(handle.is_running());

    let summary = handle.stop().await.unwrap();

    assert_eq!(summary.frames, 1);
    assert_eq!(summary.key_taps, 2);
    assert_eq!(harness.last_update(), Some(JoystickState::neutral()));
    assert!(harness.transport_closed());
    assert_eq!(*handle.status().borrow(), BridgeStatus::Stopped);
}

#[tokio::test]
async fn second_stop_reports_not_running() {
    let harness = slow_reads();
    let mut handle = BridgeHandle::spawn(instant_switch_config(), harness.connector());

    handle.stop().await.unwrap();

    assert!(matches!(handle.stop().await, Err(BridgeError::NotRunning)));
}

#[tokio::test]
async fn subscribers_see_decoded_telemetry() {
    let harness = slow_reads();
    let mut handle = BridgeHandle::spawn(instant_switch_config(), harness.connector());
    let mut telemetry = handle.subscribe();

    harness.push(text_frame([42; 8], 0, 255));
    tokio::time::timeout(Duration::from_secs(2), telemetry.changed())
        .await
        .expect("snapshot published")
        .unwrap();

    let snapshot = telemetry.borrow_and_update().clone();
    assert_eq!(snapshot.pots, [42; 8]);
    assert_eq!(snapshot.switches, [false, true]);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn wait_reports_connection_failure() {
    let harness = Harness::with_faults(Faults {
        transport_open: true,
        ..Faults::default()
    });
    let mut handle = BridgeHandle::spawn(instant_switch_config(), harness.connector());

    let result = handle.wait().await;

    assert!(matches!(result, Err(BridgeError::TransportOpen(_))));
    assert!(matches!(*handle.status().borrow(), BridgeStatus::Failed(_)));
    assert!(!handle.is_running());
}

#[tokio::test]
async fn wait_returns_when_joystick_fails_mid_run() {
    let harness = Harness::with_faults(Faults {
        updates_after: Some(1),
        ..Faults::default()
    });
    harness.push(text_frame([128; 8], 0, 0));
    harness.push(text_frame([129; 8], 0, 0));
    let mut handle = BridgeHandle::spawn(instant_switch_config(), harness.connector());

    let result = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("worker ended");

    assert!(matches!(result, Err(BridgeError::OutputSink(_))));
    assert_eq!(harness.updates().len(), 1);
}

#[tokio::test]
async fn stop_times_out_on_a_blocked_worker() {
    let harness = Harness {
        idle_read: Duration::from_millis(400),
        ..Harness::new()
    };
    let mut config = instant_switch_config();
    config.timing.stop_timeout_ms = 50;
    let mut handle = BridgeHandle::spawn(config, harness.connector());
    wait_until(|| harness.transport_opened()).await;

    let first = handle.stop().await;
    assert!(matches!(first, Err(BridgeError::StopTimeout(_))));

    // The worker finishes its read, sees the cancellation and exits
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.stop().await.unwrap();
    assert!(harness.transport_closed());
}
