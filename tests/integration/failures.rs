//! Failure handling: bindings always leave `Refreshing`, backoff counters
//! move correctly, and one binding's failures never disturb another.

use std::time::Duration;

use castor::health::Health;
use castor::registry::{BindingState, RefreshStatus};

use crate::{
    binding_id, build_controller, replica_binding, test_config, wait_for, CollectingSink,
    MockTransport, PullBehavior,
};

#[tokio::test]
async fn test_failed_refresh_returns_to_available_and_counts() {
    let transport = MockTransport::new();
    transport.set_behavior(
        "acct_a/sales",
        PullBehavior::Fail {
            error: "snapshot endpoint returned 503".to_string(),
        },
    );
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("sales", Some(60))]);
    let (controller, _shutdown) = build_controller(&config, transport.clone(), sink);
    let id = binding_id("sales");

    controller.refresh_now(&id).unwrap();
    wait_for(
        || {
            controller
                .get_status(&id)
                .map(|s| s.last_refresh_status == RefreshStatus::Failed)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "failed refresh to finish",
    )
    .await;

    let status = controller.get_status(&id).unwrap();
    assert_eq!(status.state, BindingState::Available);
    assert_eq!(status.consecutive_failures, 1);
    assert!(status
        .last_error
        .as_deref()
        .unwrap()
        .contains("snapshot endpoint returned 503"));
}

#[tokio::test]
async fn test_success_resets_failures_and_clears_error() {
    let transport = MockTransport::new();
    transport.set_behavior(
        "acct_a/sales",
        PullBehavior::Fail {
            error: "transient".to_string(),
        },
    );
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("sales", Some(60))]);
    let (controller, _shutdown) = build_controller(&config, transport.clone(), sink);
    let id = binding_id("sales");

    // Two failures back to back
    for expected in 1..=2 {
        controller.refresh_now(&id).unwrap();
        wait_for(
            || {
                controller
                    .get_status(&id)
                    .map(|s| {
                        s.state == BindingState::Available
                            && s.consecutive_failures == expected
                    })
                    .unwrap_or(false)
            },
            Duration::from_secs(5),
            "failure to be recorded",
        )
        .await;
    }

    // Primary comes back
    transport.set_behavior(
        "acct_a/sales",
        PullBehavior::Success {
            bytes: 2048,
            delay: Duration::from_millis(5),
        },
    );
    controller.refresh_now(&id).unwrap();
    wait_for(
        || {
            controller
                .get_status(&id)
                .map(|s| s.last_refresh_status == RefreshStatus::Success)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "recovery refresh to finish",
    )
    .await;

    let status = controller.get_status(&id).unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.last_error, None);
    assert_eq!(status.health, Health::Healthy);
}

#[tokio::test]
async fn test_cancelled_refresh_releases_binding() {
    let transport = MockTransport::new();
    transport.set_behavior("acct_a/sales", PullBehavior::HangUntilCancelled);
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("sales", None)]);
    let (controller, _shutdown) = build_controller(&config, transport.clone(), sink);
    let id = binding_id("sales");

    controller.refresh_now(&id).unwrap();
    wait_for(
        || transport.call_count() == 1,
        Duration::from_secs(5),
        "refresh to start",
    )
    .await;

    assert!(controller.cancel_refresh(&id));
    wait_for(
        || {
            controller
                .get_status(&id)
                .map(|s| s.state == BindingState::Available)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "binding to leave Refreshing",
    )
    .await;

    let status = controller.get_status(&id).unwrap();
    assert_eq!(status.last_refresh_status, RefreshStatus::Failed);
    assert_eq!(status.last_error.as_deref(), Some("cancelled"));
    // Operator cancellation does not feed the backoff counter
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test]
async fn test_refresh_timeout_is_a_failure() {
    let transport = MockTransport::new();
    // refresh_timeout_secs in the test config is 2
    transport.set_behavior(
        "acct_a/sales",
        PullBehavior::Success {
            bytes: 0,
            delay: Duration::from_secs(30),
        },
    );
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("sales", None)]);
    let (controller, _shutdown) = build_controller(&config, transport.clone(), sink);
    let id = binding_id("sales");

    controller.refresh_now(&id).unwrap();
    wait_for(
        || {
            controller
                .get_status(&id)
                .map(|s| s.state == BindingState::Available)
                .unwrap_or(false)
        },
        Duration::from_secs(10),
        "timed-out refresh to finish",
    )
    .await;

    let status = controller.get_status(&id).unwrap();
    assert_eq!(status.last_refresh_status, RefreshStatus::Failed);
    assert!(status.last_error.as_deref().unwrap().contains("timed out"));
    assert_eq!(status.consecutive_failures, 1);
}

#[tokio::test]
async fn test_failing_binding_does_not_disturb_others() {
    let transport = MockTransport::new();
    transport.set_behavior(
        "acct_a/broken",
        PullBehavior::Fail {
            error: "permanent failure".to_string(),
        },
    );
    let sink = CollectingSink::new();
    let config = test_config(vec![
        replica_binding("broken", Some(60)),
        replica_binding("healthy", Some(60)),
    ]);
    let (controller, shutdown) = build_controller(&config, transport.clone(), sink);

    let handles = controller.start();
    let broken = binding_id("broken");
    let healthy = binding_id("healthy");

    wait_for(
        || {
            let broken_done = controller
                .get_status(&broken)
                .map(|s| s.last_refresh_status == RefreshStatus::Failed)
                .unwrap_or(false);
            let healthy_done = controller
                .get_status(&healthy)
                .map(|s| s.last_refresh_status == RefreshStatus::Success)
                .unwrap_or(false);
            broken_done && healthy_done
        },
        Duration::from_secs(10),
        "both bindings to complete their first attempt",
    )
    .await;

    assert_eq!(controller.get_status(&healthy).unwrap().health, Health::Healthy);
    assert_eq!(controller.list_unhealthy(), vec![broken.clone()]);

    // History saw both attempts
    let operations = controller.recent_operations(16);
    assert!(operations.iter().any(|op| op.binding_id == broken));
    assert!(operations.iter().any(|op| op.binding_id == healthy));

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}
