//! Scheduling behavior: due checks, the shared claim path, and the
//! at-most-one-refresh-in-flight guarantee.

use std::sync::Arc;
use std::time::{Duration, Instant};

use castor::registry::{BindingState, RefreshStatus};

use crate::{
    binding_id, build_controller, replica_binding, test_config, wait_for, CollectingSink,
    MockTransport, PullBehavior,
};

#[tokio::test]
async fn test_scheduled_refresh_runs_for_due_binding() {
    let transport = MockTransport::new();
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("sales", Some(60))]);
    let (controller, shutdown) = build_controller(&config, transport.clone(), sink);

    // Never refreshed with an interval: due on the first tick
    let handles = controller.start();
    let id = binding_id("sales");
    wait_for(
        || {
            controller
                .get_status(&id)
                .map(|s| s.last_refresh_status == RefreshStatus::Success)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "scheduled refresh to complete",
    )
    .await;

    assert_eq!(transport.call_count(), 1);
    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_manual_only_binding_is_never_scheduled() {
    let transport = MockTransport::new();
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("manual", None)]);
    let (controller, shutdown) = build_controller(&config, transport.clone(), sink);

    let handles = controller.start();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.call_count(), 0);

    // But a manual trigger refreshes it
    let id = binding_id("manual");
    controller.refresh_now(&id).unwrap();
    wait_for(
        || {
            controller
                .get_status(&id)
                .map(|s| s.last_refresh_status == RefreshStatus::Success)
                .unwrap_or(false)
        },
        Duration::from_secs(5),
        "manual refresh to complete",
    )
    .await;

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_concurrent_triggers_admit_single_refresh() {
    let transport = MockTransport::new();
    transport.set_behavior("acct_a/sales", PullBehavior::HangUntilCancelled);
    let sink = CollectingSink::new();
    let config = test_config(vec![replica_binding("sales", Some(60))]);
    let (controller, _shutdown) = build_controller(&config, transport.clone(), sink);
    let controller = Arc::new(controller);
    let id = binding_id("sales");

    // Twenty concurrent manual triggers race for the claim
    let mut tasks = Vec::new();
    for _ in 0..20 {
        let controller = controller.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            controller.refresh_now(&id).is_ok()
        }));
    }
    let mut wins = 0;
    for task in tasks {
        if task.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);

    wait_for(
        || transport.call_count() == 1,
        Duration::from_secs(5),
        "the winning refresh to reach the transport",
    )
    .await;

    // While the attempt hangs, the registry never offers the binding again
    let registry = controller.registry();
    assert!(registry
        .list_due(Instant::now() + Duration::from_secs(7200), 16)
        .is_empty());
    assert_eq!(
        registry.snapshot(&id).unwrap().state,
        BindingState::Refreshing
    );

    // Cancellation releases the claim
    assert!(controller.cancel_refresh(&id));
    wait_for(
        || {
            registry.snapshot(&id).map(|b| b.state).ok() == Some(BindingState::Available)
        },
        Duration::from_secs(5),
        "binding to return to Available",
    )
    .await;
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_worker_pool_bounds_concurrent_transfers() {
    let transport = MockTransport::new();
    let sink = CollectingSink::new();
    let mut config = test_config(
        (0..6)
            .map(|i| replica_binding(&format!("db_{i}"), Some(60)))
            .collect(),
    );
    config.executor.max_concurrent_refreshes = 2;
    for i in 0..6 {
        transport.set_behavior(
            &format!("acct_a/db_{i}"),
            PullBehavior::Success {
                bytes: 64,
                delay: Duration::from_millis(50),
            },
        );
    }
    let (controller, shutdown) = build_controller(&config, transport.clone(), sink);

    let handles = controller.start();
    wait_for(
        || transport.call_count() >= 6,
        Duration::from_secs(10),
        "all six refreshes to run",
    )
    .await;

    assert!(transport.max_active.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_refresh_now_while_refreshing_is_rejected() {
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
        "first refresh to start",
    )
    .await;

    assert!(controller.refresh_now(&id).is_err());
    controller.cancel_refresh(&id);
}
