//! End-to-end execution through the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use capgate::{
    ActivationEvent, CapabilityDescriptor, Dispatcher, ExecuteOptions, ExecutionError, Tier,
};
use capgate_test::prelude::*;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_unregistered_capability_is_a_soft_failure() {
    let manager = test_manager(10);
    let dispatcher = test_dispatcher(&manager);

    let result = dispatcher
        .execute("nonexistent:capability", json!({}))
        .await;

    assert!(!result.success);
    assert_eq!(result.error_kind(), Some("UnregisteredCapability"));
    assert!(result.result.is_none());
    assert!(!manager.is_registered("nonexistent:capability"));
    assert!(!manager.is_active("nonexistent:capability"));

    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["success"], false);
    assert_eq!(wire["error"]["kind"], "UnregisteredCapability");
}

#[tokio::test]
async fn test_handlerless_capability_returns_stub() {
    let manager = test_manager(10);
    manager.register(CapabilityDescriptor::new("x")).unwrap();
    assert!(manager.activate("x").unwrap());
    let dispatcher = test_dispatcher(&manager);

    let result = dispatcher.execute("x", json!({ "a": 1 })).await;

    assert!(result.success);
    assert!(result.metadata.stub);
    assert!(!result.metadata.auto_activated);
    assert_eq!(
        result.result,
        Some(json!({ "stub": true, "name": "x", "params": { "a": 1 } }))
    );
}

#[tokio::test]
async fn test_inactive_capability_is_auto_activated() {
    let manager = test_manager(10);
    let handler = RecordingHandler::new();
    manager.register(handler.descriptor("db:query")).unwrap();
    assert!(!manager.is_active("db:query"));

    let dispatcher = test_dispatcher(&manager);
    let result = dispatcher.execute("db:query", json!({ "sql": "select 1" })).await;

    assert!(result.success);
    assert!(result.metadata.auto_activated);
    assert!(manager.is_active("db:query"));
    assert_eq!(handler.last_params(), Some(json!({ "sql": "select 1" })));

    // Second call finds it active.
    let again = dispatcher.execute("db:query", json!({})).await;
    assert!(!again.metadata.auto_activated);
    assert_eq!(dispatcher.stats().auto_activations, 1);
}

#[tokio::test]
async fn test_auto_activation_respects_cap() {
    let manager = test_manager(2);
    manager
        .register(CapabilityDescriptor::new("keep").with_tier(Tier::High))
        .unwrap();
    manager
        .register(CapabilityDescriptor::new("old").with_tier(Tier::Low))
        .unwrap();
    manager.activate_many(["keep", "old"]).unwrap();

    let handler = RecordingHandler::new();
    manager.register(handler.descriptor("new")).unwrap();
    let dispatcher = test_dispatcher(&manager);

    let result = dispatcher.execute("new", json!({})).await;
    assert!(result.success);
    assert_eq!(manager.list_active(), vec!["keep", "new"]);
    assert_eq!(manager.stats().last_evicted, vec!["old"]);
}

#[tokio::test]
async fn test_handler_error_is_reported() {
    let manager = test_manager(10);
    manager
        .register(FailingHandler::new("connection refused").descriptor("db:query"))
        .unwrap();
    let dispatcher = test_dispatcher(&manager);

    let result = dispatcher.execute("db:query", json!({})).await;

    assert!(!result.success);
    assert_eq!(
        result.error,
        Some(ExecutionError::HandlerExecutionError {
            message: "connection refused".to_owned()
        })
    );
    assert_eq!(dispatcher.stats().failures, 1);
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let manager = test_manager(10);
    manager
        .register(PanickingHandler::new("driver crashed").descriptor("browser:open"))
        .unwrap();
    let dispatcher = test_dispatcher(&manager);

    let result = dispatcher.execute("browser:open", json!({})).await;
    assert_eq!(result.error_kind(), Some("HandlerExecutionError"));

    // The manager is still usable afterwards.
    assert!(manager.is_active("browser:open"));
    assert!(manager.activate("other").unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_distinct_from_handler_error() {
    let manager = test_manager(10);
    let slow = SlowHandler::new(Duration::from_secs(30));
    manager.register(slow.descriptor("screenshot")).unwrap();
    let dispatcher = Dispatcher::new(Arc::clone(&manager))
        .with_default_timeout(Duration::from_secs(5));

    let result = dispatcher.execute("screenshot", json!({})).await;

    assert_eq!(
        result.error,
        Some(ExecutionError::Timeout { timeout_ms: 5000 })
    );
    assert_eq!(slow.started(), 1);
    assert_eq!(slow.completed(), 0);
    assert_eq!(dispatcher.stats().timeouts, 1);

    // A per-call timeout overrides the default.
    let result = dispatcher
        .execute_with(
            "screenshot",
            json!({}),
            ExecuteOptions::new().with_timeout(Duration::from_secs(60)),
        )
        .await;
    assert!(result.success, "{result:?}");
    assert_eq!(slow.completed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_execution() {
    let manager = test_manager(10);
    let slow = SlowHandler::new(Duration::from_secs(30));
    manager.register(slow.descriptor("code:search")).unwrap();
    let dispatcher = Arc::new(test_dispatcher(&manager));

    let cancel = CancellationToken::new();
    let task = {
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            dispatcher
                .execute_with(
                    "code:search",
                    json!({}),
                    ExecuteOptions::new().with_cancel(cancel),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    let result = task.await.unwrap();

    assert_eq!(result.error, Some(ExecutionError::Cancelled));
    assert_eq!(slow.completed(), 0);
    assert_eq!(dispatcher.stats().cancellations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cached_results_expire() {
    let manager = test_manager(10);
    let handler = RecordingHandler::new();
    manager.register(handler.descriptor("docs:search")).unwrap();
    let dispatcher =
        test_dispatcher(&manager).cacheable("docs:search", Duration::from_secs(60));

    let params = json!({ "q": "rust" });
    let first = dispatcher.execute("docs:search", params.clone()).await;
    let second = dispatcher.execute("docs:search", params.clone()).await;
    assert!(!first.metadata.cached);
    assert!(second.metadata.cached);
    assert_eq!(first.result, second.result);
    assert_eq!(handler.call_count(), 1);

    // Different parameters are a different entry.
    dispatcher.execute("docs:search", json!({ "q": "go" })).await;
    assert_eq!(handler.call_count(), 2);

    // Bypass skips the cache entirely.
    let bypassed = dispatcher
        .execute_with("docs:search", params.clone(), ExecuteOptions::new().bypass_cache())
        .await;
    assert!(!bypassed.metadata.cached);
    assert_eq!(handler.call_count(), 3);

    tokio::time::advance(Duration::from_secs(61)).await;
    let expired = dispatcher.execute("docs:search", params).await;
    assert!(!expired.metadata.cached);
    assert_eq!(handler.call_count(), 4);
    assert_eq!(dispatcher.stats().cache_hits, 1);
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let manager = test_manager(10);
    manager
        .register(FailingHandler::new("rate limited").descriptor("web:fetch"))
        .unwrap();
    let dispatcher = test_dispatcher(&manager).cacheable("web:fetch", Duration::from_secs(60));

    dispatcher.execute("web:fetch", json!({})).await;
    let second = dispatcher.execute("web:fetch", json!({})).await;

    assert!(!second.success);
    assert!(!second.metadata.cached);
    assert!(dispatcher.cache().unwrap().is_empty());
}

#[tokio::test]
async fn test_execution_events() {
    let manager = test_manager(10);
    manager.register(CapabilityDescriptor::new("x")).unwrap();
    let mut events = manager.subscribe();
    let dispatcher = test_dispatcher(&manager);

    dispatcher.execute("x", json!({})).await;
    dispatcher.execute("missing", json!({})).await;

    let finished: Vec<(String, bool, Option<String>)> = events
        .drain()
        .iter()
        .filter_map(|event| match &**event {
            ActivationEvent::ExecutionFinished {
                capability,
                success,
                error_kind,
                ..
            } => Some((capability.clone(), *success, error_kind.clone())),
            _ => None,
        })
        .collect();

    assert_eq!(
        finished,
        vec![
            ("x".to_owned(), true, None),
            (
                "missing".to_owned(),
                false,
                Some("UnregisteredCapability".to_owned())
            ),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_handler_does_not_block_activation() {
    let manager = test_manager(10);
    let slow = SlowHandler::new(Duration::from_millis(300));
    manager.register(slow.descriptor("db:query")).unwrap();
    let dispatcher = Arc::new(test_dispatcher(&manager));

    let running = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.execute("db:query", json!({})).await })
    };

    while slow.started() == 0 {
        tokio::task::yield_now().await;
    }
    // The handler is mid-flight; bookkeeping calls still go through.
    assert!(manager.activate("fs:read").unwrap());
    assert!(manager.deactivate("fs:read"));
    assert_eq!(slow.completed(), 0);

    let result = running.await.unwrap();
    assert!(result.success);
}
