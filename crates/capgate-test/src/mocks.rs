//! Mock capability handlers for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use capgate::{CapabilityDescriptor, CapabilityHandler, HandlerError};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Handler that records every call and answers with a fixed response.
///
/// Clones share the same recording, so a test can keep one clone and hand
/// the other to the manager.
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    calls: Arc<Mutex<Vec<Value>>>,
    response: Option<Value>,
}

impl RecordingHandler {
    /// Handler that echoes its parameters as `{"echo": params}`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            response: None,
        }
    }

    /// Always answer with `response`.
    #[must_use]
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    /// Descriptor named `name` backed by this handler.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(name).with_handler(Arc::new(self.clone()))
    }

    /// Parameters of every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Parameters of the most recent call.
    #[must_use]
    pub fn last_params(&self) -> Option<Value> {
        self.calls.lock().ok().and_then(|c| c.last().cloned())
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityHandler for RecordingHandler {
    async fn call(&self, params: Value, _cancel: CancellationToken) -> Result<Value, HandlerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(params.clone());
        }
        Ok(self
            .response
            .clone()
            .unwrap_or_else(|| json!({ "echo": params })))
    }
}

/// Handler that always fails with the same message.
#[derive(Debug, Clone)]
pub struct FailingHandler {
    message: String,
}

impl FailingHandler {
    /// Handler failing with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Descriptor named `name` backed by this handler.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(name).with_handler(Arc::new(self.clone()))
    }
}

#[async_trait]
impl CapabilityHandler for FailingHandler {
    async fn call(&self, _params: Value, _cancel: CancellationToken) -> Result<Value, HandlerError> {
        Err(HandlerError::new(self.message.clone()))
    }
}

/// Handler that takes `delay` to answer, stopping early when cancelled.
///
/// Counts started and completed calls so tests can tell an abandoned call
/// from a finished one.
#[derive(Debug, Clone)]
pub struct SlowHandler {
    delay: Duration,
    started: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl SlowHandler {
    /// Handler answering after `delay`.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Descriptor named `name` backed by this handler.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(name).with_handler(Arc::new(self.clone()))
    }

    /// Calls that began.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityHandler for SlowHandler {
    async fn call(&self, params: Value, cancel: CancellationToken) -> Result<Value, HandlerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            () = cancel.cancelled() => Err(HandlerError::new("cancelled")),
            () = tokio::time::sleep(self.delay) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                let slept_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX);
                Ok(json!({ "slept_ms": slept_ms, "params": params }))
            },
        }
    }
}

/// Handler that panics with the given message.
#[derive(Debug, Clone)]
pub struct PanickingHandler {
    message: String,
}

impl PanickingHandler {
    /// Handler panicking with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Descriptor named `name` backed by this handler.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(name).with_handler(Arc::new(self.clone()))
    }
}

#[async_trait]
impl CapabilityHandler for PanickingHandler {
    async fn call(&self, _params: Value, _cancel: CancellationToken) -> Result<Value, HandlerError> {
        panic!("{}", self.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_handler_shares_calls() {
        let handler = RecordingHandler::new();
        let shared = handler.clone();

        let out = handler
            .call(json!({ "q": 1 }), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, json!({ "echo": { "q": 1 } }));
        assert_eq!(shared.call_count(), 1);
        assert_eq!(shared.last_params(), Some(json!({ "q": 1 })));
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let handler = RecordingHandler::new().with_response(json!("done"));
        let out = handler.call(json!(null), CancellationToken::new()).await;
        assert_eq!(out, Ok(json!("done")));
    }

    #[tokio::test]
    async fn test_failing_handler() {
        let err = FailingHandler::new("nope")
            .call(json!({}), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.message, "nope");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_honours_cancel() {
        let handler = SlowHandler::new(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = handler.call(json!({}), cancel).await;
        assert!(out.is_err());
        assert_eq!(handler.started(), 1);
        assert_eq!(handler.completed(), 0);

        let out = handler.call(json!({}), CancellationToken::new()).await;
        assert!(out.is_ok());
        assert_eq!(handler.completed(), 1);
    }
}
