//! Capability execution.
//!
//! The [`Dispatcher`] is the only call surface that runs capabilities. It
//! never fails: every outcome, including unknown names, handler errors,
//! panics, timeouts and cancellation, comes back as an [`ExecutionResult`].

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use capgate_events::{ActivationEvent, EventMetadata};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::descriptor::CapabilityHandler;
use crate::error::ExecutionError;
use crate::manager::ActivationManager;
use crate::stats::DispatchStats;

const EVENT_SOURCE: &str = "capgate.dispatch";

/// Observable side facts about one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// The capability was inactive and got activated for this call.
    pub auto_activated: bool,
    /// No handler is attached; the result is the stub payload.
    pub stub: bool,
    /// The result came from the result cache.
    pub cached: bool,
    /// Wall time spent in `execute`, in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of [`Dispatcher::execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the capability produced a result.
    pub success: bool,
    /// Handler output, stub payload or cached value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Why the execution failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    /// Side facts about the execution.
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    /// Successful result.
    #[must_use]
    pub fn ok(result: Value, metadata: ExecutionMetadata) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            metadata,
        }
    }

    /// Failed result.
    #[must_use]
    pub fn failure(error: ExecutionError, metadata: ExecutionMetadata) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            metadata,
        }
    }

    /// Label of the error kind, if the execution failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<&'static str> {
        self.error.as_ref().map(ExecutionError::kind)
    }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct ExecuteOptions {
    /// Timeout for this call, overriding the dispatcher default.
    pub timeout: Option<Duration>,
    /// Caller's cancellation token.
    pub cancel: Option<CancellationToken>,
    /// Skip the result cache even for cacheable capabilities.
    pub bypass_cache: bool,
}

impl ExecuteOptions {
    /// Options with dispatcher defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Do not read or write the result cache.
    pub fn bypass_cache(mut self) -> Self {
        self.bypass_cache = true;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    executions: AtomicU64,
    auto_activations: AtomicU64,
    stubs: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    cache_hits: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Runs capabilities by name through an [`ActivationManager`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use capgate::{ActivationManager, CapabilityDescriptor, Dispatcher};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let manager = Arc::new(ActivationManager::new(10).unwrap());
/// manager.register(CapabilityDescriptor::new("x")).unwrap();
///
/// let dispatcher = Dispatcher::new(Arc::clone(&manager));
/// let result = dispatcher.execute("x", json!({ "a": 1 })).await;
///
/// assert!(result.success);
/// assert!(result.metadata.auto_activated);
/// assert_eq!(result.result.unwrap()["stub"], true);
/// # }
/// ```
#[derive(Debug)]
pub struct Dispatcher {
    manager: Arc<ActivationManager>,
    default_timeout: Option<Duration>,
    cache: Option<Arc<ResultCache>>,
    cacheable: HashMap<String, Duration>,
    counters: Counters,
}

impl Dispatcher {
    /// Dispatcher without a default timeout or cache.
    #[must_use]
    pub fn new(manager: Arc<ActivationManager>) -> Self {
        Self {
            manager,
            default_timeout: None,
            cache: None,
            cacheable: HashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Apply `timeout` to every call that does not set its own.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Use `cache` for cacheable capabilities.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Memoize successful results of `name` for `ttl`. Creates a cache if
    /// none was attached.
    #[must_use]
    pub fn cacheable(mut self, name: impl Into<String>, ttl: Duration) -> Self {
        if self.cache.is_none() {
            self.cache = Some(Arc::new(ResultCache::new()));
        }
        self.cacheable.insert(name.into(), ttl);
        self
    }

    /// The manager this dispatcher executes through.
    #[must_use]
    pub fn manager(&self) -> &Arc<ActivationManager> {
        &self.manager
    }

    /// The attached result cache.
    #[must_use]
    pub fn cache(&self) -> Option<&Arc<ResultCache>> {
        self.cache.as_ref()
    }

    /// Execute `name` with default options.
    pub async fn execute(&self, name: &str, params: Value) -> ExecutionResult {
        self.execute_with(name, params, ExecuteOptions::default())
            .await
    }

    /// Execute `name`.
    ///
    /// Unknown names fail with `UnregisteredCapability`. Inactive names are
    /// activated first and flagged in the metadata. Names without a handler
    /// return `{"stub": true, "name": .., "params": ..}`. Handlers run
    /// outside the manager lock.
    pub async fn execute_with(
        &self,
        name: &str,
        params: Value,
        options: ExecuteOptions,
    ) -> ExecutionResult {
        let started = Instant::now();
        bump(&self.counters.executions);

        let mut result = self.run(name, params, &options).await;
        result.metadata.duration_ms =
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.record(name, &result);
        result
    }

    async fn run(&self, name: &str, params: Value, options: &ExecuteOptions) -> ExecutionResult {
        let mut metadata = ExecutionMetadata::default();

        let Some(prepared) = self.manager.prepare_execution(name) else {
            debug!(capability = %name, "Execution of unregistered capability");
            return ExecutionResult::failure(
                ExecutionError::UnregisteredCapability {
                    name: name.to_owned(),
                },
                metadata,
            );
        };

        if prepared.auto_activated {
            metadata.auto_activated = true;
            bump(&self.counters.auto_activations);
        }

        let Some(handler) = prepared.descriptor.handler else {
            metadata.stub = true;
            bump(&self.counters.stubs);
            debug!(capability = %name, "No handler attached, returning stub result");
            return ExecutionResult::ok(
                json!({ "stub": true, "name": name, "params": params }),
                metadata,
            );
        };

        let timeout = options.timeout.or(self.default_timeout);
        let cancel = options.cancel.clone().unwrap_or_default();

        let ttl = (!options.bypass_cache)
            .then(|| self.cacheable.get(name).copied())
            .flatten();
        let outcome = match (self.cache.as_deref(), ttl) {
            (Some(cache), Some(ttl)) => {
                let key = cache_key(name, &params);
                let mut computed = false;
                let outcome = cache
                    .try_get_or_compute(&key, ttl, || {
                        computed = true;
                        invoke(handler, params, timeout, cancel)
                    })
                    .await;
                if !computed {
                    metadata.cached = true;
                    bump(&self.counters.cache_hits);
                }
                outcome
            },
            _ => invoke(handler, params, timeout, cancel).await,
        };

        match outcome {
            Ok(value) => ExecutionResult::ok(value, metadata),
            Err(error) => ExecutionResult::failure(error, metadata),
        }
    }

    fn record(&self, name: &str, result: &ExecutionResult) {
        if let Some(error) = &result.error {
            bump(&self.counters.failures);
            match error {
                ExecutionError::Timeout { .. } => bump(&self.counters.timeouts),
                ExecutionError::Cancelled => bump(&self.counters.cancellations),
                _ => {},
            }
            warn!(
                capability = %name,
                kind = error.kind(),
                error = %error,
                "Capability execution failed"
            );
        }

        self.manager
            .event_bus()
            .publish(ActivationEvent::ExecutionFinished {
                metadata: EventMetadata::new(EVENT_SOURCE),
                capability: name.to_owned(),
                success: result.success,
                error_kind: result.error_kind().map(str::to_owned),
                duration_ms: result.metadata.duration_ms,
            });
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;
        DispatchStats {
            executions: c.executions.load(Ordering::Relaxed),
            auto_activations: c.auto_activations.load(Ordering::Relaxed),
            stubs: c.stubs.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            cancellations: c.cancellations.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
        }
    }
}

/// Cache key: capability name plus the canonical JSON of the parameters.
/// Object keys serialize sorted, so equal parameters give equal keys.
fn cache_key(name: &str, params: &Value) -> String {
    format!("{name}\u{1f}{params}")
}

/// Run a handler under the timeout and cancellation token.
async fn invoke(
    handler: Arc<dyn CapabilityHandler>,
    params: Value,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> Result<Value, ExecutionError> {
    let call = AssertUnwindSafe(handler.call(params, cancel.clone())).catch_unwind();

    let guarded = async move {
        let caught = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Err(ExecutionError::Timeout {
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                },
            },
            None => call.await,
        };
        match caught {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ExecutionError::HandlerExecutionError { message: e.message }),
            Err(payload) => Err(ExecutionError::HandlerExecutionError {
                message: format!("handler panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ExecutionError::Cancelled),
        outcome = guarded => outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message;
    }
    "unknown panic"
}
