//! The contract every sink adapter satisfies to take part in teardown.

use crate::command::ActionKind;

use std::convert::Infallible;
use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tributary_control::{ControlHandler, is_addressed_to};
use tributary_query_engine::{Event, OutputCallback, StreamDefinition};

/// Error type reported by sink adapters.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Writes one stream's output events to an external system.
///
/// Adapters are expected to buffer slow writes rather than hold up `write`.
#[async_trait]
pub trait SinkAdapter: Debug + Send + Sync + 'static {
    /// Writes a batch of events.
    async fn write(&self, definition: &StreamDefinition, events: &[Event]) -> Result<(), BoxError>;

    /// Closes connections and flushes. Called exactly once, when the sink stops.
    async fn release(&self) -> Result<(), BoxError>;
}

/// Opens sink adapters of one family.
#[async_trait]
pub trait SinkFactory: Debug + Send + Sync + 'static {
    /// Opens an adapter for `definition`.
    ///
    /// `cancellation` fires when the subscription stops; adapters with
    /// background work should stop it then.
    async fn open(
        &self,
        kind: ActionKind,
        definition: &StreamDefinition,
        cancellation: CancellationToken,
    ) -> Result<Arc<dyn SinkAdapter>, BoxError>;
}

#[derive(Debug)]
struct Inner {
    stream_name: String,
    kind: ActionKind,
    adapter: Arc<dyn SinkAdapter>,
    running: AtomicBool,
    cancellation: CancellationToken,
}

/// A live sink subscription for one stream and action kind.
///
/// Registered with the engine as the stream's output callback and subscribed to
/// the kind's control channel. A control payload naming the stream, or the
/// wildcard, stops it once; the adapter is released exactly once however many
/// times or however concurrently the payload arrives.
#[derive(Clone, Debug)]
pub struct SinkCallback {
    inner: Arc<Inner>,
}

impl SinkCallback {
    /// Creates a running callback around `adapter`.
    pub fn new(
        stream_name: impl Into<String>,
        kind: ActionKind,
        adapter: Arc<dyn SinkAdapter>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                stream_name: stream_name.into(),
                kind,
                adapter,
                running: AtomicBool::new(true),
                cancellation,
            }),
        }
    }

    /// The stream this callback serves.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.inner.stream_name
    }

    /// The action kind this callback serves.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.inner.kind
    }

    /// Whether the callback still forwards events.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Forwards events to the adapter while running.
    ///
    /// A batch already past the running check when the callback stops is still
    /// written.
    pub async fn on_events(&self, definition: &StreamDefinition, events: &[Event]) {
        if !self.is_running() {
            return;
        }

        if let Err(e) = self.inner.adapter.write(definition, events).await {
            warn!(stream = %self.inner.stream_name, kind = %self.inner.kind, error = %e, "sink write failed");
        }
    }

    /// Handles a control payload. Returns true if this call stopped the callback.
    pub async fn on_control_message(&self, payload: &str) -> bool {
        if !is_addressed_to(payload, &self.inner.stream_name) {
            return false;
        }

        self.stop().await
    }

    /// Stops the callback and releases its adapter, once.
    ///
    /// Returns false if it was already stopped.
    pub async fn stop(&self) -> bool {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        self.inner.cancellation.cancel();

        if let Err(e) = self.inner.adapter.release().await {
            warn!(stream = %self.inner.stream_name, kind = %self.inner.kind, error = %e, "sink release failed");
        }

        debug!(stream = %self.inner.stream_name, kind = %self.inner.kind, "sink stopped");

        true
    }
}

#[async_trait]
impl OutputCallback for SinkCallback {
    async fn receive(&self, definition: &StreamDefinition, events: &[Event]) {
        self.on_events(definition, events).await;
    }

    fn is_active(&self) -> bool {
        self.is_running()
    }
}

#[async_trait]
impl ControlHandler for SinkCallback {
    type Error = Infallible;

    async fn handle(&self, _channel: String, payload: String) -> Result<(), Self::Error> {
        self.on_control_message(&payload).await;

        Ok(())
    }
}
