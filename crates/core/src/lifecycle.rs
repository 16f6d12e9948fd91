use crate::command::ActionKind;
use crate::error::Error;
use crate::sink::{SinkCallback, SinkFactory};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tributary_control::{ControlBus, WILDCARD};
use tributary_query_engine::{QueryEngine, StreamDefinition};

/// Starts and stops sink subscriptions.
///
/// Starting registers a [`SinkCallback`] as the stream's output callback and
/// subscribes it to the kind's control channel. Stopping only broadcasts; the
/// callbacks wherever they run stop themselves when the payload reaches them.
#[derive(Clone, Debug)]
pub struct ActionLifecycle<Q, C> {
    engine: Q,
    control: C,
    sinks: Arc<HashMap<ActionKind, Arc<dyn SinkFactory>>>,
    root: CancellationToken,
    live: Arc<Mutex<Vec<SinkCallback>>>,
}

impl<Q, C> ActionLifecycle<Q, C>
where
    Q: QueryEngine,
    C: ControlBus,
{
    /// Creates a new `ActionLifecycle` with one sink factory per configured kind.
    #[must_use]
    pub fn new(engine: Q, control: C, sinks: HashMap<ActionKind, Arc<dyn SinkFactory>>) -> Self {
        Self {
            engine,
            control,
            sinks: Arc::new(sinks),
            root: CancellationToken::new(),
            live: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Whether a sink factory is configured for `kind`.
    #[must_use]
    pub fn is_configured(&self, kind: ActionKind) -> bool {
        self.sinks.contains_key(&kind)
    }

    /// Starts a sink subscription for the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is not configured, the sink cannot be
    /// opened, or the callback cannot be attached. A half-attached callback is
    /// stopped before returning.
    pub async fn enable(
        &self,
        definition: &StreamDefinition,
        kind: ActionKind,
    ) -> Result<SinkCallback, Error> {
        let factory = self
            .sinks
            .get(&kind)
            .ok_or(Error::ActionNotConfigured(kind))?;

        let cancellation = self.root.child_token();
        let adapter = factory
            .open(kind, definition, cancellation.clone())
            .await
            .map_err(|e| Error::Sink(e.to_string()))?;

        let callback = SinkCallback::new(&definition.name, kind, adapter, cancellation.clone());

        if let Err(e) = self.attach(&callback, cancellation).await {
            callback.stop().await;
            return Err(e);
        }

        let mut live = self.live.lock().await;
        live.retain(SinkCallback::is_running);
        live.push(callback.clone());

        debug!(stream = %definition.name, %kind, "sink subscription started");

        Ok(callback)
    }

    async fn attach(
        &self,
        callback: &SinkCallback,
        cancellation: CancellationToken,
    ) -> Result<(), Error> {
        self.engine
            .register_callback(callback.stream_name(), Arc::new(callback.clone()))
            .await
            .map_err(Error::query_engine)?;

        self.control
            .subscribe(callback.kind().channel(), callback.clone(), cancellation)
            .await
            .map_err(|e| Error::Control(e.to_string()))
    }

    /// Broadcasts the stream name on the kind's control channel.
    ///
    /// Returns once the broadcast is published, not once the subscription stops.
    ///
    /// # Errors
    ///
    /// Returns an error if the broadcast cannot be published.
    pub async fn disable(&self, stream_name: &str, kind: ActionKind) -> Result<(), Error> {
        self.control
            .publish(kind.channel(), stream_name.to_string())
            .await
            .map_err(|e| Error::Control(e.to_string()))?;

        debug!(stream = %stream_name, %kind, "sink teardown broadcast");

        Ok(())
    }

    /// Number of subscriptions started here that are still running.
    pub async fn live_count(&self) -> usize {
        self.live
            .lock()
            .await
            .iter()
            .filter(|callback| callback.is_running())
            .count()
    }

    /// Broadcasts the wildcard on every action channel and stops every local
    /// subscription.
    pub async fn teardown_all(&self) {
        for kind in ActionKind::ALL {
            if let Err(e) = self.control.publish(kind.channel(), WILDCARD.to_string()).await {
                warn!(%kind, error = %e, "failed to broadcast global teardown");
            }
        }

        let live: Vec<SinkCallback> = self.live.lock().await.drain(..).collect();
        let mut stopped = 0;
        for callback in live {
            if callback.stop().await {
                stopped += 1;
            }
        }

        self.root.cancel();

        info!(stopped, "all sink subscriptions torn down");
    }
}
