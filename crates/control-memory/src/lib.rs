//! In-memory (single process) implementation of control channels for local
//! development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tributary_control::{ControlBus, ControlHandler};

const DEFAULT_CAPACITY: usize = 256;

/// In-memory control bus. Clones share the same set of channels.
#[derive(Clone, Debug)]
pub struct MemoryControlBus {
    capacity: usize,
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>,
}

impl Default for MemoryControlBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryControlBus {
    /// Creates a new `MemoryControlBus`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus whose channels buffer up to `capacity` payloads per slow subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of live subscriptions on `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn check_channel(channel: &str) -> Result<(), Error> {
        if channel.is_empty() || channel.contains(char::is_whitespace) {
            return Err(Error::InvalidChannel(channel.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ControlBus for MemoryControlBus {
    type Error = Error;

    async fn publish<C>(&self, channel: C, payload: String) -> Result<(), Self::Error>
    where
        C: AsRef<str> + Send,
    {
        let channel = channel.as_ref();
        Self::check_channel(channel)?;

        if let Some(sender) = self.channels.lock().await.get(channel) {
            // No receivers is not an error for a broadcast.
            let _ = sender.send(payload);
        }

        Ok(())
    }

    async fn subscribe<C, X>(
        &self,
        channel: C,
        handler: X,
        shutdown: CancellationToken,
    ) -> Result<(), Self::Error>
    where
        C: Into<String> + Send,
        X: ControlHandler,
    {
        let channel = channel.into();
        Self::check_channel(&channel)?;

        let mut receiver = self
            .channels
            .lock()
            .await
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    message = receiver.recv() => match message {
                        Ok(payload) => {
                            if let Err(error) = handler.handle(channel.clone(), payload).await {
                                warn!(%channel, %error, "control handler failed");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%channel, skipped, "control subscriber lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!(%channel, "control subscription closed");
        });

        Ok(())
    }
}
