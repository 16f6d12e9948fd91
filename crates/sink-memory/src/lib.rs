//! In-memory sink adapters that record what they receive.
//!
//! One [`MemorySinks`] serves every action kind. Each opened sink appends its
//! events to a shared recording keyed by action kind and stream name, which
//! tests and the local node read back.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tributary_core::{ActionKind, BoxError, SinkAdapter, SinkFactory};
use tributary_query_engine::{Event, StreamDefinition};

/// Everything one (action kind, stream) pair has seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recording {
    /// Events written, in order.
    pub events: Vec<Event>,

    /// Times a sink was opened.
    pub opened: usize,

    /// Times a sink was released.
    pub released: usize,
}

type Recordings = Arc<Mutex<HashMap<(ActionKind, String), Recording>>>;

/// Factory for recording sinks. Clones share the same recordings.
#[derive(Clone, Debug, Default)]
pub struct MemorySinks {
    recordings: Recordings,
}

impl MemorySinks {
    /// Creates a new instance of `MemorySinks`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recording for `kind` on `stream_name`.
    pub async fn recording(&self, kind: ActionKind, stream_name: &str) -> Recording {
        self.recordings
            .lock()
            .await
            .get(&(kind, stream_name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Events written for `kind` on `stream_name`.
    pub async fn events(&self, kind: ActionKind, stream_name: &str) -> Vec<Event> {
        self.recording(kind, stream_name).await.events
    }

    /// Times a sink for `kind` on `stream_name` was released.
    pub async fn released(&self, kind: ActionKind, stream_name: &str) -> usize {
        self.recording(kind, stream_name).await.released
    }
}

#[async_trait]
impl SinkFactory for MemorySinks {
    async fn open(
        &self,
        kind: ActionKind,
        definition: &StreamDefinition,
        cancellation: CancellationToken,
    ) -> Result<Arc<dyn SinkAdapter>, BoxError> {
        let key = (kind, definition.name.clone());

        self.recordings
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .opened += 1;

        debug!(stream = %definition.name, %kind, "memory sink opened");

        Ok(Arc::new(MemorySink {
            key,
            recordings: self.recordings.clone(),
            cancellation,
            released: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct MemorySink {
    key: (ActionKind, String),
    recordings: Recordings,
    cancellation: CancellationToken,
    released: AtomicBool,
}

#[async_trait]
impl SinkAdapter for MemorySink {
    async fn write(&self, _definition: &StreamDefinition, events: &[Event]) -> Result<(), BoxError> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Closed(self.key.1.clone()).into());
        }

        self.recordings
            .lock()
            .await
            .entry(self.key.clone())
            .or_default()
            .events
            .extend_from_slice(events);

        debug!(stream = %self.key.1, kind = %self.key.0, count = events.len(), "memory sink wrote events");

        Ok(())
    }

    async fn release(&self) -> Result<(), BoxError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyReleased(self.key.1.clone()).into());
        }

        self.recordings
            .lock()
            .await
            .entry(self.key.clone())
            .or_default()
            .released += 1;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tributary_query_engine::{Column, ColumnType, Value};

    fn orders() -> StreamDefinition {
        StreamDefinition::new("orders", vec![Column::new("id", ColumnType::Integer)])
    }

    #[tokio::test]
    async fn test_records_until_cancelled() {
        let sinks = MemorySinks::new();
        let cancellation = CancellationToken::new();
        let sink = sinks
            .open(ActionKind::Listen, &orders(), cancellation.clone())
            .await
            .unwrap();
        let event = Event::new(vec![Value::Integer(1)]);

        sink.write(&orders(), &[event.clone()]).await.unwrap();
        cancellation.cancel();
        assert!(sink.write(&orders(), &[event.clone()]).await.is_err());

        let recording = sinks.recording(ActionKind::Listen, "orders").await;
        assert_eq!(recording.events, vec![event]);
        assert_eq!(recording.opened, 1);
    }

    #[tokio::test]
    async fn test_release_once() {
        let sinks = MemorySinks::new();
        let sink = sinks
            .open(ActionKind::Indexed, &orders(), CancellationToken::new())
            .await
            .unwrap();

        sink.release().await.unwrap();
        assert!(sink.release().await.is_err());

        assert_eq!(sinks.released(ActionKind::Indexed, "orders").await, 1);
        assert!(sinks.events(ActionKind::Listen, "orders").await.is_empty());
    }
}
