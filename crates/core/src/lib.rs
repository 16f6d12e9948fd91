//! Control plane for a live event-stream processor.
//!
//! Validates client commands against the shared stream registry and the query
//! engine's live definitions, applies them, and manages the lifecycle of the
//! per-stream sink subscriptions they start and stop.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod command;
mod control_plane;
mod error;
mod handlers;
mod lifecycle;
mod registry;
mod reply;
mod sink;
mod status;
pub mod validation;

pub use command::{ActionKind, ColumnNameTypeValue, Command, Operation};
pub use control_plane::{ControlPlane, ControlPlaneOptions, RESERVED_STREAMS};
pub use error::Error;
pub use lifecycle::ActionLifecycle;
pub use registry::StreamRegistry;
pub use reply::{QueryListing, Reply, ReplyCode, StreamListing, UnknownReplyCode, readable_reply};
pub use sink::{BoxError, SinkAdapter, SinkCallback, SinkFactory};
pub use status::{QueryRecord, StatusDeserializeError, StatusSerializeError, StreamStatus};
