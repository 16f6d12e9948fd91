//! Abstract interface for broadcast control channels.
//!
//! Control channels carry teardown signals from command handlers to the sink
//! callbacks listening on them. Delivery is fire-and-forget, at least once and
//! unordered, so handlers must be idempotent.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::convert::Infallible;
use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Payload addressed to every subscriber of a channel, whatever its stream.
pub const WILDCARD: &str = "*";

/// Marker trait for control bus errors
pub trait ControlError: Debug + Error + Send + Sync + 'static {}

/// Marker trait for control handler errors
pub trait ControlHandlerError: Debug + Error + Send + Sync + 'static {}

impl ControlHandlerError for Infallible {}

/// Receives every payload published on a subscribed channel.
#[async_trait]
pub trait ControlHandler
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for the handler.
    type Error: ControlHandlerError;

    /// Handles one payload published on `channel`.
    async fn handle(&self, channel: String, payload: String) -> Result<(), Self::Error>;
}

/// A broadcast primitive with one topic per channel id.
#[async_trait]
pub trait ControlBus
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the bus.
    type Error: ControlError;

    /// Publishes `payload` to every current subscriber of `channel`.
    ///
    /// Returns once the payload is handed to the bus, not once it is observed.
    async fn publish<C>(&self, channel: C, payload: String) -> Result<(), Self::Error>
    where
        C: AsRef<str> + Send;

    /// Subscribes `handler` to `channel` until `shutdown` is cancelled.
    ///
    /// Payloads published after this call returns are delivered to the handler.
    async fn subscribe<C, X>(
        &self,
        channel: C,
        handler: X,
        shutdown: CancellationToken,
    ) -> Result<(), Self::Error>
    where
        C: Into<String> + Send,
        X: ControlHandler;
}

/// Returns true when `payload` targets the subscriber listening for `stream_name`.
///
/// Stream names are case sensitive, so `ORDERS` never addresses `orders`.
#[must_use]
pub fn is_addressed_to(payload: &str, stream_name: &str) -> bool {
    payload == WILDCARD || payload == stream_name
}
