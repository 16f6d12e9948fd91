use thiserror::Error;
use tributary_control::ControlError;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The channel id is empty or contains whitespace.
    #[error("invalid channel id {0:?}")]
    InvalidChannel(String),
}

impl ControlError for Error {}
