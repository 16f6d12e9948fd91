use thiserror::Error;
use tributary_registry::RegistryError;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A stored value could not be decoded.
    #[error("failed to decode value for key {key}: {message}")]
    Deserialize {
        /// Key whose value was corrupt.
        key: String,
        /// Decoder message.
        message: String,
    },

    /// A value could not be encoded.
    #[error("failed to encode value for key {key}: {message}")]
    Serialize {
        /// Key being written.
        key: String,
        /// Encoder message.
        message: String,
    },
}

impl RegistryError for Error {}
