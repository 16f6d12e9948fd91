use thiserror::Error;
use tributary_locks::LockManagerError;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The resource id is empty.
    #[error("lock resource id must not be empty")]
    EmptyResource,
}

impl LockManagerError for Error {}
