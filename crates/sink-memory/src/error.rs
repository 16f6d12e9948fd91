use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The sink was written to after it was stopped.
    #[error("sink for {0} is closed")]
    Closed(String),

    /// The sink was released twice.
    #[error("sink for {0} was already released")]
    AlreadyReleased(String),
}
