use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// A pending load or play was interrupted by a newer source swap.
    #[error("Operation aborted: {0}")]
    Aborted(String),

    /// The host refused to start audio without a user gesture.
    #[error("Operation not allowed: {0}")]
    NotAllowed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the host rejected a `play()` request rather than failing outright.
    pub fn is_play_rejection(&self) -> bool {
        matches!(self, BridgeError::Aborted(_) | BridgeError::NotAllowed(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
