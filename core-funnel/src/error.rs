use bridge_traits::error::BridgeError;
use core_playback::PlaybackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Unknown song: {0}")]
    UnknownSong(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Checkout session {session_id} is not paid")]
    PaymentNotCompleted { session_id: String },

    #[error("No checkout session id supplied")]
    MissingSession,

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Source file unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Entitlement error: {0}")]
    Entitlement(#[from] PlaybackError),
}

impl FunnelError {
    /// Errors caused by visitor input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FunnelError::InvalidEmail
                | FunnelError::UnknownSong(_)
                | FunnelError::InvalidAmount(_)
                | FunnelError::MissingSession
                | FunnelError::PaymentNotCompleted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FunnelError>;
