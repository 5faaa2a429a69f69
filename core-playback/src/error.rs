//! # Playback Error Types
//!
//! None of these are fatal to the player. The store turns every one of them
//! into "nothing plays" plus a log line; only configuration problems surface
//! to the host as `Err`.

use std::time::Duration;

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Neither the item nor the process-wide default names an audio URL.
    #[error("No audio source configured for item '{item_id}'")]
    NoSourceConfigured { item_id: String },

    /// The output refused to start, twice.
    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),

    /// Metadata did not arrive in time; playback continued with an unknown duration.
    #[error("Metadata not available after {0:?}")]
    MetadataTimeout(Duration),

    /// A newer play request took over before this one finished.
    #[error("Superseded by a newer playback request")]
    Superseded,

    /// Seek or resume with no source attached.
    #[error("No item loaded")]
    NothingLoaded,

    /// The play ping could not be delivered.
    #[error("Activity delivery failed: {0}")]
    LoggingDeliveryFailure(String),

    #[error("Invalid player configuration: {0}")]
    InvalidConfig(String),

    #[error("Audio output error: {0}")]
    Bridge(#[from] BridgeError),
}

impl PlaybackError {
    /// Expected outcomes that should leave the player quietly paused.
    pub fn is_benign(&self) -> bool {
        match self {
            PlaybackError::PlaybackRejected(_)
            | PlaybackError::MetadataTimeout(_)
            | PlaybackError::Superseded
            | PlaybackError::LoggingDeliveryFailure(_) => true,
            PlaybackError::Bridge(err) => err.is_play_rejection(),
            _ => false,
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PlaybackError::PlaybackRejected(_) | PlaybackError::MetadataTimeout(_)
        ) || matches!(self, PlaybackError::Bridge(BridgeError::Aborted(_)))
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_and_timeout_are_benign() {
        assert!(PlaybackError::PlaybackRejected("NotAllowedError".into()).is_benign());
        assert!(PlaybackError::MetadataTimeout(Duration::from_millis(1500)).is_benign());
        assert!(PlaybackError::Bridge(BridgeError::Aborted("load".into())).is_benign());
        assert!(!PlaybackError::NoSourceConfigured {
            item_id: "polygamy".into()
        }
        .is_benign());
        assert!(!PlaybackError::Bridge(BridgeError::OperationFailed("device".into())).is_benign());
    }

    #[test]
    fn aborted_loads_are_transient() {
        assert!(PlaybackError::Bridge(BridgeError::Aborted("load".into())).is_transient());
        assert!(!PlaybackError::Bridge(BridgeError::NotAllowed("gesture".into())).is_transient());
        assert!(!PlaybackError::Superseded.is_transient());
    }

    #[test]
    fn no_source_message_names_item() {
        let err = PlaybackError::NoSourceConfigured {
            item_id: "polygamy".into(),
        };
        assert_eq!(err.to_string(), "No audio source configured for item 'polygamy'");
    }
}
