//! Audio output bridge.
//!
//! The core owns exactly one [`AudioOutput`] per application lifetime and
//! drives it through a small, media-element-like surface: attach a source,
//! wait for metadata, play/pause/seek, and observe progress through an event
//! stream. Hosts map this onto whatever engine they have (an HTML media
//! element behind an FFI boundary, a native mixer, or the headless output
//! shipped in `bridge-desktop`).

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::Result;

/// Notifications raised by the output while a source is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// Enough of the source has loaded to know its duration.
    MetadataLoaded { duration: Option<Duration> },
    /// Periodic progress report, at least once per second while playing.
    TimeUpdate { position: Duration },
    /// Playback reached the natural end of the source.
    Ended,
}

/// An [`OutputEvent`] tagged with the load that raised it.
///
/// Events are queued, so a notice can arrive after its source was replaced.
/// Consumers compare `load` against [`AudioOutput::load_id`] and drop
/// mismatches.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNotice {
    pub load: u64,
    pub event: OutputEvent,
}

/// Single audio output handle.
///
/// # Contract
///
/// - `attach` replaces any previous source. Implementations must abort any
///   pending load for the old source so that a late `play()` on it cannot
///   become audible.
/// - `play` may be rejected with [`BridgeError::Aborted`] when a load
///   interrupted it, or [`BridgeError::NotAllowed`] when the host requires a
///   user gesture. Callers decide whether to retry.
/// - `load_id` changes on every `attach` and `detach`, and every notice
///   carries the id that was current when it was raised.
/// - `wait_for_metadata` resolves once the duration is known. It may never
///   resolve; callers bound it with a timeout.
///
/// [`BridgeError::Aborted`]: crate::error::BridgeError::Aborted
/// [`BridgeError::NotAllowed`]: crate::error::BridgeError::NotAllowed
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Point the output at a new source URL and start loading it.
    async fn attach(&self, url: &str) -> Result<()>;

    /// Pause, drop the current source and abort any in-flight load.
    async fn detach(&self) -> Result<()>;

    /// Resolve when metadata for the attached source is available.
    async fn wait_for_metadata(&self) -> Result<Option<Duration>>;

    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn seek(&self, position: Duration) -> Result<()>;

    /// Current playback position of the attached source.
    fn position(&self) -> Duration;

    /// Duration of the attached source, if known.
    fn duration(&self) -> Option<Duration>;

    fn is_paused(&self) -> bool;

    /// URL of the attached source.
    fn source(&self) -> Option<String>;

    /// Identifier of the current load.
    fn load_id(&self) -> u64;

    /// Subscribe to progress notifications.
    fn subscribe(&self) -> broadcast::Receiver<OutputNotice>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_events_compare_by_value() {
        let a = OutputEvent::TimeUpdate {
            position: Duration::from_millis(1500),
        };
        let b = OutputEvent::TimeUpdate {
            position: Duration::from_millis(1500),
        };
        assert_eq!(a, b);
        assert_ne!(a, OutputEvent::Ended);
    }

    #[test]
    fn notices_from_different_loads_differ() {
        let first = OutputNotice {
            load: 1,
            event: OutputEvent::Ended,
        };
        let second = OutputNotice {
            load: 2,
            ..first.clone()
        };
        assert_ne!(first, second);
        assert_eq!(first.event, second.event);
    }
}
