//! # Player Configuration
//!
//! Timing knobs for the playback engine and the preview policy.

use std::time::Duration;

use core_runtime::config::CoreConfig;
use serde::{Deserialize, Serialize};

use crate::error::PlaybackError;
use crate::types::{PlayableItem, PreviewWindow};

/// Player configuration.
///
/// Built from [`CoreConfig`] by the service layer; every field has a serde
/// default so hosts can also ship a partial JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Range a non-supporter may hear.
    ///
    /// Default: first 30 seconds.
    #[serde(default)]
    pub preview: PreviewWindow,

    /// Audio URL used when an item carries none.
    #[serde(default)]
    pub default_source: Option<String>,

    /// Item started by play/pause when nothing was ever loaded.
    #[serde(default)]
    pub fallback_item: Option<PlayableItem>,

    /// Upper bound on waiting for metadata after attaching a source.
    ///
    /// Default: 1.5 seconds.
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout: Duration,

    /// Pause between a rejected play and the single retry.
    ///
    /// Default: 250 ms.
    #[serde(default = "default_play_retry_delay")]
    pub play_retry_delay: Duration,

    /// Time after play/resume during which the preview clamp does not act.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_clamp_suppression")]
    pub clamp_suppression: Duration,

    /// Distance kept from the preview end when a non-supporter seeks.
    ///
    /// Default: 250 ms.
    #[serde(default = "default_seek_end_margin")]
    pub seek_end_margin: Duration,

    /// Timeout for the fire-and-forget play ping.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_activity_timeout")]
    pub activity_timeout: Duration,
}

fn default_metadata_timeout() -> Duration {
    Duration::from_millis(1500)
}

fn default_play_retry_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_clamp_suppression() -> Duration {
    Duration::from_millis(500)
}

fn default_seek_end_margin() -> Duration {
    Duration::from_millis(250)
}

fn default_activity_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            preview: PreviewWindow::default(),
            default_source: None,
            fallback_item: None,
            metadata_timeout: default_metadata_timeout(),
            play_retry_delay: default_play_retry_delay(),
            clamp_suppression: default_clamp_suppression(),
            seek_end_margin: default_seek_end_margin(),
            activity_timeout: default_activity_timeout(),
        }
    }
}

impl PlayerConfig {
    pub fn with_preview(mut self, preview: PreviewWindow) -> Self {
        self.preview = preview;
        self
    }

    pub fn with_default_source(mut self, url: impl Into<String>) -> Self {
        self.default_source = Some(url.into());
        self
    }

    pub fn with_fallback_item(mut self, item: PlayableItem) -> Self {
        self.fallback_item = Some(item);
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.preview.validate().map_err(|e| e.to_string())?;

        if self.metadata_timeout.is_zero() {
            return Err("metadata_timeout must be > 0".to_string());
        }

        if self.seek_end_margin >= self.preview.length() {
            return Err("seek_end_margin must be shorter than the preview length".to_string());
        }

        if let Some(item) = &self.fallback_item {
            if item.id.trim().is_empty() {
                return Err("fallback_item must have an id".to_string());
            }
        }

        Ok(())
    }
}

impl TryFrom<&CoreConfig> for PlayerConfig {
    type Error = PlaybackError;

    fn try_from(config: &CoreConfig) -> Result<Self, PlaybackError> {
        let preview =
            PreviewWindow::from_secs(config.preview.start_secs, config.preview.length_secs)?;

        Ok(Self {
            preview,
            default_source: config.default_track_url.clone(),
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.metadata_timeout, Duration::from_millis(1500));
        assert_eq!(config.play_retry_delay, Duration::from_millis(250));
        assert_eq!(config.clamp_suppression, Duration::from_millis(500));
        assert_eq!(config.seek_end_margin, Duration::from_millis(250));
        assert_eq!(config.preview.end(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_margin_must_fit_inside_preview() {
        let config = PlayerConfig::default()
            .with_preview(PreviewWindow::new(Duration::ZERO, Duration::from_millis(200)).unwrap());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_blank_fallback_rejected() {
        let config = PlayerConfig::default().with_fallback_item(PlayableItem::new(" ", "", ""));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{"default_source":"https://cdn.example.com/a.mp3"}"#).unwrap();
        assert_eq!(
            config.default_source.as_deref(),
            Some("https://cdn.example.com/a.mp3")
        );
        assert_eq!(config.metadata_timeout, Duration::from_millis(1500));
        assert_eq!(config.preview, PreviewWindow::default());
    }

    #[test]
    fn test_json_preview_is_validated() {
        let config: PlayerConfig = serde_json::from_str(
            r#"{"preview":{"start":{"secs":45,"nanos":0},"length":{"secs":20,"nanos":0}}}"#,
        )
        .unwrap();
        assert_eq!(config.preview.end(), Duration::from_secs(65));

        let zero_length = serde_json::from_str::<PlayerConfig>(
            r#"{"preview":{"start":{"secs":0,"nanos":0},"length":{"secs":0,"nanos":0}}}"#,
        );
        assert!(zero_length.is_err());
    }

    #[test]
    fn test_rejected_preview_is_reported() {
        let mut config = CoreConfig::builder()
            .marker_store(std::sync::Arc::new(bridge_desktop::MemoryMarkerStore::new()))
            .audio_output(std::sync::Arc::new(bridge_desktop::HeadlessAudioOutput::new()))
            .build()
            .unwrap();
        config.preview.start_secs = 1e30;

        assert!(matches!(
            PlayerConfig::try_from(&config),
            Err(PlaybackError::InvalidConfig(_))
        ));

        config.preview.start_secs = 45.0;
        let player = PlayerConfig::try_from(&config).unwrap();
        assert_eq!(player.preview.start(), Duration::from_secs(45));
    }
}
