//! Core playback data types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// A track the player can load.
///
/// Immutable once built. Two items with the same `id` are the same track for
/// the purposes of "already loaded" checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableItem {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub cover_art: Option<String>,
    #[serde(default)]
    pub audio_source: Option<String>,
}

impl PlayableItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            cover_art: None,
            audio_source: None,
        }
    }

    pub fn with_cover_art(mut self, cover_art: impl Into<String>) -> Self {
        self.cover_art = Some(cover_art.into());
        self
    }

    pub fn with_audio_source(mut self, url: impl Into<String>) -> Self {
        self.audio_source = Some(url.into());
        self
    }
}

/// Observable player state.
///
/// `is_playing` implies `current_item` is set. `duration` is zero while
/// unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub current_item: Option<PlayableItem>,
    pub is_playing: bool,
    pub current_time: Duration,
    pub duration: Duration,
    pub is_mini_player_visible: bool,
    pub is_full_screen_visible: bool,
}

impl PlaybackSession {
    pub fn current_item_id(&self) -> Option<&str> {
        self.current_item.as_ref().map(|item| item.id.as_str())
    }

    pub fn current_time_secs(&self) -> f64 {
        self.current_time.as_secs_f64()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// The slice of a track a non-supporter may hear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PreviewWindowFields")]
pub struct PreviewWindow {
    start: Duration,
    length: Duration,
}

#[derive(Deserialize)]
struct PreviewWindowFields {
    start: Duration,
    length: Duration,
}

impl TryFrom<PreviewWindowFields> for PreviewWindow {
    type Error = PlaybackError;

    fn try_from(fields: PreviewWindowFields) -> Result<Self> {
        Self::new(fields.start, fields.length)
    }
}

impl PreviewWindow {
    pub fn new(start: Duration, length: Duration) -> Result<Self> {
        let window = Self { start, length };
        window.validate()?;
        Ok(window)
    }

    fn secs_to_duration(what: &str, secs: f64) -> Result<Duration> {
        Duration::try_from_secs_f64(secs).map_err(|e| {
            PlaybackError::InvalidConfig(format!("preview {what} of {secs} seconds: {e}"))
        })
    }

    /// Build from seconds as read from configuration.
    pub fn from_secs(start: f64, length: f64) -> Result<Self> {
        if !start.is_finite() || start < 0.0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "preview start must be a non-negative number of seconds, got {start}"
            )));
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "preview length must be a positive number of seconds, got {length}"
            )));
        }
        Self::new(
            Self::secs_to_duration("start", start)?,
            Self::secs_to_duration("length", length)?,
        )
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    pub fn end(&self) -> Duration {
        self.start + self.length
    }

    /// Half-open containment: `start <= position < end`.
    pub fn contains(&self, position: Duration) -> bool {
        position >= self.start && position < self.end()
    }

    pub fn validate(&self) -> Result<()> {
        if self.length.is_zero() {
            return Err(PlaybackError::InvalidConfig(
                "preview length must be greater than zero".to_string(),
            ));
        }
        if self.start.checked_add(self.length).is_none() {
            return Err(PlaybackError::InvalidConfig(
                "preview window ends beyond the representable range".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PreviewWindow {
    fn default() -> Self {
        Self {
            start: Duration::ZERO,
            length: Duration::from_secs(30),
        }
    }
}
