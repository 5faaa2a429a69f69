//! Audio source resolution.

use crate::error::{PlaybackError, Result};
use crate::types::PlayableItem;

/// Picks the URL to attach for an item: its own source first, then the
/// process-wide default.
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    default_source: Option<String>,
}

impl SourceResolver {
    pub fn new(default_source: Option<String>) -> Self {
        Self {
            default_source: non_blank(default_source.as_deref()).map(str::to_string),
        }
    }

    pub fn default_source(&self) -> Option<&str> {
        self.default_source.as_deref()
    }

    pub fn resolve_source(&self, item: &PlayableItem) -> Result<String> {
        non_blank(item.audio_source.as_deref())
            .or(self.default_source.as_deref())
            .map(str::to_string)
            .ok_or_else(|| PlaybackError::NoSourceConfigured {
                item_id: item.id.clone(),
            })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> PlayableItem {
        PlayableItem::new("polygamy", "Polygamy", "Caliph")
    }

    #[test]
    fn item_source_takes_precedence() {
        let resolver = SourceResolver::new(Some("https://cdn.example.com/default.mp3".into()));
        let item = track().with_audio_source("https://cdn.example.com/polygamy.mp3");
        assert_eq!(
            resolver.resolve_source(&item).unwrap(),
            "https://cdn.example.com/polygamy.mp3"
        );
    }

    #[test]
    fn default_used_when_item_has_none() {
        let resolver = SourceResolver::new(Some("https://cdn.example.com/default.mp3".into()));
        assert_eq!(
            resolver.resolve_source(&track()).unwrap(),
            "https://cdn.example.com/default.mp3"
        );
    }

    #[test]
    fn blank_values_count_as_absent() {
        let resolver = SourceResolver::new(Some("   ".into()));
        assert!(resolver.default_source().is_none());

        let item = track().with_audio_source("");
        match resolver.resolve_source(&item) {
            Err(PlaybackError::NoSourceConfigured { item_id }) => assert_eq!(item_id, "polygamy"),
            other => panic!("expected NoSourceConfigured, got {other:?}"),
        }
    }
}
