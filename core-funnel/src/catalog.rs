//! Song catalog.
//!
//! Slugs are lowercase. Unknown or missing slugs resolve to the default song
//! wherever the funnel needs "some" song (checkout links, fallback playback).

use std::collections::BTreeMap;

use core_playback::PlayableItem;
use serde::{Deserialize, Serialize};

use crate::error::{FunnelError, Result};

pub const DEFAULT_SLUG: &str = "polygamy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Live,
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMeta {
    pub slug: String,
    pub title: String,
    pub artist: String,
    pub cover: String,
    pub audio_url: String,
    pub status: ReleaseStatus,
}

impl SongMeta {
    pub fn is_live(&self) -> bool {
        self.status == ReleaseStatus::Live
    }

    pub fn to_playable(&self) -> PlayableItem {
        PlayableItem::new(&self.slug, &self.title, &self.artist)
            .with_cover_art(&self.cover)
            .with_audio_source(&self.audio_url)
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    songs: BTreeMap<String, SongMeta>,
    default_song: SongMeta,
}

fn normalize_slug(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl Catalog {
    pub fn new(songs: impl IntoIterator<Item = SongMeta>, default_slug: &str) -> Result<Self> {
        let songs: BTreeMap<String, SongMeta> = songs
            .into_iter()
            .map(|mut song| {
                song.slug = normalize_slug(&song.slug);
                (song.slug.clone(), song)
            })
            .collect();

        let default_song = songs
            .get(&normalize_slug(default_slug))
            .cloned()
            .ok_or_else(|| {
                FunnelError::InvalidCatalog(format!("default song '{default_slug}' is not listed"))
            })?;

        Ok(Self {
            songs,
            default_song,
        })
    }

    pub fn get(&self, slug: &str) -> Option<&SongMeta> {
        self.songs.get(&normalize_slug(slug))
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.get(slug).is_some()
    }

    pub fn default_song(&self) -> &SongMeta {
        &self.default_song
    }

    /// Look up `raw`, falling back to the default song.
    pub fn resolve_or_default(&self, raw: Option<&str>) -> &SongMeta {
        raw.and_then(|slug| self.get(slug))
            .unwrap_or(&self.default_song)
    }

    pub fn to_playable(&self, slug: &str) -> Option<PlayableItem> {
        self.get(slug).map(SongMeta::to_playable)
    }

    pub fn songs(&self) -> impl Iterator<Item = &SongMeta> {
        self.songs.values()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let polygamy = SongMeta {
            slug: DEFAULT_SLUG.to_string(),
            title: "Polygamy (Prod. By Caliph)".to_string(),
            artist: "Caliph".to_string(),
            cover: "/polygamy-cover.png".to_string(),
            audio_url: "/audio/polygamy-full.mp3".to_string(),
            status: ReleaseStatus::Live,
        };
        Self {
            songs: BTreeMap::from([(polygamy.slug.clone(), polygamy.clone())]),
            default_song: polygamy,
        }
    }
}
