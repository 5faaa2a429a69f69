//! # Downloads
//!
//! Hands a supporter the full audio file as an attachment. The file is
//! fetched from the song's audio URL through the host's [`HttpClient`];
//! relative URLs are resolved against the site origin.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, SongMeta};
use crate::error::{FunnelError, Result};
use crate::visitor::{Destination, Visitor};

pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A file ready to send with `Content-Disposition: attachment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFile {
    pub filename: String,
    pub content_type: String,
    pub body: Bytes,
}

impl DownloadFile {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }

    /// Response headers for the host's HTTP layer.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", self.content_type.clone()),
            ("Content-Length", self.body.len().to_string()),
            ("Content-Disposition", self.content_disposition()),
            ("Cache-Control", "no-store".to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Download {
    File(DownloadFile),
    RedirectToBuy(Destination),
}

pub struct DownloadService {
    http: Arc<dyn HttpClient>,
    catalog: Arc<Catalog>,
    site_origin: String,
    timeout: Duration,
}

impl DownloadService {
    pub fn new(http: Arc<dyn HttpClient>, catalog: Arc<Catalog>, site_origin: impl Into<String>) -> Self {
        Self {
            http,
            catalog,
            site_origin: site_origin.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the file for `slug` (the default song when absent).
    ///
    /// Without a slug only the global supporter marker unlocks the file.
    /// Upstream failures surface as [`FunnelError::UpstreamUnavailable`].
    pub async fn download(&self, slug: Option<&str>, visitor: &Visitor) -> Result<Download> {
        let song = match slug {
            Some(raw) => self
                .catalog
                .get(raw)
                .ok_or_else(|| FunnelError::UnknownSong(raw.to_string()))?,
            None => self.catalog.default_song(),
        };
        let scope = slug.map(|_| song.slug.as_str());

        if !visitor.is_supporter(scope).await {
            debug!(slug = %song.slug, "Download refused; not a supporter");
            let destination = match scope {
                Some(slug) => Destination::BuySong(slug.to_string()),
                None => Destination::Buy,
            };
            return Ok(Download::RedirectToBuy(destination));
        }

        let url = self.source_url(&song.audio_url);
        let request = HttpRequest::new(HttpMethod::Get, &url).timeout(self.timeout);
        let response = self.http.execute(request).await.map_err(|e| {
            warn!(slug = %song.slug, error = %e, "Download source unreachable");
            FunnelError::UpstreamUnavailable(e.to_string())
        })?;

        if !response.is_success() || response.body.is_empty() {
            warn!(slug = %song.slug, status = response.status, "Download source unavailable");
            return Err(FunnelError::UpstreamUnavailable(format!(
                "upstream answered {} with {} bytes",
                response.status,
                response.body.len()
            )));
        }

        let content_type = response
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let file = DownloadFile {
            filename: download_filename(song),
            content_type,
            body: response.body,
        };
        info!(slug = %song.slug, bytes = file.body.len(), "Download served");
        Ok(Download::File(file))
    }

    fn source_url(&self, audio_url: &str) -> String {
        if audio_url.starts_with("http://") || audio_url.starts_with("https://") {
            return audio_url.to_string();
        }
        let path = audio_url.trim_start_matches('/');
        format!("{}/{}", self.site_origin, path)
    }
}

/// `<Artist>-<Slug>.<ext>`, e.g. `Caliph-Polygamy.mp3`.
pub fn download_filename(song: &SongMeta) -> String {
    let artist: String = song
        .artist
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let mut chars = song.slug.chars();
    let name: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };

    let extension = song
        .audio_url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp3");

    format!("{artist}-{name}.{extension}")
}
