//! # Core Configuration Module
//!
//! Builder-based configuration for the release funnel core.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries the injected bridges and the site-wide settings
//! (preview window, default track, activity endpoint, database location).
//! The builder validates eagerly so a misconfigured host fails at startup
//! instead of at the first play.
//!
//! ## Required Dependencies
//!
//! - `MarkerStore` - entitlement, gate and de-duplication markers
//! - `AudioOutput` - the single audio output handle
//!
//! ## Optional Dependencies
//!
//! - `HttpClient` - activity pings (desktop default: reqwest)
//! - `PaymentGateway` - hosted checkout
//!
//! When the `desktop-shims` feature is enabled, `MemoryMarkerStore`,
//! `HeadlessAudioOutput` and `ReqwestHttpClient` are injected when absent.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .site_origin("https://caliph.example")
//!     .preview_window(45.0, 30.0)
//!     .default_track_url("https://cdn.example.com/polygamy.mp3")
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`CoreConfigBuilder::from_env`] seeds a builder from process variables:
//!
//! | Variable                 | Setting |
//! |--------------------------|---------|
//! | `FUNNEL_SITE_ORIGIN`     | site origin for checkout redirects |
//! | `PREVIEW_START_SECONDS`  | preview window start |
//! | `PREVIEW_LENGTH_SECONDS` | preview window length |
//! | `TRACK_URL`              | process-wide default audio source |
//! | `ACTIVITY_ENDPOINT`      | play ping endpoint (enables activity logging) |
//! | `FUNNEL_DATABASE_PATH`   | SQLite database file |

use crate::error::{Error, Result};
use bridge_traits::{AudioOutput, HttpClient, MarkerStore, PaymentGateway};
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_PREVIEW_START_SECS: f64 = 0.0;
pub const DEFAULT_PREVIEW_LENGTH_SECS: f64 = 30.0;

/// Allowed playback range for visitors who have not paid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewSettings {
    pub start_secs: f64,
    pub length_secs: f64,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            start_secs: DEFAULT_PREVIEW_START_SECS,
            length_secs: DEFAULT_PREVIEW_LENGTH_SECS,
        }
    }
}

impl PreviewSettings {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.length_secs
    }

    pub fn validate(&self) -> Result<()> {
        if !self.start_secs.is_finite() || self.start_secs < 0.0 {
            return Err(Error::Config(format!(
                "Preview start must be a non-negative number of seconds, got {}",
                self.start_secs
            )));
        }
        if !self.length_secs.is_finite() || self.length_secs <= 0.0 {
            return Err(Error::Config(format!(
                "Preview length must be a positive number of seconds, got {}",
                self.length_secs
            )));
        }
        if std::time::Duration::try_from_secs_f64(self.end_secs()).is_err() {
            return Err(Error::Config(format!(
                "Preview window ending at {} seconds is out of range",
                self.end_secs()
            )));
        }
        Ok(())
    }
}

/// Features flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureFlags {
    /// Send a one-shot play ping per session (requires endpoint + HttpClient)
    pub enable_activity_logging: bool,

    /// Accept checkout requests (requires PaymentGateway)
    pub enable_checkout: bool,
}

/// Core configuration. Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Public origin used to build absolute redirect URLs
    pub site_origin: String,

    /// Path to the SQLite database file
    pub database_path: PathBuf,

    pub preview: PreviewSettings,

    /// Source used when an item carries no audio URL of its own
    pub default_track_url: Option<String>,

    /// Endpoint receiving the per-session play ping
    pub activity_endpoint: Option<String>,

    pub http_client: Option<Arc<dyn HttpClient>>,

    pub marker_store: Arc<dyn MarkerStore>,

    pub audio_output: Arc<dyn AudioOutput>,

    pub payment_gateway: Option<Arc<dyn PaymentGateway>>,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("site_origin", &self.site_origin)
            .field("database_path", &self.database_path)
            .field("preview", &self.preview)
            .field("default_track_url", &self.default_track_url)
            .field("activity_endpoint", &self.activity_endpoint)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("marker_store", &"MarkerStore { ... }")
            .field("audio_output", &"AudioOutput { ... }")
            .field(
                "payment_gateway",
                &self
                    .payment_gateway
                    .as_ref()
                    .map(|_| "PaymentGateway { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// Checks the origin shape, the preview window, and that every enabled
    /// feature has the bridge it needs.
    pub fn validate(&self) -> Result<()> {
        if !(self.site_origin.starts_with("http://") || self.site_origin.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Site origin must be an absolute http(s) URL, got '{}'",
                self.site_origin
            )));
        }

        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        self.preview.validate()?;

        if self.features.enable_activity_logging {
            if self.activity_endpoint.is_none() {
                return Err(Error::Config(
                    "Activity logging enabled but no activity endpoint configured. \
                     Set ACTIVITY_ENDPOINT or call .activity_endpoint()."
                        .to_string(),
                ));
            }
            if self.http_client.is_none() {
                return Err(Error::capability_missing(
                    "HttpClient",
                    "Activity logging needs an HttpClient. \
                     Desktop: enable the 'desktop-shims' feature. \
                     Other hosts: inject a platform client.",
                ));
            }
        }

        if self.features.enable_checkout && self.payment_gateway.is_none() {
            return Err(Error::capability_missing(
                "PaymentGateway",
                "Checkout enabled but no PaymentGateway provided. \
                 Disable the feature or inject a processor adapter.",
            ));
        }

        Ok(())
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_marker_store() -> Result<Arc<dyn MarkerStore>> {
    use bridge_desktop::MemoryMarkerStore;

    let store: Arc<dyn MarkerStore> = Arc::new(MemoryMarkerStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_marker_store() -> Result<Arc<dyn MarkerStore>> {
    Err(Error::CapabilityMissing {
        capability: "MarkerStore".to_string(),
        message: "A MarkerStore is required to resolve entitlements. \
                 Desktop: enable the 'desktop-shims' feature for the in-memory store. \
                 Servers: inject a cookie-jar or session-backed store."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_audio_output() -> Result<Arc<dyn AudioOutput>> {
    use bridge_desktop::HeadlessAudioOutput;

    let output: Arc<dyn AudioOutput> = Arc::new(HeadlessAudioOutput::new());
    Ok(output)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_audio_output() -> Result<Arc<dyn AudioOutput>> {
    Err(Error::CapabilityMissing {
        capability: "AudioOutput".to_string(),
        message: "An AudioOutput is required for playback. \
                 Desktop: enable the 'desktop-shims' feature for the headless output. \
                 Other hosts: inject the platform media element adapter."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(Some(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Option<Arc<dyn HttpClient>>> {
    Ok(None)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_seconds(key: &str) -> Result<Option<f64>> {
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} must be a number of seconds, got '{}'", key, raw))),
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    site_origin: Option<String>,
    database_path: Option<PathBuf>,
    preview: Option<PreviewSettings>,
    default_track_url: Option<String>,
    activity_endpoint: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    marker_store: Option<Arc<dyn MarkerStore>>,
    audio_output: Option<Arc<dyn AudioOutput>>,
    payment_gateway: Option<Arc<dyn PaymentGateway>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Seed a builder from environment variables.
    ///
    /// Setting `ACTIVITY_ENDPOINT` also turns on activity logging.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::default();

        if let Some(origin) = env_string("FUNNEL_SITE_ORIGIN") {
            builder = builder.site_origin(origin);
        }
        if let Some(path) = env_string("FUNNEL_DATABASE_PATH") {
            builder = builder.database_path(path);
        }

        let start = env_seconds("PREVIEW_START_SECONDS")?;
        let length = env_seconds("PREVIEW_LENGTH_SECONDS")?;
        if start.is_some() || length.is_some() {
            builder = builder.preview_window(
                start.unwrap_or(DEFAULT_PREVIEW_START_SECS),
                length.unwrap_or(DEFAULT_PREVIEW_LENGTH_SECS),
            );
        }

        if let Some(url) = env_string("TRACK_URL") {
            builder = builder.default_track_url(url);
        }
        if let Some(endpoint) = env_string("ACTIVITY_ENDPOINT") {
            builder = builder
                .activity_endpoint(endpoint)
                .enable_activity_logging(true);
        }

        Ok(builder)
    }

    /// Default: `http://localhost:3000`
    pub fn site_origin(mut self, origin: impl Into<String>) -> Self {
        self.site_origin = Some(origin.into().trim_end_matches('/').to_string());
        self
    }

    /// Default: `funnel.db`
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the preview window in seconds.
    ///
    /// Default: start 0, length 30
    pub fn preview_window(mut self, start_secs: f64, length_secs: f64) -> Self {
        self.preview = Some(PreviewSettings {
            start_secs,
            length_secs,
        });
        self
    }

    pub fn default_track_url(mut self, url: impl Into<String>) -> Self {
        self.default_track_url = Some(url.into());
        self
    }

    pub fn activity_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.activity_endpoint = Some(endpoint.into());
        self
    }

    /// If not provided, the reqwest client is used when `desktop-shims` is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the marker store implementation (required).
    pub fn marker_store(mut self, store: Arc<dyn MarkerStore>) -> Self {
        self.marker_store = Some(store);
        self
    }

    /// Sets the audio output handle (required).
    pub fn audio_output(mut self, output: Arc<dyn AudioOutput>) -> Self {
        self.audio_output = Some(output);
        self
    }

    pub fn payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payment_gateway = Some(gateway);
        self
    }

    /// Default: false
    pub fn enable_activity_logging(mut self, enabled: bool) -> Self {
        self.features.enable_activity_logging = enabled;
        self
    }

    /// Default: false
    pub fn enable_checkout(mut self, enabled: bool) -> Self {
        self.features.enable_checkout = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - `CapabilityMissing` when a required bridge is absent and no desktop
    ///   default is available
    /// - `Config` when a value is invalid or a feature lacks its settings
    pub fn build(self) -> Result<CoreConfig> {
        let marker_store = match self.marker_store {
            Some(store) => store,
            None => provide_default_marker_store()?,
        };

        let audio_output = match self.audio_output {
            Some(output) => output,
            None => provide_default_audio_output()?,
        };

        let http_client = match self.http_client {
            Some(client) => Some(client),
            None => provide_default_http_client()?,
        };

        let config = CoreConfig {
            site_origin: self
                .site_origin
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            database_path: self
                .database_path
                .unwrap_or_else(|| PathBuf::from("funnel.db")),
            preview: self.preview.unwrap_or_default(),
            default_track_url: self.default_track_url.filter(|url| !url.trim().is_empty()),
            activity_endpoint: self.activity_endpoint,
            http_client,
            marker_store,
            audio_output,
            payment_gateway: self.payment_gateway,
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        CheckoutSession, CheckoutSessionRequest, HttpRequest, HttpResponse, OutputNotice,
    };
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct NullMarkers;

    #[async_trait]
    impl MarkerStore for NullMarkers {
        async fn get(&self, _name: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _name: &str, _value: &str, _max_age: Duration) -> BridgeResult<()> {
            Ok(())
        }
        async fn remove(&self, _name: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct SilentOutput {
        events: broadcast::Sender<OutputNotice>,
    }

    impl SilentOutput {
        fn new() -> Self {
            Self {
                events: broadcast::channel(4).0,
            }
        }
    }

    #[async_trait]
    impl AudioOutput for SilentOutput {
        async fn attach(&self, _url: &str) -> BridgeResult<()> {
            Ok(())
        }
        async fn detach(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn wait_for_metadata(&self) -> BridgeResult<Option<Duration>> {
            Ok(None)
        }
        async fn play(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn pause(&self) -> BridgeResult<()> {
            Ok(())
        }
        async fn seek(&self, _position: Duration) -> BridgeResult<()> {
            Ok(())
        }
        fn position(&self) -> Duration {
            Duration::ZERO
        }
        fn duration(&self) -> Option<Duration> {
            None
        }
        fn is_paused(&self) -> bool {
            true
        }
        fn source(&self) -> Option<String> {
            None
        }
        fn load_id(&self) -> u64 {
            0
        }
        fn subscribe(&self) -> broadcast::Receiver<OutputNotice> {
            self.events.subscribe()
        }
    }

    struct NullHttp;

    #[async_trait]
    impl HttpClient for NullHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse {
                status: 204,
                headers: Default::default(),
                body: Default::default(),
            })
        }
    }

    struct NullGateway;

    #[async_trait]
    impl PaymentGateway for NullGateway {
        async fn create_session(
            &self,
            _request: CheckoutSessionRequest,
        ) -> BridgeResult<CheckoutSession> {
            Err(bridge_traits::BridgeError::NotAvailable("test".into()))
        }
        async fn retrieve_session(&self, _session_id: &str) -> BridgeResult<CheckoutSession> {
            Err(bridge_traits::BridgeError::NotAvailable("test".into()))
        }
    }

    fn base_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .marker_store(Arc::new(NullMarkers))
            .audio_output(Arc::new(SilentOutput::new()))
    }

    #[test]
    fn test_builder_defaults() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.site_origin, "http://localhost:3000");
        assert_eq!(config.preview, PreviewSettings::default());
        assert_eq!(config.preview.end_secs(), 30.0);
        assert_eq!(config.features, FeatureFlags::default());
        assert!(config.default_track_url.is_none());
    }

    #[test]
    fn test_site_origin_trailing_slash_is_trimmed() {
        let config = base_builder()
            .site_origin("https://caliph.example/")
            .build()
            .unwrap();
        assert_eq!(config.site_origin, "https://caliph.example");
    }

    #[test]
    fn test_rejects_relative_origin() {
        let result = base_builder().site_origin("caliph.example").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_invalid_preview_window() {
        assert!(matches!(
            base_builder().preview_window(-1.0, 30.0).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            base_builder().preview_window(10.0, 0.0).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            base_builder().preview_window(f64::NAN, 30.0).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            base_builder().preview_window(1e30, 30.0).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_blank_default_track_is_dropped() {
        let config = base_builder().default_track_url("   ").build().unwrap();
        assert!(config.default_track_url.is_none());
    }

    #[test]
    fn test_activity_logging_requires_endpoint() {
        let result = base_builder()
            .http_client(Arc::new(NullHttp))
            .enable_activity_logging(true)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));

        let config = base_builder()
            .http_client(Arc::new(NullHttp))
            .activity_endpoint("https://caliph.example/api/activity/play")
            .enable_activity_logging(true)
            .build()
            .unwrap();
        assert!(config.features.enable_activity_logging);
    }

    #[test]
    fn test_checkout_requires_gateway() {
        let result = base_builder().enable_checkout(true).build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "PaymentGateway")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other),
        }

        let config = base_builder()
            .payment_gateway(Arc::new(NullGateway))
            .enable_checkout(true)
            .build()
            .unwrap();
        assert!(config.payment_gateway.is_some());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_marker_store() {
        let result = CoreConfig::builder()
            .audio_output(Arc::new(SilentOutput::new()))
            .build();
        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "MarkerStore")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder().build().unwrap();
        assert!(config.http_client.is_some());
    }

    #[test]
    fn test_config_debug_hides_bridges() {
        let config = base_builder().build().unwrap();
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("MarkerStore { ... }"));
        assert!(rendered.contains("AudioOutput { ... }"));
    }
}
