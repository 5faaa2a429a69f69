//! Integration tests for configuration loading and the event bus.

use std::sync::Arc;

use bridge_traits::time::LogLevel;
use core_runtime::config::{CoreConfigBuilder, PreviewSettings};
use core_runtime::events::{CoreEvent, EventBus, EventStream, FunnelEvent, GrantScope, PlaybackEvent};
use core_runtime::logging::{redact_email, LogFormat, LoggingConfig};

#[cfg(feature = "desktop-shims")]
#[test]
fn test_from_env_reads_preview_and_track() {
    std::env::set_var("FUNNEL_SITE_ORIGIN", "https://caliph.example/");
    std::env::set_var("PREVIEW_START_SECONDS", "45");
    std::env::set_var("PREVIEW_LENGTH_SECONDS", "20.5");
    std::env::set_var("TRACK_URL", "https://cdn.example.com/polygamy.mp3");
    std::env::remove_var("ACTIVITY_ENDPOINT");

    let config = CoreConfigBuilder::from_env().unwrap().build().unwrap();

    assert_eq!(config.site_origin, "https://caliph.example");
    assert_eq!(
        config.preview,
        PreviewSettings {
            start_secs: 45.0,
            length_secs: 20.5
        }
    );
    assert_eq!(
        config.default_track_url.as_deref(),
        Some("https://cdn.example.com/polygamy.mp3")
    );
    assert!(!config.features.enable_activity_logging);

    std::env::set_var("PREVIEW_START_SECONDS", "soon");
    assert!(CoreConfigBuilder::from_env().is_err());

    for key in [
        "FUNNEL_SITE_ORIGIN",
        "PREVIEW_START_SECONDS",
        "PREVIEW_LENGTH_SECONDS",
        "TRACK_URL",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn test_logging_config_defaults() {
    let config = LoggingConfig::default();

    assert_eq!(config.level, LogLevel::Info);
    assert!(config.filter.is_none());
    assert!(config.logger_sink.is_none());

    #[cfg(debug_assertions)]
    assert_eq!(config.format, LogFormat::Pretty);
}

#[test]
fn test_email_redaction_keeps_domain_only() {
    let redacted = redact_email("someone@caliph.example");
    assert!(redacted.starts_with('s'));
    assert!(!redacted.contains("someone"));
    assert!(redacted.ends_with("@caliph.example"));
}

#[tokio::test]
async fn test_playback_and_funnel_events_share_one_bus() {
    let bus = Arc::new(EventBus::default());
    let mut playback = EventStream::new(bus.subscribe())
        .filter(|event| matches!(event, CoreEvent::Playback(_)));
    let mut funnel = EventStream::new(bus.subscribe())
        .filter(|event| matches!(event, CoreEvent::Funnel(_)));

    bus.emit(CoreEvent::Funnel(FunnelEvent::SupporterGranted {
        scope: GrantScope::Item("polygamy".to_string()),
    }))
    .unwrap();
    bus.emit(CoreEvent::Playback(PlaybackEvent::PreviewClamped {
        track_id: "polygamy".to_string(),
        rewound_to_ms: 0,
    }))
    .unwrap();

    assert!(matches!(
        playback.recv().await.unwrap(),
        CoreEvent::Playback(PlaybackEvent::PreviewClamped { .. })
    ));
    assert!(matches!(
        funnel.recv().await.unwrap(),
        CoreEvent::Funnel(FunnelEvent::SupporterGranted { .. })
    ));
}
