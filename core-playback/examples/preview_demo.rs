//! # Preview Window Demo
//!
//! Plays a track as a non-supporter on the headless output, lets the preview
//! window run out, then unlocks the track and seeks past it.
//!
//! Run with: `cargo run --example preview_demo --package core-playback`

use std::sync::Arc;
use std::time::Duration;

use bridge_desktop::{HeadlessAudioOutput, MemoryMarkerStore};
use core_playback::{MarkerEntitlements, PlayableItem, PlayerConfig, PlayerStore, PreviewWindow};
use core_runtime::events::{EventBus, GrantScope};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default().with_format(LogFormat::Compact))?;

    let markers = Arc::new(MemoryMarkerStore::new());
    let entitlements = Arc::new(MarkerEntitlements::new(markers.clone()));
    let config = PlayerConfig::default()
        .with_preview(PreviewWindow::from_secs(10.0, 5.0)?)
        .with_default_source("https://cdn.example.com/polygamy.mp3");

    let store = Arc::new(PlayerStore::new(
        config,
        Arc::new(HeadlessAudioOutput::new()),
        entitlements.clone(),
        EventBus::default(),
    ));
    let _pump = store.spawn_event_pump();

    let item = PlayableItem::new("polygamy", "Polygamy", "Caliph");
    let session = store.play(item.clone()).await;
    println!("started at {:.2}s (preview)", session.current_time_secs());

    tokio::time::sleep(Duration::from_secs(6)).await;
    let session = store.snapshot();
    println!(
        "after preview: playing={} at {:.2}s",
        session.is_playing,
        session.current_time_secs()
    );

    entitlements.grant(&GrantScope::Item(item.id.clone())).await?;
    store.play(item).await;
    let session = store.seek_to(120.0).await;
    println!(
        "supporter: playing={} at {:.2}s of {:.2}s",
        session.is_playing,
        session.current_time_secs(),
        session.duration_secs()
    );

    Ok(())
}
