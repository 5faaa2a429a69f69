//! Shared fixtures for the playback integration tests.
//!
//! [`RecordingOutput`] wraps the headless output and keeps an ordered log of
//! every call that reached it, so tests can assert on sequencing.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::{HeadlessAudioOutput, MemoryMarkerStore};
use bridge_traits::audio::{AudioOutput, OutputNotice};
use bridge_traits::error::Result;
use bridge_traits::storage::{MarkerStore, ONE_YEAR};
use core_playback::{MarkerEntitlements, PlayableItem, PlayerConfig, PlayerStore};
use core_runtime::events::{CoreEvent, EventBus};
use parking_lot::Mutex;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Attach(String),
    Detach,
    /// A `play()` that the output accepted.
    Play,
    PlayRejected,
    Pause,
    Seek(Duration),
}

pub struct RecordingOutput {
    inner: HeadlessAudioOutput,
    ops: Mutex<Vec<Op>>,
}

impl RecordingOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HeadlessAudioOutput::new(),
            ops: Mutex::new(Vec::new()),
        })
    }

    pub fn headless(&self) -> &HeadlessAudioOutput {
        &self.inner
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    pub fn attached_urls(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Attach(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: Op) {
        self.ops.lock().push(op);
    }
}

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn attach(&self, url: &str) -> Result<()> {
        self.record(Op::Attach(url.to_string()));
        self.inner.attach(url).await
    }

    async fn detach(&self) -> Result<()> {
        self.record(Op::Detach);
        self.inner.detach().await
    }

    async fn wait_for_metadata(&self) -> Result<Option<Duration>> {
        self.inner.wait_for_metadata().await
    }

    async fn play(&self) -> Result<()> {
        let result = self.inner.play().await;
        self.record(if result.is_ok() { Op::Play } else { Op::PlayRejected });
        result
    }

    async fn pause(&self) -> Result<()> {
        self.record(Op::Pause);
        self.inner.pause().await
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        self.record(Op::Seek(position));
        self.inner.seek(position).await
    }

    fn position(&self) -> Duration {
        self.inner.position()
    }

    fn duration(&self) -> Option<Duration> {
        self.inner.duration()
    }

    fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    fn source(&self) -> Option<String> {
        self.inner.source()
    }

    fn load_id(&self) -> u64 {
        self.inner.load_id()
    }

    fn subscribe(&self) -> broadcast::Receiver<OutputNotice> {
        self.inner.subscribe()
    }
}

pub fn track(id: &str) -> PlayableItem {
    PlayableItem::new(id, id, "Caliph").with_audio_source(url_for(id))
}

pub fn url_for(id: &str) -> String {
    format!("https://cdn.example.com/{id}.mp3")
}

pub struct Harness {
    pub store: Arc<PlayerStore>,
    pub output: Arc<RecordingOutput>,
    pub markers: Arc<MemoryMarkerStore>,
    pub bus: EventBus,
}

impl Harness {
    pub fn new(config: PlayerConfig) -> Self {
        let output = RecordingOutput::new();
        let markers = Arc::new(MemoryMarkerStore::new());
        let bus = EventBus::default();
        let store = Arc::new(PlayerStore::new(
            config,
            output.clone(),
            Arc::new(MarkerEntitlements::new(markers.clone())),
            bus.clone(),
        ));
        Self {
            store,
            output,
            markers,
            bus,
        }
    }

    pub async fn make_supporter(&self) {
        self.markers.set("supporter", "1", ONE_YEAR).await.unwrap();
    }
}

/// Drain everything currently buffered on an event receiver.
pub fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
