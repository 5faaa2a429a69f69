//! Headless audio output.
//!
//! Tracks position against the tokio clock without producing sound. Useful
//! for servers, CLIs and tests; with `tokio::time::pause()` it is fully
//! deterministic.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    audio::{AudioOutput, OutputEvent, OutputNotice},
    error::{BridgeError, Result},
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

/// How a source behaves once attached.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessTrack {
    pub duration: Option<Duration>,
    /// Delay before metadata arrives. `None` means it never does.
    pub metadata_delay: Option<Duration>,
}

impl Default for HeadlessTrack {
    fn default() -> Self {
        Self {
            duration: Some(Duration::from_secs(210)),
            metadata_delay: Some(Duration::from_millis(50)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LoadState {
    generation: u64,
    ready: bool,
}

struct State {
    source: Option<String>,
    duration: Option<Duration>,
    paused: bool,
    anchor: Duration,
    started_at: Option<Instant>,
    rejections: VecDeque<BridgeError>,
    ticker_running: bool,
}

impl State {
    fn position(&self, now: Instant) -> Duration {
        let elapsed = self
            .started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        let position = self.anchor.saturating_add(elapsed);
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn freeze(&mut self, now: Instant) {
        self.anchor = self.position(now);
        self.started_at = None;
        self.paused = true;
    }
}

struct Inner {
    state: Mutex<State>,
    load: watch::Sender<LoadState>,
    events: broadcast::Sender<OutputNotice>,
    tracks: Mutex<HashMap<String, HeadlessTrack>>,
    default_track: HeadlessTrack,
    tick_interval: Duration,
}

/// Clock-driven [`AudioOutput`] with no audio device behind it.
#[derive(Clone)]
pub struct HeadlessAudioOutput {
    inner: Arc<Inner>,
}

impl HeadlessAudioOutput {
    pub fn new() -> Self {
        Self::with_settings(HeadlessTrack::default(), Duration::from_millis(250))
    }

    pub fn with_settings(default_track: HeadlessTrack, tick_interval: Duration) -> Self {
        let (load, _) = watch::channel(LoadState {
            generation: 0,
            ready: false,
        });
        let (events, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    source: None,
                    duration: None,
                    paused: true,
                    anchor: Duration::ZERO,
                    started_at: None,
                    rejections: VecDeque::new(),
                    ticker_running: false,
                }),
                load,
                events,
                tracks: Mutex::new(HashMap::new()),
                default_track,
                tick_interval,
            }),
        }
    }

    /// Override the behaviour of one source URL.
    pub fn register_track(&self, url: impl Into<String>, track: HeadlessTrack) {
        self.inner.tracks.lock().insert(url.into(), track);
    }

    /// Make the next `play()` fail with the given error.
    pub fn reject_next_play(&self, error: BridgeError) {
        self.inner.state.lock().rejections.push_back(error);
    }

    fn emit(&self, event: OutputEvent) {
        self.inner.emit(event);
    }

    fn spawn_metadata(&self, generation: u64, url: String, track: HeadlessTrack) {
        let Some(delay) = track.metadata_delay else {
            debug!(%url, "Headless source will never report metadata");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            if inner.load.borrow().generation != generation {
                return;
            }
            inner.state.lock().duration = track.duration;
            inner.load.send_replace(LoadState {
                generation,
                ready: true,
            });
            let _ = inner.events.send(OutputNotice {
                load: generation,
                event: OutputEvent::MetadataLoaded {
                    duration: track.duration,
                },
            });
        });
    }

    fn ensure_ticker(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.ticker_running {
                return;
            }
            state.ticker_running = true;
        }
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.tick_interval;
        tokio::spawn(tick_loop(weak, period));
    }
}

impl Inner {
    fn emit(&self, event: OutputEvent) {
        let load = self.load.borrow().generation;
        let _ = self.events.send(OutputNotice { load, event });
    }
}

async fn tick_loop(weak: Weak<Inner>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let Some(inner) = weak.upgrade() else { return };
        let now = Instant::now();
        let event = {
            let mut state = inner.state.lock();
            if state.paused {
                None
            } else {
                let position = state.position(now);
                match state.duration {
                    Some(duration) if position >= duration => {
                        state.freeze(now);
                        Some(OutputEvent::Ended)
                    }
                    _ => Some(OutputEvent::TimeUpdate { position }),
                }
            }
        };
        if let Some(event) = event {
            trace!(?event, "Headless tick");
            inner.emit(event);
        }
    }
}

impl Default for HeadlessAudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioOutput for HeadlessAudioOutput {
    async fn attach(&self, url: &str) -> Result<()> {
        let track = self
            .inner
            .tracks
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| self.inner.default_track.clone());

        {
            let mut state = self.inner.state.lock();
            state.source = Some(url.to_string());
            state.duration = None;
            state.paused = true;
            state.anchor = Duration::ZERO;
            state.started_at = None;
        }
        let generation = self.inner.load.borrow().generation + 1;
        self.inner.load.send_replace(LoadState {
            generation,
            ready: false,
        });

        debug!(%url, generation, "Headless source attached");
        self.spawn_metadata(generation, url.to_string(), track);
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            state.source = None;
            state.duration = None;
            state.paused = true;
            state.anchor = Duration::ZERO;
            state.started_at = None;
        }
        let generation = self.inner.load.borrow().generation + 1;
        self.inner.load.send_replace(LoadState {
            generation,
            ready: false,
        });
        Ok(())
    }

    async fn wait_for_metadata(&self) -> Result<Option<Duration>> {
        let mut rx = self.inner.load.subscribe();
        let target = rx.borrow().generation;
        let outcome = rx
            .wait_for(|load| load.ready || load.generation != target)
            .await
            .map(|load| *load)
            .map_err(|_| BridgeError::NotAvailable("audio output dropped".to_string()))?;

        if outcome.generation != target {
            return Err(BridgeError::Aborted("source replaced while loading".to_string()));
        }
        Ok(self.inner.state.lock().duration)
    }

    async fn play(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.source.is_none() {
                return Err(BridgeError::NotAvailable("no source attached".to_string()));
            }
            if let Some(rejection) = state.rejections.pop_front() {
                return Err(rejection);
            }
            if state.paused {
                state.paused = false;
                state.started_at = Some(Instant::now());
            }
        }
        self.ensure_ticker();
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        if !state.paused {
            state.freeze(Instant::now());
        }
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<()> {
        let position = {
            let mut state = self.inner.state.lock();
            if state.source.is_none() {
                return Err(BridgeError::NotAvailable("no source attached".to_string()));
            }
            let target = match state.duration {
                Some(duration) => position.min(duration),
                None => position,
            };
            state.anchor = target;
            if !state.paused {
                state.started_at = Some(Instant::now());
            }
            target
        };
        self.emit(OutputEvent::TimeUpdate { position });
        Ok(())
    }

    fn position(&self) -> Duration {
        self.inner.state.lock().position(Instant::now())
    }

    fn duration(&self) -> Option<Duration> {
        self.inner.state.lock().duration
    }

    fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    fn source(&self) -> Option<String> {
        self.inner.state.lock().source.clone()
    }

    fn load_id(&self) -> u64 {
        self.inner.load.borrow().generation
    }

    fn subscribe(&self) -> broadcast::Receiver<OutputNotice> {
        self.inner.events.subscribe()
    }
}
