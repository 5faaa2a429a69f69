//! # Playback Engine
//!
//! Owns the one [`AudioOutput`] handle for the session and sequences every
//! source swap on it.
//!
//! ## Generations
//!
//! Every play/resume/stop opens a new generation and cancels the previous
//! one's token. A play takes its [`PlayRequest`] when it is issued, before
//! any entitlement lookup, so requests are ordered by call order. A
//! superseded request stops at its next await point and never touches the
//! output again, so a slow `play(a)` followed by `play(b)` cannot make `a`
//! audible after `b` has loaded.
//!
//! Source swaps additionally hold `swap_lock`, so at most one source is ever
//! being attached.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::audio::{AudioOutput, OutputNotice};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::PlayerConfig;
use crate::error::{PlaybackError, Result};
use crate::preview::{ClampAction, PreviewClamp};
use crate::types::{PlayableItem, PreviewWindow};

/// Result of a play or resume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Playing,
    /// The output refused to start twice; playback stays paused.
    Rejected(String),
    /// A newer request took over; nothing was applied.
    Superseded,
}

/// Result of a play/pause toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Paused,
    Resumed(PlayOutcome),
    /// No source was ever attached.
    NothingLoaded,
}

/// Ticket for one play request.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    generation: u64,
    token: CancellationToken,
}

impl PlayRequest {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A newer request was issued after this one.
    pub fn is_superseded(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct EngineState {
    loaded_item: Option<String>,
    supporter: bool,
    clamp: PreviewClamp,
}

pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    metadata_timeout: Duration,
    play_retry_delay: Duration,
    generation: AtomicU64,
    current: Mutex<CancellationToken>,
    swap_lock: tokio::sync::Mutex<()>,
    state: Mutex<EngineState>,
}

impl PlaybackEngine {
    pub fn new(output: Arc<dyn AudioOutput>, config: &PlayerConfig) -> Self {
        Self {
            output,
            metadata_timeout: config.metadata_timeout,
            play_retry_delay: config.play_retry_delay,
            generation: AtomicU64::new(0),
            current: Mutex::new(CancellationToken::new()),
            swap_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(EngineState {
                loaded_item: None,
                supporter: false,
                clamp: PreviewClamp::new(
                    config.preview,
                    config.clamp_suppression,
                    config.seek_end_margin,
                ),
            }),
        }
    }

    pub fn preview_window(&self) -> PreviewWindow {
        self.state.lock().clamp.window()
    }

    /// Id of the item whose source is attached.
    pub fn loaded_item(&self) -> Option<String> {
        self.state.lock().loaded_item.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn position(&self) -> Duration {
        self.output.position()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.output.duration()
    }

    pub fn is_paused(&self) -> bool {
        self.output.is_paused()
    }

    /// Id of the output's current load; notices carrying another id are
    /// stale.
    pub fn load_id(&self) -> u64 {
        self.output.load_id()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<OutputNotice> {
        self.output.subscribe()
    }

    /// Open a new generation, cancelling whatever request is in flight.
    pub fn begin_request(&self) -> PlayRequest {
        let token = CancellationToken::new();
        let generation = {
            let mut current = self.current.lock();
            let previous = std::mem::replace(&mut *current, token.clone());
            previous.cancel();
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        PlayRequest { generation, token }
    }

    fn swap_in_progress(&self) -> bool {
        self.swap_lock.try_lock().is_err()
    }

    /// Load `item` from `source` (unless it is already loaded) and start it.
    #[instrument(skip(self, request, item, source), fields(item_id = %item.id, generation = request.generation))]
    pub async fn play(
        &self,
        request: PlayRequest,
        item: &PlayableItem,
        source: &str,
        supporter: bool,
    ) -> Result<PlayOutcome> {
        let PlayRequest { generation, token } = request;
        if token.is_cancelled() {
            return Ok(PlayOutcome::Superseded);
        }

        let _swap = tokio::select! {
            guard = self.swap_lock.lock() => guard,
            _ = token.cancelled() => return Ok(PlayOutcome::Superseded),
        };

        let same_item = self.state.lock().loaded_item.as_deref() == Some(item.id.as_str());
        if !same_item && !self.swap_source(item, source, &token).await? {
            debug!(generation, "Play superseded during source swap");
            return Ok(PlayOutcome::Superseded);
        }

        let position = self.output.position();
        let target = {
            let mut state = self.state.lock();
            state.supporter = supporter;
            if same_item {
                state.clamp.resume_position(position, supporter)
            } else {
                state.clamp.start_position(supporter)
            }
        };
        if token.is_cancelled() {
            return Ok(PlayOutcome::Superseded);
        }
        if !same_item || target != position {
            self.output.seek(target).await?;
        }

        self.state.lock().clamp.arm(Instant::now());
        let outcome = self.start_output(&token).await?;
        if outcome == PlayOutcome::Playing {
            info!(generation, supporter, start_ms = millis(target), "Playback started");
        }
        Ok(outcome)
    }

    /// Returns `false` when a newer generation took over mid-swap.
    async fn swap_source(&self, item: &PlayableItem, source: &str, token: &CancellationToken) -> Result<bool> {
        if let Err(e) = self.output.pause().await {
            debug!(error = %e, "Pause before swap failed");
        }
        self.output.detach().await?;
        self.state.lock().loaded_item = None;

        if token.is_cancelled() {
            return Ok(false);
        }

        self.output.attach(source).await?;
        self.state.lock().loaded_item = Some(item.id.clone());

        let wait = tokio::time::timeout(self.metadata_timeout, self.output.wait_for_metadata());
        tokio::select! {
            _ = token.cancelled() => return Ok(false),
            result = wait => match result {
                Ok(Ok(duration)) => {
                    debug!(duration_ms = duration.map(millis), "Metadata loaded");
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Metadata wait failed; continuing with unknown duration");
                }
                Err(_) => {
                    let err = PlaybackError::MetadataTimeout(self.metadata_timeout);
                    warn!(error = %err, "Continuing with unknown duration");
                }
            }
        }

        Ok(!token.is_cancelled())
    }

    /// `play()` with a single retry on rejection.
    async fn start_output(&self, token: &CancellationToken) -> Result<PlayOutcome> {
        if token.is_cancelled() {
            return Ok(PlayOutcome::Superseded);
        }
        match self.output.play().await {
            Ok(()) => return Ok(PlayOutcome::Playing),
            Err(e) if e.is_play_rejection() => {
                debug!(error = %e, "Play rejected; retrying once");
            }
            Err(e) => return Err(e.into()),
        }

        tokio::select! {
            _ = token.cancelled() => return Ok(PlayOutcome::Superseded),
            _ = tokio::time::sleep(self.play_retry_delay) => {}
        }
        if token.is_cancelled() {
            return Ok(PlayOutcome::Superseded);
        }

        match self.output.play().await {
            Ok(()) => Ok(PlayOutcome::Playing),
            Err(e) if e.is_play_rejection() => {
                let err = PlaybackError::PlaybackRejected(e.to_string());
                warn!(error = %err, "Staying paused");
                Ok(PlayOutcome::Rejected(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resume the loaded item, clamping the position for non-supporters.
    pub async fn resume(&self, supporter: bool) -> Result<PlayOutcome> {
        let PlayRequest { token, .. } = self.begin_request();
        let _swap = tokio::select! {
            guard = self.swap_lock.lock() => guard,
            _ = token.cancelled() => return Ok(PlayOutcome::Superseded),
        };

        if self.state.lock().loaded_item.is_none() {
            return Err(PlaybackError::NothingLoaded);
        }

        let position = self.output.position();
        let target = {
            let mut state = self.state.lock();
            state.supporter = supporter;
            state.clamp.resume_position(position, supporter)
        };
        if target != position {
            self.output.seek(target).await?;
        }

        self.state.lock().clamp.arm(Instant::now());
        self.start_output(&token).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.output.pause().await?;
        Ok(())
    }

    /// Pause when playing (or while a play is still in flight), resume when
    /// paused.
    pub async fn toggle(&self, supporter: bool) -> Result<ToggleOutcome> {
        if self.state.lock().loaded_item.is_none() && !self.swap_in_progress() {
            return Ok(ToggleOutcome::NothingLoaded);
        }

        if self.swap_in_progress() || !self.output.is_paused() {
            self.begin_request();
            self.pause().await?;
            return Ok(ToggleOutcome::Paused);
        }

        self.resume(supporter).await.map(ToggleOutcome::Resumed)
    }

    /// Seek within the range the visitor may reach. Returns the applied
    /// position.
    pub async fn seek(&self, target: Duration, supporter: bool) -> Result<Duration> {
        let clamped = {
            let mut state = self.state.lock();
            if state.loaded_item.is_none() {
                return Err(PlaybackError::NothingLoaded);
            }
            state.supporter = supporter;
            state.clamp.clamp_seek(target, supporter, self.output.duration())
        };

        if clamped != target {
            debug!(
                requested_ms = millis(target),
                applied_ms = millis(clamped),
                "Seek clamped"
            );
        }
        self.output.seek(clamped).await?;
        Ok(clamped)
    }

    /// Cancel any in-flight request, pause and rewind to zero.
    pub async fn stop(&self) -> Result<()> {
        self.begin_request();
        let _swap = self.swap_lock.lock().await;

        self.output.pause().await?;
        let loaded = self.state.lock().loaded_item.is_some();
        if loaded {
            self.output.seek(Duration::ZERO).await?;
        }
        Ok(())
    }

    /// Apply the preview policy to a position report from the output. The
    /// clamp only acts while the output is playing.
    pub async fn apply_time_update(&self, position: Duration) -> Result<ClampAction> {
        // Reports from a source being swapped out are meaningless.
        if self.swap_in_progress() || self.output.is_paused() {
            return Ok(ClampAction::None);
        }

        let action = {
            let state = self.state.lock();
            if state.loaded_item.is_none() {
                return Ok(ClampAction::None);
            }
            state.clamp.evaluate(position, state.supporter, Instant::now())
        };

        match action {
            ClampAction::None => {}
            ClampAction::SnapForward(to) => {
                debug!(position_ms = millis(position), "Before preview window; snapping forward");
                self.output.seek(to).await?;
            }
            ClampAction::PauseAndRewind(to) => {
                info!(position_ms = millis(position), "Preview window reached");
                self.output.pause().await?;
                self.output.seek(to).await?;
            }
        }
        Ok(action)
    }
}
