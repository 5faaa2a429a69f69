//! # Player Store
//!
//! The one playback session object for the application lifetime. It owns the
//! engine, consults the resolvers, publishes the session through a
//! `tokio::sync::watch` channel and mirrors transitions onto the core event
//! bus.
//!
//! Every mutation returns the resulting [`PlaybackSession`]. Playback
//! failures show up as `is_playing == false` plus a log line and an
//! `Error` event, never as an `Err`.

use std::sync::Arc;
use std::time::Duration;

use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bridge_traits::audio::{AudioOutput, OutputEvent, OutputNotice};

use crate::activity::ActivityReporter;
use crate::config::PlayerConfig;
use crate::engine::{millis, PlayOutcome, PlayRequest, PlaybackEngine, ToggleOutcome};
use crate::entitlement::EntitlementResolver;
use crate::error::PlaybackError;
use crate::preview::ClampAction;
use crate::source::SourceResolver;
use crate::types::{PlayableItem, PlaybackSession, PreviewWindow};

pub struct PlayerStore {
    engine: PlaybackEngine,
    entitlements: Arc<dyn EntitlementResolver>,
    sources: SourceResolver,
    reporter: ActivityReporter,
    fallback_item: Option<PlayableItem>,
    session: watch::Sender<PlaybackSession>,
    events: EventBus,
}

impl PlayerStore {
    pub fn new(
        config: PlayerConfig,
        output: Arc<dyn AudioOutput>,
        entitlements: Arc<dyn EntitlementResolver>,
        events: EventBus,
    ) -> Self {
        let (session, _) = watch::channel(PlaybackSession::default());
        Self {
            engine: PlaybackEngine::new(output, &config),
            entitlements,
            sources: SourceResolver::new(config.default_source.clone()),
            reporter: ActivityReporter::disabled(),
            fallback_item: config.fallback_item,
            session,
            events,
        }
    }

    pub fn with_activity_reporter(mut self, reporter: ActivityReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSession> {
        self.session.subscribe()
    }

    pub fn snapshot(&self) -> PlaybackSession {
        self.session.borrow().clone()
    }

    pub fn preview_window(&self) -> PreviewWindow {
        self.engine.preview_window()
    }

    pub fn activity_reporter(&self) -> &ActivityReporter {
        &self.reporter
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.emit(CoreEvent::Playback(event));
    }

    fn emit_error(&self, item_id: Option<&str>, err: &PlaybackError) {
        self.emit(PlaybackEvent::Error {
            track_id: item_id.map(str::to_string),
            message: err.to_string(),
            recoverable: err.is_benign(),
        });
    }

    fn set_paused(&self) {
        self.session.send_modify(|s| s.is_playing = false);
    }

    /// Play button semantics: on the current item this toggles, otherwise it
    /// loads and starts `item`.
    ///
    /// Concurrent calls resolve in call order: the last `play` issued wins,
    /// however long earlier ones spend resolving entitlements.
    pub async fn play(&self, item: PlayableItem) -> PlaybackSession {
        let is_current = self.session.borrow().current_item_id() == Some(item.id.as_str());
        if is_current && self.engine.loaded_item().as_deref() == Some(item.id.as_str()) {
            return self.toggle_play_pause().await;
        }
        let request = self.engine.begin_request();
        self.start(request, item).await
    }

    async fn start(&self, request: PlayRequest, item: PlayableItem) -> PlaybackSession {
        let source = match self.sources.resolve_source(&item) {
            Ok(source) => source,
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "Not starting playback");
                self.set_paused();
                self.emit_error(Some(&item.id), &err);
                return self.snapshot();
            }
        };

        let supporter = self.entitlements.is_supporter(Some(&item.id)).await;
        if request.is_superseded() {
            debug!(item_id = %item.id, "Play superseded before loading");
            return self.snapshot();
        }
        let start = if supporter {
            Duration::ZERO
        } else {
            self.engine.preview_window().start()
        };

        self.session.send_modify(|s| {
            s.current_item = Some(item.clone());
            s.is_playing = false;
            s.current_time = start;
            s.duration = Duration::ZERO;
            s.is_mini_player_visible = true;
        });

        match self.engine.play(request, &item, &source, supporter).await {
            Ok(PlayOutcome::Playing) => {
                let duration = self.engine.duration().unwrap_or_default();
                let position = self.engine.position();
                self.session.send_modify(|s| {
                    s.current_item = Some(item.clone());
                    s.is_playing = true;
                    s.current_time = position;
                    s.duration = duration;
                    s.is_mini_player_visible = true;
                });
                self.emit(PlaybackEvent::Started {
                    track_id: item.id.clone(),
                    title: item.title.clone(),
                    preview_only: !supporter,
                });
                self.reporter.report_play(&item.id);
            }
            Ok(PlayOutcome::Rejected(reason)) => {
                self.session.send_modify(|s| {
                    s.current_item = Some(item.clone());
                    s.is_playing = false;
                });
                self.emit_error(Some(&item.id), &PlaybackError::PlaybackRejected(reason));
            }
            Ok(PlayOutcome::Superseded) => {
                debug!(item_id = %item.id, "Play superseded; leaving session to newer request");
            }
            Err(err) => {
                warn!(item_id = %item.id, error = %err, "Playback failed");
                self.set_paused();
                self.emit_error(Some(&item.id), &err);
            }
        }

        self.snapshot()
    }

    /// Pause when playing, resume when paused. With nothing loaded, starts
    /// the current item or the configured fallback item.
    pub async fn toggle_play_pause(&self) -> PlaybackSession {
        let current = self.session.borrow().current_item.clone();
        let supporter = self
            .entitlements
            .is_supporter(current.as_ref().map(|item| item.id.as_str()))
            .await;

        match self.engine.toggle(supporter).await {
            Ok(ToggleOutcome::NothingLoaded) => {
                return match current.or_else(|| self.fallback_item.clone()) {
                    Some(item) => self.start(self.engine.begin_request(), item).await,
                    None => {
                        warn!("Nothing loaded and no fallback item configured");
                        self.snapshot()
                    }
                };
            }
            Ok(ToggleOutcome::Paused) => {
                let position = self.engine.position();
                self.session.send_modify(|s| {
                    s.is_playing = false;
                    s.current_time = position;
                });
                if let Some(item) = &current {
                    self.emit(PlaybackEvent::Paused {
                        track_id: item.id.clone(),
                        position_ms: millis(position),
                    });
                }
            }
            Ok(ToggleOutcome::Resumed(PlayOutcome::Playing)) => {
                let position = self.engine.position();
                self.session.send_modify(|s| {
                    s.is_playing = s.current_item.is_some();
                    s.is_mini_player_visible = s.current_item.is_some();
                    s.current_time = position;
                });
                if let Some(item) = &current {
                    self.emit(PlaybackEvent::Resumed {
                        track_id: item.id.clone(),
                        position_ms: millis(position),
                    });
                }
            }
            Ok(ToggleOutcome::Resumed(PlayOutcome::Rejected(reason))) => {
                self.set_paused();
                self.emit_error(
                    current.as_ref().map(|item| item.id.as_str()),
                    &PlaybackError::PlaybackRejected(reason),
                );
            }
            Ok(ToggleOutcome::Resumed(PlayOutcome::Superseded)) => {}
            Err(err) => {
                warn!(error = %err, "Play/pause failed");
                self.set_paused();
                self.emit_error(current.as_ref().map(|item| item.id.as_str()), &err);
            }
        }

        self.snapshot()
    }

    /// Seek to `seconds`, clamped to what the visitor may hear.
    pub async fn seek_to(&self, seconds: f64) -> PlaybackSession {
        // Out-of-range targets saturate; the engine clamps them afterwards.
        let target = if seconds > 0.0 {
            Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        let current = self.session.borrow().current_item_id().map(str::to_string);
        let supporter = self.entitlements.is_supporter(current.as_deref()).await;

        match self.engine.seek(target, supporter).await {
            Ok(applied) => {
                let duration = self.engine.duration().unwrap_or_default();
                self.session.send_modify(|s| {
                    s.current_time = applied;
                    s.duration = duration;
                });
                if let Some(track_id) = current {
                    self.emit(PlaybackEvent::PositionChanged {
                        track_id,
                        position_ms: millis(applied),
                        duration_ms: millis(duration),
                    });
                }
            }
            Err(PlaybackError::NothingLoaded) => debug!("Seek ignored; nothing loaded"),
            Err(err) => warn!(error = %err, "Seek failed"),
        }

        self.snapshot()
    }

    /// Stop playback and hide the player.
    pub async fn stop(&self) -> PlaybackSession {
        if let Err(err) = self.engine.stop().await {
            warn!(error = %err, "Stopping output failed");
        }

        let current = self.session.borrow().current_item_id().map(str::to_string);
        self.session.send_modify(|s| {
            s.is_playing = false;
            s.current_time = Duration::ZERO;
            s.is_mini_player_visible = false;
            s.is_full_screen_visible = false;
        });
        if let Some(track_id) = current {
            info!(item_id = %track_id, "Player hidden");
            self.emit(PlaybackEvent::Stopped { track_id });
        }
        self.snapshot()
    }

    pub fn open_full_screen(&self) -> PlaybackSession {
        self.session.send_if_modified(|s| {
            if s.current_item.is_none() || s.is_full_screen_visible {
                return false;
            }
            s.is_full_screen_visible = true;
            s.is_mini_player_visible = true;
            true
        });
        self.snapshot()
    }

    pub fn close_full_screen(&self) -> PlaybackSession {
        self.session.send_if_modified(|s| {
            let changed = s.is_full_screen_visible;
            s.is_full_screen_visible = false;
            changed
        });
        self.snapshot()
    }

    /// Fold one output notification into the session. Notices raised by a
    /// load that has since been replaced are dropped.
    pub async fn handle_output_event(&self, notice: OutputNotice) {
        let current_load = self.engine.load_id();
        if notice.load != current_load {
            debug!(
                load = notice.load,
                current_load,
                event = ?notice.event,
                "Dropping notice from a replaced source"
            );
            return;
        }

        match notice.event {
            OutputEvent::MetadataLoaded { duration } => {
                self.session
                    .send_modify(|s| s.duration = duration.unwrap_or_default());
            }
            OutputEvent::TimeUpdate { position } => {
                let action = match self.engine.apply_time_update(position).await {
                    Ok(action) => action,
                    Err(err) => {
                        warn!(error = %err, "Preview clamp could not be applied");
                        ClampAction::None
                    }
                };
                let duration = self.engine.duration();
                self.session.send_modify(|s| {
                    if let Some(duration) = duration {
                        s.duration = duration;
                    }
                    match action {
                        ClampAction::None => s.current_time = position,
                        ClampAction::SnapForward(to) => s.current_time = to,
                        ClampAction::PauseAndRewind(to) => {
                            s.current_time = to;
                            s.is_playing = false;
                        }
                    }
                });
                if let ClampAction::PauseAndRewind(to) = action {
                    if let Some(track_id) = self.snapshot().current_item_id() {
                        self.emit(PlaybackEvent::PreviewClamped {
                            track_id: track_id.to_string(),
                            rewound_to_ms: millis(to),
                        });
                    }
                }
            }
            OutputEvent::Ended => {
                // Natural end wins over the preview clamp: no rewind.
                let position = self.engine.position();
                self.session.send_modify(|s| {
                    s.is_playing = false;
                    s.current_time = position;
                });
                if let Some(track_id) = self.snapshot().current_item_id() {
                    self.emit(PlaybackEvent::Completed {
                        track_id: track_id.to_string(),
                    });
                }
            }
        }
    }

    /// Drive [`handle_output_event`](Self::handle_output_event) from the
    /// output's notification stream until the store is dropped.
    pub fn spawn_event_pump(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.engine.subscribe_output();
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notice) => {
                        let Some(store) = store.upgrade() else { break };
                        store.handle_output_event(notice).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Output event pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Output event pump stopped");
        })
    }
}
