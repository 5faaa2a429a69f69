//! # Preview Clamp Policy
//!
//! Keeps a non-supporter inside the preview window:
//!
//! - before the window: snap forward to its start
//! - at or past the end: pause and rewind to the start
//! - seeks land in `[start, end - margin]`
//!
//! Position reports arriving shortly after play/resume are ignored, since the
//! output may still report the pre-seek position for a moment. Supporters are
//! never clamped.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::PreviewWindow;

/// What the engine must do in response to a position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampAction {
    None,
    /// Seek forward to the given position and keep playing.
    SnapForward(Duration),
    /// Pause, then seek to the given position.
    PauseAndRewind(Duration),
}

#[derive(Debug, Clone)]
pub struct PreviewClamp {
    window: PreviewWindow,
    suppression: Duration,
    seek_end_margin: Duration,
    armed_at: Option<Instant>,
}

impl PreviewClamp {
    pub fn new(window: PreviewWindow, suppression: Duration, seek_end_margin: Duration) -> Self {
        Self {
            window,
            suppression,
            seek_end_margin,
            armed_at: None,
        }
    }

    pub fn window(&self) -> PreviewWindow {
        self.window
    }

    /// Start the suppression window. Called right before every play/resume.
    pub fn arm(&mut self, now: Instant) {
        self.armed_at = Some(now);
    }

    pub fn is_suppressed(&self, now: Instant) -> bool {
        self.armed_at
            .map(|armed| now.saturating_duration_since(armed) < self.suppression)
            .unwrap_or(false)
    }

    /// Where playback of a freshly loaded item starts.
    pub fn start_position(&self, supporter: bool) -> Duration {
        if supporter {
            Duration::ZERO
        } else {
            self.window.start()
        }
    }

    /// Where a resumed item continues: the current position if allowed,
    /// otherwise the start of the allowed range.
    pub fn resume_position(&self, position: Duration, supporter: bool) -> Duration {
        if supporter || self.window.contains(position) {
            position
        } else {
            self.window.start()
        }
    }

    pub fn evaluate(&self, position: Duration, supporter: bool, now: Instant) -> ClampAction {
        if supporter || self.is_suppressed(now) {
            return ClampAction::None;
        }
        if position < self.window.start() {
            ClampAction::SnapForward(self.window.start())
        } else if position >= self.window.end() {
            ClampAction::PauseAndRewind(self.window.start())
        } else {
            ClampAction::None
        }
    }

    /// Clamp a seek target to the range the visitor may reach.
    pub fn clamp_seek(&self, target: Duration, supporter: bool, duration: Option<Duration>) -> Duration {
        let (lower, upper) = if supporter {
            (Duration::ZERO, duration)
        } else {
            let last = self.window.end().saturating_sub(self.seek_end_margin);
            let last = last.max(self.window.start());
            (self.window.start(), Some(duration.map_or(last, |d| last.min(d))))
        };

        let target = target.max(lower);
        match upper {
            Some(upper) => target.min(upper.max(lower)),
            None => target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clamp(start: u64, length: u64) -> PreviewClamp {
        PreviewClamp::new(
            PreviewWindow::new(Duration::from_secs(start), Duration::from_secs(length)).unwrap(),
            Duration::from_millis(500),
            Duration::from_millis(250),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_window_pauses_and_rewinds() {
        let policy = clamp(0, 30);
        let now = Instant::now();
        assert_eq!(
            policy.evaluate(Duration::from_secs(30), false, now),
            ClampAction::PauseAndRewind(Duration::ZERO)
        );
        assert_eq!(
            policy.evaluate(Duration::from_secs(29), false, now),
            ClampAction::None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn before_window_snaps_forward() {
        let policy = clamp(45, 20);
        assert_eq!(
            policy.evaluate(Duration::from_secs(3), false, Instant::now()),
            ClampAction::SnapForward(Duration::from_secs(45))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn suppression_window_expires() {
        let mut policy = clamp(45, 20);
        policy.arm(Instant::now());

        assert_eq!(
            policy.evaluate(Duration::ZERO, false, Instant::now()),
            ClampAction::None
        );

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(
            policy.evaluate(Duration::ZERO, false, Instant::now()),
            ClampAction::SnapForward(Duration::from_secs(45))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn supporters_are_never_clamped() {
        let policy = clamp(0, 30);
        assert_eq!(
            policy.evaluate(Duration::from_secs(180), true, Instant::now()),
            ClampAction::None
        );
    }

    #[test]
    fn seek_targets_stay_inside_window() {
        let policy = clamp(45, 20);
        assert_eq!(
            policy.clamp_seek(Duration::from_secs(10), false, Some(Duration::from_secs(210))),
            Duration::from_secs(45)
        );
        assert_eq!(
            policy.clamp_seek(Duration::from_secs(120), false, Some(Duration::from_secs(210))),
            Duration::from_millis(64_750)
        );
        assert_eq!(
            policy.clamp_seek(Duration::from_secs(50), false, None),
            Duration::from_secs(50)
        );
    }

    #[test]
    fn supporter_seek_bounded_by_duration_only() {
        let policy = clamp(0, 30);
        assert_eq!(
            policy.clamp_seek(Duration::from_secs(180), true, Some(Duration::from_secs(210))),
            Duration::from_secs(180)
        );
        assert_eq!(
            policy.clamp_seek(Duration::from_secs(400), true, Some(Duration::from_secs(210))),
            Duration::from_secs(210)
        );
        assert_eq!(
            policy.clamp_seek(Duration::from_secs(400), true, None),
            Duration::from_secs(400)
        );
    }

    #[test]
    fn resume_keeps_position_inside_window() {
        let policy = clamp(0, 30);
        assert_eq!(
            policy.resume_position(Duration::from_secs(12), false),
            Duration::from_secs(12)
        );
        assert_eq!(
            policy.resume_position(Duration::from_secs(30), false),
            Duration::ZERO
        );
        assert_eq!(
            policy.resume_position(Duration::from_secs(90), true),
            Duration::from_secs(90)
        );
    }
}
