use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::PlaybackSettings;
use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Notifications for the display layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The displayed index changed.
    Shown {
        /// New display index.
        index: usize,
    },
    /// Latest-only mode asks for a fresh copy of the newest image.
    RefreshLatest,
}

/// Which timer, if any, is driving the display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Nothing scheduled.
    Stopped,
    /// The animation timer advances the index.
    Animating,
    /// The degraded single-image refresh timer is running.
    LatestOnly,
}

#[derive(Debug)]
struct PlaybackState {
    index: usize,
    count: usize,
    playing: bool,
    speed: Duration,
}

/// Advances a display index over a frame or timeline sequence.
///
/// At most one timer is alive at a time: starting the animation or latest-only timer always
/// aborts whichever was running. Must be used inside a Tokio runtime.
pub struct PlaybackController {
    state: Arc<Mutex<PlaybackState>>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    animation: Option<JoinHandle<()>>,
    latest: Option<JoinHandle<()>>,
    latest_refresh: Duration,
}

impl PlaybackController {
    /// Create a stopped controller over `count` items and the receiver for its events.
    pub fn new(
        count: usize,
        settings: &PlaybackSettings,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            state: Arc::new(Mutex::new(PlaybackState {
                index: 0,
                count,
                playing: false,
                speed: Duration::from_millis(settings.speed_ms.max(1)),
            })),
            events: tx,
            animation: None,
            latest: None,
            latest_refresh: Duration::from_secs(settings.latest_refresh_secs.max(1)),
        };
        (controller, rx)
    }

    /// Current display index.
    pub fn index(&self) -> usize {
        self.lock().index
    }

    /// Sequence length.
    pub fn count(&self) -> usize {
        self.lock().count
    }

    /// Return `true` while the animation timer runs.
    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    /// Step interval.
    pub fn speed(&self) -> Duration {
        self.lock().speed
    }

    /// Which timer is active.
    pub fn mode(&self) -> PlaybackMode {
        if self.animation.is_some() {
            PlaybackMode::Animating
        } else if self.latest.is_some() {
            PlaybackMode::LatestOnly
        } else {
            PlaybackMode::Stopped
        }
    }

    /// Replace the sequence length after a refresh, pausing and clamping the index.
    pub fn set_count(&mut self, count: usize) {
        self.pause();
        let mut st = self.lock();
        st.count = count;
        if st.index >= count {
            st.index = count.saturating_sub(1);
        }
    }

    /// Start advancing `index mod count` every `speed`.
    pub fn play(&mut self) -> SkyloopResult<()> {
        if self.count() == 0 {
            return Err(SkyloopError::validation("cannot play an empty sequence"));
        }
        self.clear_timers();
        let speed = {
            let mut st = self.lock();
            st.playing = true;
            st.speed
        };

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        self.animation = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + speed, speed);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let index = {
                    let mut st = state.lock().unwrap_or_else(|p| p.into_inner());
                    if st.count == 0 {
                        continue;
                    }
                    st.index = (st.index + 1) % st.count;
                    st.index
                };
                if events.send(PlaybackEvent::Shown { index }).is_err() {
                    break;
                }
            }
        }));
        debug!(speed_ms = speed.as_millis() as u64, "playback started");
        Ok(())
    }

    /// Stop the animation timer; the index stays where it is.
    pub fn pause(&mut self) {
        if let Some(handle) = self.animation.take() {
            handle.abort();
        }
        self.lock().playing = false;
    }

    /// Toggle between play and pause.
    pub fn toggle(&mut self) -> SkyloopResult<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Jump to `index` and pause.
    pub fn seek(&mut self, index: usize) -> SkyloopResult<()> {
        let count = self.count();
        if index >= count {
            return Err(SkyloopError::validation(format!(
                "seek index {index} out of range for {count} items"
            )));
        }
        self.pause();
        self.show(index);
        Ok(())
    }

    /// Step forward with wrap-around and pause.
    pub fn next(&mut self) {
        self.step(1);
    }

    /// Step backward with wrap-around and pause.
    pub fn prev(&mut self) {
        self.step(-1);
    }

    /// Change the step interval; a running animation restarts with the new pace.
    pub fn set_speed(&mut self, speed: Duration) -> SkyloopResult<()> {
        if speed.is_zero() {
            return Err(SkyloopError::validation("playback speed must be > 0"));
        }
        self.lock().speed = speed;
        if self.animation.is_some() {
            self.play()?;
        }
        Ok(())
    }

    /// Switch to the degraded single-image mode: stop animating and request a refresh of the
    /// latest image now and every `latest_refresh`.
    pub fn enter_latest_only(&mut self) {
        self.clear_timers();
        let period = self.latest_refresh;
        let events = self.events.clone();
        self.latest = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(PlaybackEvent::RefreshLatest).is_err() {
                    break;
                }
            }
        }));
        info!(refresh_secs = period.as_secs(), "entered latest-only mode");
    }

    /// Leave latest-only mode without starting the animation.
    pub fn exit_latest_only(&mut self) {
        if let Some(handle) = self.latest.take() {
            handle.abort();
        }
    }

    fn step(&mut self, delta: isize) {
        let count = self.count();
        if count == 0 {
            return;
        }
        self.pause();
        let current = self.index() as isize;
        let index = (current + delta).rem_euclid(count as isize) as usize;
        self.show(index);
    }

    fn show(&self, index: usize) {
        self.lock().index = index;
        let _ = self.events.send(PlaybackEvent::Shown { index });
    }

    fn clear_timers(&mut self) {
        self.pause();
        self.exit_latest_only();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.clear_timers();
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/controller.rs"]
mod tests;
