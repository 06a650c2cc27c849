//! Audio-guide playback with avatar lip-sync.
//!
//! Playback is simulated with a 100 ms progress ticker; the viewer gets
//! `START_LIP_SYNC` when playback (re)starts and `STOP_LIP_SYNC` whenever it
//! stops for any reason, including the player being dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use kanko_shared::{Command, Event};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::bridge::HostBridge;
use crate::context::{use_bridge, BridgeError};
use crate::event_bus::Subscription;

/// Length assumed when the guide does not state one.
pub const PLACEHOLDER_DURATION_SECS: f64 = 10.0;

/// Progress update interval.
pub const PROGRESS_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    /// `0.0..=1.0`
    pub progress: f64,
}

#[derive(Default)]
struct Ticker {
    generation: u64,
    elapsed: Duration,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    bridge: Arc<HostBridge>,
    audio_url: String,
    duration: Duration,
    ticker: Mutex<Ticker>,
    snapshot: watch::Sender<PlaybackSnapshot>,
}

pub struct AudioGuidePlayer {
    shared: Arc<Shared>,
    _events: Subscription,
}

impl AudioGuidePlayer {
    /// Player for `audio_url` lasting `duration_secs`, or the placeholder
    /// length if that is missing or not positive.
    ///
    /// Subscribes to the bridge so speech events end playback; the
    /// subscription ends with the player.
    pub fn new(
        bridge: Arc<HostBridge>,
        audio_url: impl Into<String>,
        duration_secs: Option<f64>,
    ) -> Self {
        let duration = duration_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::from_secs_f64(PLACEHOLDER_DURATION_SECS));
        let (snapshot, _) = watch::channel(PlaybackSnapshot::default());

        let shared = Arc::new(Shared {
            bridge: bridge.clone(),
            audio_url: audio_url.into(),
            duration,
            ticker: Mutex::new(Ticker::default()),
            snapshot,
        });

        let weak = Arc::downgrade(&shared);
        let events = bridge.subscribe(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_event(event);
            }
        });

        Self {
            shared,
            _events: events,
        }
    }

    /// Player bound to the bridge of the enclosing `BridgeProvider` scope.
    pub fn from_context(
        audio_url: impl Into<String>,
        duration_secs: Option<f64>,
    ) -> Result<Self, BridgeError> {
        let ctx = use_bridge()?;
        Ok(Self::new(ctx.bridge().clone(), audio_url, duration_secs))
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        *self.shared.snapshot.borrow()
    }

    pub fn state(&self) -> PlaybackState {
        self.snapshot().state
    }

    pub fn watch(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.snapshot.subscribe()
    }

    pub fn duration(&self) -> Duration {
        self.shared.duration
    }

    /// `m:ss / m:ss` progress label.
    pub fn time_label(&self) -> String {
        let total = self.shared.duration.as_secs_f64();
        let current = (self.snapshot().progress * total).floor();
        format!("{} / {}", format_time(current), format_time(total))
    }

    /// Start from the beginning, or resume if paused.
    pub fn play(&self) {
        Shared::play(&self.shared);
    }

    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn toggle(&self) {
        if self.state() == PlaybackState::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// React to a viewer event. Called automatically for events the bridge
    /// receives.
    pub fn on_event(&self, event: &Event) {
        self.shared.on_event(event);
    }
}

impl Drop for AudioGuidePlayer {
    fn drop(&mut self) {
        self.shared.stop_ticker();
        self.shared.bridge.send_command(Command::StopLipSync);
    }
}

impl Shared {
    fn ticker(&self) -> MutexGuard<'_, Ticker> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> PlaybackState {
        self.snapshot.borrow().state
    }

    fn set(&self, state: PlaybackState, progress: f64) {
        self.snapshot.send_replace(PlaybackSnapshot { state, progress });
    }

    fn play(this: &Arc<Self>) {
        let progress = match this.state() {
            PlaybackState::Playing => return,
            PlaybackState::Idle | PlaybackState::Completed => {
                this.ticker().elapsed = Duration::ZERO;
                0.0
            }
            PlaybackState::Paused => this.snapshot.borrow().progress,
        };

        this.set(PlaybackState::Playing, progress);
        tracing::debug!(audio_url = %this.audio_url, progress, "Audio guide playing");
        // No track means simulated mouth movement for the guide's length.
        let audio_url = Some(this.audio_url.clone()).filter(|url| !url.is_empty());
        this.bridge.send_command(Command::start_lip_sync(
            audio_url,
            Some(this.duration.as_secs_f64()),
        ));
        Self::start_ticker(this);
    }

    fn pause(&self) {
        if self.state() != PlaybackState::Playing {
            return;
        }
        self.stop_ticker();
        let progress = self.snapshot.borrow().progress;
        self.set(PlaybackState::Paused, progress);
        tracing::debug!(progress, "Audio guide paused");
        self.bridge.send_command(Command::StopLipSync);
    }

    fn complete(&self) {
        self.stop_ticker();
        self.set(PlaybackState::Completed, 1.0);
        tracing::debug!(audio_url = %self.audio_url, "Audio guide completed");
        self.bridge.send_command(Command::StopLipSync);
    }

    fn on_event(&self, event: &Event) {
        match event {
            Event::TtsFinished => {
                if matches!(self.state(), PlaybackState::Playing | PlaybackState::Paused) {
                    self.complete();
                }
            }
            Event::TtsError(payload) => {
                tracing::warn!(error = %payload.error, "Speech failed, resetting audio guide");
                self.stop_ticker();
                self.ticker().elapsed = Duration::ZERO;
                self.set(PlaybackState::Idle, 0.0);
                self.bridge.send_command(Command::StopLipSync);
            }
            _ => {}
        }
    }

    fn start_ticker(this: &Arc<Self>) {
        let mut ticker = this.ticker();
        ticker.generation += 1;
        let generation = ticker.generation;
        if let Some(task) = ticker.task.take() {
            task.abort();
        }

        let weak: Weak<Self> = Arc::downgrade(this);
        ticker.task = Some(tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + PROGRESS_TICK, PROGRESS_TICK);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.advance(generation) {
                    return;
                }
            }
        }));
    }

    /// One progress tick. Returns `false` once the ticker should end.
    fn advance(&self, generation: u64) -> bool {
        let progress = {
            let mut ticker = self.ticker();
            if ticker.generation != generation {
                return false;
            }
            ticker.elapsed += PROGRESS_TICK;
            let fraction = ticker.elapsed.as_secs_f64() / self.duration.as_secs_f64();
            fraction.min(1.0)
        };

        if progress >= 1.0 {
            self.complete();
            return false;
        }
        self.set(PlaybackState::Playing, progress);
        true
    }

    fn stop_ticker(&self) {
        let mut ticker = self.ticker();
        ticker.generation += 1;
        if let Some(task) = ticker.task.take() {
            task.abort();
        }
    }
}

/// `m:ss`, seconds truncated.
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
