//! Mouth animation, driven by audio or simulated.
//!
//! One activation at a time. Every activation gets a generation number and
//! every frame tick or timer checks it first, so a stopped activation can
//! never write to the model or emit `LIP_SYNC_FINISHED` later.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kanko_shared::Event;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ViewerConfig;
use crate::emitter::EventEmitter;
use crate::model_manager::ModelManager;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LipSyncError {
    #[error("No model loaded")]
    NoModelLoaded,
}

#[derive(Default)]
struct LipSyncState {
    generation: u64,
    active: bool,
    tasks: Vec<JoinHandle<()>>,
}

pub struct LipSyncController {
    models: Arc<ModelManager>,
    emitter: EventEmitter,
    frame_interval: Duration,
    default_duration: Duration,
    safety_margin: Duration,
    state: Mutex<LipSyncState>,
}

impl LipSyncController {
    pub fn new(models: Arc<ModelManager>, emitter: EventEmitter, config: &ViewerConfig) -> Self {
        Self {
            models,
            emitter,
            frame_interval: config.frame_interval,
            default_duration: config.lip_sync_default,
            safety_margin: config.lip_sync_safety_margin,
            state: Mutex::new(LipSyncState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, LipSyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    /// Start a new activation, replacing any running one.
    ///
    /// With an audio url the model's own audio sync runs until the audio
    /// ends; otherwise the mouth is animated for `duration_secs` (default
    /// from config). Without a model, `LIP_SYNC_FINISHED` is emitted at once
    /// so the host is never left waiting.
    pub fn start_lip_sync(
        self: &Arc<Self>,
        audio_url: Option<&str>,
        duration_secs: Option<f64>,
    ) -> Result<(), LipSyncError> {
        let model = self.models.current_model();
        // Retire the previous activation and claim the next generation in one step.
        let (generation, previous) = {
            let mut state = self.state();
            state.generation += 1;
            state.active = model.is_some();
            (state.generation, std::mem::take(&mut state.tasks))
        };
        for task in previous {
            task.abort();
        }

        let Some(model) = model else {
            tracing::warn!("Lip-sync requested without a model");
            self.emitter.emit(Event::LipSyncFinished);
            return Err(LipSyncError::NoModelLoaded);
        };
        model.set_mouth_open(0.0);

        let mut tasks = Vec::with_capacity(2);
        match audio_url {
            Some(url) => {
                tracing::debug!(audio_url = %url, "Starting audio lip-sync");
                let this = self.clone();
                let url = url.to_string();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = model.speak(&url).await {
                        tracing::warn!(audio_url = %url, error = %e, "Audio lip-sync failed");
                    }
                    this.finish(generation);
                }));
            }
            None => {
                let duration = duration_secs
                    .filter(|secs| secs.is_finite() && *secs > 0.0)
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                    .unwrap_or(self.default_duration);
                tracing::debug!(
                    duration_ms = duration.as_millis() as u64,
                    "Starting simulated lip-sync"
                );

                let this = self.clone();
                tasks.push(tokio::spawn(async move {
                    this.run_frames(generation, duration).await;
                }));

                let this = self.clone();
                let deadline = duration + self.safety_margin;
                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(deadline).await;
                    this.finish(generation);
                }));
            }
        }

        let mut state = self.state();
        if state.generation == generation {
            state.tasks.extend(tasks);
        } else {
            // Superseded while spawning.
            drop(state);
            for task in tasks {
                task.abort();
            }
        }
        Ok(())
    }

    /// Cancel the running activation without emitting anything.
    pub fn stop_lip_sync(&self) {
        let (tasks, was_active) = {
            let mut state = self.state();
            state.generation += 1;
            let was_active = std::mem::replace(&mut state.active, false);
            (std::mem::take(&mut state.tasks), was_active)
        };
        for task in tasks {
            task.abort();
        }
        if let Some(model) = self.models.current_model() {
            model.set_mouth_open(0.0);
        }
        if was_active {
            tracing::debug!("Lip-sync stopped");
        }
    }

    async fn run_frames(&self, generation: u64, duration: Duration) {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let elapsed = started.elapsed();

            // Check and write under the lock so a concurrent stop cannot be
            // followed by a stale frame.
            let done = {
                let state = self.state();
                if state.generation != generation || !state.active {
                    return;
                }
                match self.models.current_model() {
                    None => true,
                    Some(model) if elapsed >= duration => {
                        model.set_mouth_open(0.0);
                        true
                    }
                    Some(model) => {
                        model.set_mouth_open(mouth_openness(elapsed));
                        false
                    }
                }
            };

            if done {
                self.finish(generation);
                return;
            }
        }
    }

    /// Idempotent end of activation `generation`; emits at most once.
    fn finish(&self, generation: u64) {
        let tasks = {
            let mut state = self.state();
            if state.generation != generation || !state.active {
                return;
            }
            state.active = false;
            std::mem::take(&mut state.tasks)
        };
        if let Some(model) = self.models.current_model() {
            model.set_mouth_open(0.0);
        }
        for task in tasks {
            task.abort();
        }
        tracing::debug!("Lip-sync finished");
        self.emitter.emit(Event::LipSyncFinished);
    }
}

/// Simulated mouth openness at `elapsed` into an activation, in `0.0..=1.0`.
pub fn mouth_openness(elapsed: Duration) -> f64 {
    let ms = elapsed.as_secs_f64() * 1000.0;
    let frequency = 6.0 + 2.0 * (ms * 0.003).sin();
    (ms / 1000.0 * frequency * PI).sin().abs()
}
