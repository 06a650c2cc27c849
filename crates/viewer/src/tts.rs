//! Text-to-speech with simulated lip-sync.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use kanko_shared::{Event, TtsStartedPayload};
use tokio::task::JoinHandle;

use crate::emitter::EventEmitter;
use crate::lip_sync::LipSyncController;
use crate::ports::{SpeechError, SpeechSynthesizer};

/// Extra seconds of mouth movement beyond the estimate, in case the engine
/// speaks slower than expected. Speech end stops it anyway.
const LIP_SYNC_HEADROOM_SECS: f64 = 10.0;

/// BCP-47 locale for the host's short language code.
pub fn locale_for(lang: &str) -> &str {
    match lang {
        "ja" => "ja-JP",
        "en" => "en-US",
        "zh" => "zh-CN",
        other => other,
    }
}

/// Rough speaking rate in characters per second.
fn chars_per_second(lang: &str) -> usize {
    match lang {
        "ja" => 5,
        "en" => 15,
        "zh" => 4,
        _ => 10,
    }
}

/// Whole seconds the utterance is expected to take, never less than one.
pub fn estimate_duration(text: &str, lang: &str) -> u32 {
    let chars = text.chars().count();
    let secs = chars.div_ceil(chars_per_second(lang)).max(1);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[derive(Default)]
struct TtsState {
    generation: u64,
    speaking: bool,
    task: Option<JoinHandle<()>>,
}

pub struct TtsController {
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    lip_sync: Arc<LipSyncController>,
    emitter: EventEmitter,
    state: Mutex<TtsState>,
}

impl TtsController {
    /// `speech` is `None` on platforms without a speech engine.
    pub fn new(
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        lip_sync: Arc<LipSyncController>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            speech,
            lip_sync,
            emitter,
            state: Mutex::new(TtsState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TtsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_speaking(&self) -> bool {
        self.state().speaking
    }

    /// Speak `text`, replacing any current utterance.
    ///
    /// Emits `TTS_STARTED` right away and `TTS_FINISHED` or `TTS_ERROR` when
    /// the engine is done. Returns the estimated duration in seconds.
    pub fn speak(self: &Arc<Self>, text: &str, lang: &str) -> Result<u32, SpeechError> {
        self.stop();

        let Some(speech) = self.speech.clone() else {
            tracing::warn!("Speech synthesis unavailable");
            self.emitter
                .emit(Event::tts_error(SpeechError::Unavailable.to_string()));
            return Err(SpeechError::Unavailable);
        };

        let locale = locale_for(lang).to_string();
        let estimated_duration = estimate_duration(text, lang);
        let generation = {
            let mut state = self.state();
            state.speaking = true;
            state.generation
        };

        if let Err(e) = self
            .lip_sync
            .start_lip_sync(None, Some(f64::from(estimated_duration) + LIP_SYNC_HEADROOM_SECS))
        {
            tracing::debug!(error = %e, "Speaking without lip-sync");
        }

        tracing::info!(locale = %locale, estimated_duration, "TTS started");
        self.emitter
            .emit(Event::TtsStarted(TtsStartedPayload { estimated_duration }));

        let this = self.clone();
        let text = text.to_string();
        let task = tokio::spawn(async move {
            let result = speech.speak(&text, &locale).await;
            this.on_utterance_end(generation, result);
        });

        let mut state = self.state();
        if state.generation == generation && state.speaking {
            state.task = Some(task);
        }
        Ok(estimated_duration)
    }

    /// Cancel the current utterance. The engine's resulting cancellation
    /// error is swallowed; nothing is emitted.
    pub fn stop(&self) {
        let (task, was_speaking) = {
            let mut state = self.state();
            state.generation += 1;
            let was_speaking = std::mem::replace(&mut state.speaking, false);
            (state.task.take(), was_speaking)
        };
        if !was_speaking {
            return;
        }
        if let Some(speech) = &self.speech {
            speech.cancel();
        }
        if let Some(task) = task {
            task.abort();
        }
        self.lip_sync.stop_lip_sync();
        tracing::debug!("TTS stopped");
    }

    fn on_utterance_end(&self, generation: u64, result: Result<(), SpeechError>) {
        if let Err(SpeechError::Canceled) = result {
            tracing::debug!("Utterance canceled");
            return;
        }
        {
            let mut state = self.state();
            if state.generation != generation || !state.speaking {
                return;
            }
            state.speaking = false;
            state.task = None;
        }
        self.lip_sync.stop_lip_sync();

        match result {
            Ok(()) => {
                tracing::info!("TTS finished");
                self.emitter.emit(Event::TtsFinished);
            }
            Err(e) => {
                tracing::warn!(error = %e, "TTS failed");
                self.emitter.emit(Event::tts_error(e.to_string()));
            }
        }
    }
}
