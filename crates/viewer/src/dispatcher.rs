//! Guest-side command dispatch.
//!
//! `dispatch` is what the host calls through `GUEST_ENTRY_POINT`. Commands
//! that await the renderer run as their own task so a slow model load never
//! holds up a later `PLAY_MOTION` or `STOP_TTS`. Lip-sync and TTS commands
//! only start or cancel background work, so they run inline and keep their
//! relative order.

use std::sync::Arc;

use kanko_shared::{
    preview, Codec, Command, Event, ExpressionErrorPayload, Message, ModelLoadedPayload,
    MotionErrorPayload, MotionPayload, PlayMotionPayload,
};
use tokio::task::JoinHandle;

use crate::emitter::EventEmitter;
use crate::lip_sync::LipSyncController;
use crate::model_manager::{ModelError, ModelManager};
use crate::tts::TtsController;

pub struct GuestDispatcher {
    models: Arc<ModelManager>,
    lip_sync: Arc<LipSyncController>,
    tts: Arc<TtsController>,
    emitter: EventEmitter,
}

impl GuestDispatcher {
    pub fn new(
        models: Arc<ModelManager>,
        lip_sync: Arc<LipSyncController>,
        tts: Arc<TtsController>,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            models,
            lip_sync,
            tts,
            emitter,
        }
    }

    /// Handle one raw envelope from the host.
    ///
    /// Returns the handler task for commands that run in the background.
    pub fn dispatch(self: &Arc<Self>, raw: &str) -> Option<JoinHandle<()>> {
        let envelope = match Codec::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, preview = %preview(raw), "Ignoring unparseable command");
                return None;
            }
        };

        match envelope.message {
            Message::Command(command) => {
                tracing::debug!(id = %envelope.id, command = %command.tag(), "Dispatching command");
                self.dispatch_command(command)
            }
            Message::Event(event) => {
                tracing::debug!(event = %event.tag(), "Ignoring event envelope sent to viewer");
                None
            }
        }
    }

    pub fn dispatch_command(self: &Arc<Self>, command: Command) -> Option<JoinHandle<()>> {
        match command {
            Command::SetModel(payload) => {
                let this = self.clone();
                Some(tokio::spawn(async move {
                    this.set_model(payload.model_url).await;
                }))
            }
            Command::PlayMotion(payload) => {
                let this = self.clone();
                Some(tokio::spawn(async move {
                    this.play_motion(payload).await;
                }))
            }
            Command::SetExpression(payload) => {
                let this = self.clone();
                Some(tokio::spawn(async move {
                    this.set_expression(payload.expression_id).await;
                }))
            }
            Command::StartLipSync(payload) => {
                if let Err(e) = self
                    .lip_sync
                    .start_lip_sync(payload.audio_url.as_deref(), payload.duration)
                {
                    tracing::debug!(error = %e, "Lip-sync not started");
                }
                None
            }
            Command::StopLipSync => {
                self.lip_sync.stop_lip_sync();
                None
            }
            Command::StartTts(payload) => {
                if let Err(e) = self.tts.speak(&payload.text, &payload.lang) {
                    tracing::debug!(error = %e, "TTS not started");
                }
                None
            }
            Command::StopTts => {
                self.tts.stop();
                None
            }
            Command::Unknown(tag) => {
                tracing::warn!(command = %tag, "Unknown command type");
                None
            }
        }
    }

    async fn set_model(&self, model_url: String) {
        match self.models.load_model(&model_url).await {
            Ok(loaded) => self.emitter.emit(Event::ModelLoaded(ModelLoadedPayload {
                model_url: loaded.model_url,
                motion_groups: loaded.motion_groups,
                expressions: loaded.expressions,
            })),
            Err(ModelError::Superseded { url }) => {
                tracing::debug!(model_url = %url, "Superseded load reports nothing");
            }
            Err(e) => {
                tracing::error!(model_url = %model_url, error = %e, "Failed to load model");
                let message = match e {
                    ModelError::Load { source, .. } => source.to_string(),
                    other => other.to_string(),
                };
                self.emitter
                    .emit(Event::model_error(message, Some(model_url)));
            }
        }
    }

    async fn play_motion(&self, payload: PlayMotionPayload) {
        let index = payload.index_or_default();
        let priority = payload.priority_or_default();
        let group = payload.group;

        match self.models.play_motion(&group, index, priority).await {
            Ok(()) => self
                .emitter
                .emit(Event::MotionFinished(MotionPayload { group, index })),
            Err(e) => {
                tracing::warn!(group = %group, index, error = %e, "Motion failed");
                self.emitter.emit(Event::MotionError(MotionErrorPayload {
                    error: e.to_string(),
                    group,
                    index,
                }));
            }
        }
    }

    async fn set_expression(&self, expression_id: String) {
        if let Err(e) = self.models.set_expression(&expression_id).await {
            tracing::warn!(expression_id = %expression_id, error = %e, "Expression failed");
            self.emitter
                .emit(Event::ExpressionError(ExpressionErrorPayload {
                    error: e.to_string(),
                    expression_id,
                }));
        }
    }
}
