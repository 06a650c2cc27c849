//! Viewer composition root and startup sequence.

use std::sync::Arc;

use kanko_shared::{Command, Event};

use crate::config::ViewerConfig;
use crate::dispatcher::GuestDispatcher;
use crate::emitter::{EntryPoint, EventEmitter};
use crate::lip_sync::LipSyncController;
use crate::model_manager::ModelManager;
use crate::ports::{Renderer, SpeechSynthesizer, Viewport};
use crate::tts::TtsController;

/// Reported when the renderer core is missing, before any model is tried.
pub const RENDERER_UNAVAILABLE: &str = "Renderer core failed to load";

/// All viewer components wired together.
pub struct ViewerApp {
    models: Arc<ModelManager>,
    lip_sync: Arc<LipSyncController>,
    tts: Arc<TtsController>,
    dispatcher: Arc<GuestDispatcher>,
    renderer: Arc<dyn Renderer>,
    emitter: EventEmitter,
    config: ViewerConfig,
}

impl ViewerApp {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        emitter: EventEmitter,
        config: ViewerConfig,
    ) -> Self {
        let models = Arc::new(ModelManager::new(renderer.clone(), config.clone()));
        let lip_sync = Arc::new(LipSyncController::new(
            models.clone(),
            emitter.clone(),
            &config,
        ));
        let tts = Arc::new(TtsController::new(speech, lip_sync.clone(), emitter.clone()));
        let dispatcher = Arc::new(GuestDispatcher::new(
            models.clone(),
            lip_sync.clone(),
            tts.clone(),
            emitter.clone(),
        ));

        Self {
            models,
            lip_sync,
            tts,
            dispatcher,
            renderer,
            emitter,
            config,
        }
    }

    /// Handler to register under `GUEST_ENTRY_POINT`.
    pub fn entry_point(&self) -> EntryPoint {
        let dispatcher = self.dispatcher.clone();
        Arc::new(move |raw: &str| {
            dispatcher.dispatch(raw);
        })
    }

    /// Announce readiness and load the configured model.
    ///
    /// The entry point must already be registered: the host may send
    /// commands as soon as it sees `READY`.
    pub async fn start(&self) {
        tracing::info!(model_url = %self.config.model_url, "Viewer starting");
        self.emitter.emit(Event::Ready);

        if !self.renderer.is_available() {
            tracing::error!("{RENDERER_UNAVAILABLE}");
            self.emitter.emit(Event::model_error(
                RENDERER_UNAVAILABLE,
                Some(self.config.model_url.clone()),
            ));
            return;
        }

        let load = self
            .dispatcher
            .dispatch_command(Command::set_model(self.config.model_url.clone()));
        if let Some(task) = load {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Initial model load task failed");
            }
        }
    }

    pub fn on_resize(&self, viewport: Viewport) {
        self.models.on_resize(viewport);
    }

    pub fn models(&self) -> &Arc<ModelManager> {
        &self.models
    }

    pub fn lip_sync(&self) -> &Arc<LipSyncController> {
        &self.lip_sync
    }

    pub fn tts(&self) -> &Arc<TtsController> {
        &self.tts
    }

    pub fn dispatcher(&self) -> &Arc<GuestDispatcher> {
        &self.dispatcher
    }
}
