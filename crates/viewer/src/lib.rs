//! Kanko Viewer - the avatar side of the bridge
//!
//! Runs inside the embedded view. Receives command envelopes from the host,
//! drives the avatar through the renderer port and reports back with events.
//!
//! ## Module Structure
//!
//! - `ports` - renderer, model and speech traits
//! - `model_manager` - single-model facade: load, fit, motion, expression
//! - `lip_sync` - mouth animation with generation-based cancellation
//! - `tts` - speech with simulated lip-sync
//! - `dispatcher` - command routing and result events
//! - `startup` - composition root and the `READY` handshake
//! - `headless` - renderer and speech adapters without graphics or audio

pub mod config;
pub mod dispatcher;
pub mod emitter;
pub mod headless;
pub mod lip_sync;
pub mod model_manager;
pub mod ports;
pub mod startup;
pub mod tts;

#[cfg(test)]
mod test_fixtures;

pub use config::{ConfigError, ViewerConfig, DEFAULT_MODEL_URL};
pub use dispatcher::GuestDispatcher;
pub use emitter::{EntryPoint, EventEmitter, HostPost};
pub use headless::{HeadlessModel, HeadlessRenderer, TimedSpeech};
pub use lip_sync::{LipSyncController, LipSyncError};
pub use model_manager::{LoadedModel, ModelError, ModelManager};
pub use ports::{
    AvatarModel, ModelMetadata, Renderer, RendererError, SpeechError, SpeechSynthesizer,
    Transform, Viewport,
};
pub use startup::ViewerApp;
pub use tts::TtsController;

#[cfg(any(test, feature = "testing"))]
pub use ports::{MockAvatarModel, MockRenderer, MockSpeechSynthesizer};
