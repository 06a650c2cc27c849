//! Port traits for the viewer's external capabilities.
//!
//! These are the ONLY abstractions in the viewer. Ports exist for:
//! - The avatar renderer (could swap a webview canvas for a headless stage)
//! - The loaded model handle it hands back
//! - Speech synthesis (could swap the platform engine for a timed stand-in)

use std::sync::Arc;

use async_trait::async_trait;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("Failed to fetch model: {0}")]
    Fetch(String),
    #[error("Invalid model settings: {0}")]
    InvalidSettings(String),
    #[error("Motion not found: {group}[{index}]")]
    MotionNotFound { group: String, index: u32 },
    #[error("Expression not found: {0}")]
    ExpressionNotFound(String),
    #[error("Audio playback failed: {0}")]
    Audio(String),
    #[error("Renderer error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpeechError {
    #[error("SpeechSynthesis API not available")]
    Unavailable,
    /// The utterance was cancelled on purpose; never reported to the host.
    #[error("canceled")]
    Canceled,
    #[error("{0}")]
    Engine(String),
}

// =============================================================================
// Renderer Types
// =============================================================================

/// Drawable area in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Scale and top-left position applied to a model on the stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f64,
    pub x: f64,
    pub y: f64,
}

/// What the renderer reports about a freshly loaded model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub source_url: String,
    /// Unscaled width
    pub width: f64,
    /// Unscaled height
    pub height: f64,
    /// Motion group names in declaration order
    pub motion_groups: Vec<String>,
    /// Expression names in declaration order, duplicates kept
    pub expressions: Vec<String>,
}

// =============================================================================
// Renderer Ports
// =============================================================================

/// Handle to one loaded avatar model.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AvatarModel: Send + Sync {
    fn metadata(&self) -> ModelMetadata;

    /// Resolves when the clip has finished playing, not when it starts.
    async fn play_motion(&self, group: &str, index: u32, priority: u8)
        -> Result<(), RendererError>;

    /// An empty id clears the current expression.
    async fn set_expression(&self, expression_id: &str) -> Result<(), RendererError>;

    /// Mouth openness in `0.0..=1.0`.
    fn set_mouth_open(&self, value: f64);

    fn set_transform(&self, transform: Transform);

    /// Audio-driven mouth sync; resolves when the audio ends.
    async fn speak(&self, audio_url: &str) -> Result<(), RendererError>;

    /// Release renderer resources. The model must already be detached.
    fn dispose(&self);
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Renderer: Send + Sync {
    /// False when the renderer core failed to initialize.
    fn is_available(&self) -> bool;

    fn viewport(&self) -> Viewport;

    async fn load_from_url(&self, url: &str) -> Result<Arc<dyn AvatarModel>, RendererError>;

    /// Add the model to the render tree.
    fn attach(&self, model: &Arc<dyn AvatarModel>);

    /// Remove the model from the render tree.
    fn detach(&self, model: &Arc<dyn AvatarModel>);
}

// =============================================================================
// Speech Port
// =============================================================================

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Resolves when the utterance ends. A cancelled utterance resolves with
    /// `SpeechError::Canceled`.
    async fn speak(&self, text: &str, locale: &str) -> Result<(), SpeechError>;

    fn cancel(&self);
}
