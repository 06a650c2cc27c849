//! Headless adapters for the renderer and speech ports.
//!
//! `HeadlessRenderer` reads real `*.model3.json` settings (over HTTP or from
//! `file://` urls) but draws nothing: motions "play" for a fixed clip length
//! and parameter writes are only recorded. `TimedSpeech` "speaks" for the
//! estimated utterance length. Together they let the viewer run end to end
//! without a webview.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Notify;
use url::Url;

use crate::ports::{
    AvatarModel, ModelMetadata, Renderer, RendererError, SpeechError, SpeechSynthesizer,
    Transform, Viewport,
};
use crate::tts::estimate_duration;

/// Natural size used when the settings carry no `Layout`.
const DEFAULT_MODEL_WIDTH: f64 = 1000.0;
const DEFAULT_MODEL_HEIGHT: f64 = 1800.0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Model settings
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModelSettings {
    file_references: FileReferences,
    #[serde(default)]
    layout: Option<Layout>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileReferences {
    /// Group name to clip list; key order is declaration order
    #[serde(default)]
    motions: Map<String, Value>,
    #[serde(default)]
    expressions: Vec<ExpressionRef>,
}

#[derive(Debug, Deserialize)]
struct ExpressionRef {
    #[serde(rename = "Name", default)]
    pascal: Option<String>,
    #[serde(rename = "name", default)]
    lower: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Layout {
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
}

/// Parsed settings: metadata plus the clip count of each motion group.
fn parse_settings(url: &str, raw: &str) -> Result<(ModelMetadata, Vec<usize>), RendererError> {
    let settings: ModelSettings = serde_json::from_str(raw)
        .map_err(|e| RendererError::InvalidSettings(format!("{url}: {e}")))?;

    let (motion_groups, clip_counts): (Vec<String>, Vec<usize>) = settings
        .file_references
        .motions
        .iter()
        .map(|(group, clips)| (group.clone(), clips.as_array().map_or(0, Vec::len)))
        .unzip();

    let expressions = settings
        .file_references
        .expressions
        .into_iter()
        .map(|e| {
            e.pascal
                .or(e.lower)
                .unwrap_or_else(|| "unknown".to_string())
        })
        .collect();

    let layout = settings.layout;
    let width = layout
        .as_ref()
        .and_then(|l| l.width)
        .filter(|w| *w > 0.0)
        .unwrap_or(DEFAULT_MODEL_WIDTH);
    let height = layout
        .as_ref()
        .and_then(|l| l.height)
        .filter(|h| *h > 0.0)
        .unwrap_or(DEFAULT_MODEL_HEIGHT);

    Ok((
        ModelMetadata {
            source_url: url.to_string(),
            width,
            height,
            motion_groups,
            expressions,
        },
        clip_counts,
    ))
}

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Default)]
struct ModelParameters {
    mouth_open: f64,
    transform: Option<Transform>,
    expression: Option<String>,
    disposed: bool,
}

pub struct HeadlessModel {
    metadata: ModelMetadata,
    clip_counts: Vec<usize>,
    motion_clip: Duration,
    params: Mutex<ModelParameters>,
}

impl HeadlessModel {
    pub fn mouth_open(&self) -> f64 {
        lock(&self.params).mouth_open
    }

    pub fn transform(&self) -> Option<Transform> {
        lock(&self.params).transform
    }

    pub fn expression(&self) -> Option<String> {
        lock(&self.params).expression.clone()
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.params).disposed
    }

    fn ensure_live(&self) -> Result<(), RendererError> {
        if self.is_disposed() {
            return Err(RendererError::Other("model disposed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AvatarModel for HeadlessModel {
    fn metadata(&self) -> ModelMetadata {
        self.metadata.clone()
    }

    async fn play_motion(
        &self,
        group: &str,
        index: u32,
        priority: u8,
    ) -> Result<(), RendererError> {
        self.ensure_live()?;
        let clips = self
            .metadata
            .motion_groups
            .iter()
            .position(|g| g == group)
            .and_then(|i| self.clip_counts.get(i).copied());
        match clips {
            Some(count) if (index as usize) < count => {}
            _ => {
                return Err(RendererError::MotionNotFound {
                    group: group.to_string(),
                    index,
                })
            }
        }
        tracing::trace!(group, index, priority, "Playing motion");
        tokio::time::sleep(self.motion_clip).await;
        Ok(())
    }

    async fn set_expression(&self, expression_id: &str) -> Result<(), RendererError> {
        self.ensure_live()?;
        let mut params = lock(&self.params);
        if expression_id.is_empty() {
            params.expression = None;
            return Ok(());
        }
        if !self.metadata.expressions.iter().any(|e| e == expression_id) {
            return Err(RendererError::ExpressionNotFound(expression_id.to_string()));
        }
        params.expression = Some(expression_id.to_string());
        Ok(())
    }

    fn set_mouth_open(&self, value: f64) {
        lock(&self.params).mouth_open = value.clamp(0.0, 1.0);
    }

    fn set_transform(&self, transform: Transform) {
        lock(&self.params).transform = Some(transform);
    }

    async fn speak(&self, audio_url: &str) -> Result<(), RendererError> {
        Err(RendererError::Audio(format!(
            "no audio output in headless mode for {audio_url}"
        )))
    }

    fn dispose(&self) {
        lock(&self.params).disposed = true;
    }
}

// =============================================================================
// Renderer
// =============================================================================

pub struct HeadlessRenderer {
    client: reqwest::Client,
    viewport: Mutex<Viewport>,
    motion_clip: Duration,
    stage: Mutex<Vec<Arc<dyn AvatarModel>>>,
    loaded: Mutex<Vec<Weak<HeadlessModel>>>,
}

impl HeadlessRenderer {
    pub fn new(viewport: Viewport, motion_clip: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            viewport: Mutex::new(viewport),
            motion_clip,
            stage: Mutex::new(Vec::new()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *lock(&self.viewport) = viewport;
    }

    /// Source urls of the models currently on stage.
    pub fn staged(&self) -> Vec<String> {
        lock(&self.stage)
            .iter()
            .map(|m| m.metadata().source_url)
            .collect()
    }

    /// The model currently on stage, with its recorded parameters.
    pub fn staged_model(&self) -> Option<Arc<HeadlessModel>> {
        let staged = lock(&self.stage).first().cloned()?;
        let target = Arc::as_ptr(&staged) as *const ();
        lock(&self.loaded)
            .iter()
            .filter_map(Weak::upgrade)
            .find(|m| Arc::as_ptr(m) as *const () == target)
    }

    async fn fetch_settings(&self, url: &str) -> Result<String, RendererError> {
        let parsed =
            Url::parse(url).map_err(|e| RendererError::Fetch(format!("invalid url {url}: {e}")))?;

        match parsed.scheme() {
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| RendererError::Fetch(format!("invalid file url {url}")))?;
                tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| RendererError::Fetch(format!("{}: {e}", path.display())))
            }
            "http" | "https" => {
                let response = self
                    .client
                    .get(parsed)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| RendererError::Fetch(e.to_string()))?;
                response
                    .text()
                    .await
                    .map_err(|e| RendererError::Fetch(e.to_string()))
            }
            other => Err(RendererError::Fetch(format!("unsupported scheme {other}"))),
        }
    }
}

#[async_trait]
impl Renderer for HeadlessRenderer {
    fn is_available(&self) -> bool {
        true
    }

    fn viewport(&self) -> Viewport {
        *lock(&self.viewport)
    }

    async fn load_from_url(&self, url: &str) -> Result<Arc<dyn AvatarModel>, RendererError> {
        let raw = self.fetch_settings(url).await?;
        let (metadata, clip_counts) = parse_settings(url, &raw)?;
        tracing::debug!(
            model_url = %url,
            motion_groups = ?metadata.motion_groups,
            "Parsed model settings"
        );
        let model = Arc::new(HeadlessModel {
            metadata,
            clip_counts,
            motion_clip: self.motion_clip,
            params: Mutex::new(ModelParameters::default()),
        });
        {
            let mut loaded = lock(&self.loaded);
            loaded.retain(|m| m.strong_count() > 0);
            loaded.push(Arc::downgrade(&model));
        }
        Ok(model as Arc<dyn AvatarModel>)
    }

    fn attach(&self, model: &Arc<dyn AvatarModel>) {
        lock(&self.stage).push(model.clone());
    }

    fn detach(&self, model: &Arc<dyn AvatarModel>) {
        lock(&self.stage).retain(|m| !Arc::ptr_eq(m, model));
    }
}

// =============================================================================
// Speech
// =============================================================================

/// Speech engine that stays silent for the estimated utterance length.
#[derive(Default)]
pub struct TimedSpeech {
    cancelled: Notify,
}

impl TimedSpeech {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpeechSynthesizer for TimedSpeech {
    async fn speak(&self, text: &str, locale: &str) -> Result<(), SpeechError> {
        let lang = locale.split('-').next().unwrap_or(locale);
        let length = Duration::from_secs(u64::from(estimate_duration(text, lang)));
        tracing::debug!(locale, secs = length.as_secs(), "Speaking");

        tokio::select! {
            _ = tokio::time::sleep(length) => Ok(()),
            _ = self.cancelled.notified() => Err(SpeechError::Canceled),
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }
}
