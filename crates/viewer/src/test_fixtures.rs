//! Recording fakes for the viewer ports.
//!
//! Mocks cannot easily assert ordering across several objects, so these
//! fakes append every lifecycle call to one shared log.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kanko_shared::{Codec, Event};

use crate::emitter::EventEmitter;
use crate::ports::{AvatarModel, ModelMetadata, Renderer, RendererError, Transform, Viewport};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn push(log: &CallLog, entry: String) {
    log.lock().expect("log lock").push(entry);
}

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().expect("log lock").clone()
}

// =============================================================================
// Model
// =============================================================================

pub struct FakeModel {
    pub metadata: ModelMetadata,
    log: CallLog,
    motion_clip: Duration,
    pub mouth: Mutex<Vec<f64>>,
    pub transforms: Mutex<Vec<Transform>>,
    pub motions: Mutex<Vec<(String, u32, u8)>>,
    pub expressions_set: Mutex<Vec<String>>,
    speak_duration: Duration,
}

impl FakeModel {
    pub fn new(url: &str, log: CallLog) -> Self {
        Self {
            metadata: ModelMetadata {
                source_url: url.to_string(),
                width: 1000.0,
                height: 2000.0,
                motion_groups: vec!["Idle".to_string(), "TapBody".to_string()],
                expressions: vec!["f01".to_string(), "f02".to_string(), "f01".to_string()],
            },
            log,
            motion_clip: Duration::from_millis(500),
            mouth: Mutex::new(Vec::new()),
            transforms: Mutex::new(Vec::new()),
            motions: Mutex::new(Vec::new()),
            expressions_set: Mutex::new(Vec::new()),
            speak_duration: Duration::from_secs(1),
        }
    }

    pub fn last_mouth(&self) -> Option<f64> {
        self.mouth.lock().expect("mouth lock").last().copied()
    }

    pub fn mouth_writes(&self) -> usize {
        self.mouth.lock().expect("mouth lock").len()
    }

    pub fn last_transform(&self) -> Option<Transform> {
        self.transforms
            .lock()
            .expect("transform lock")
            .last()
            .copied()
    }
}

#[async_trait]
impl AvatarModel for FakeModel {
    fn metadata(&self) -> ModelMetadata {
        self.metadata.clone()
    }

    async fn play_motion(
        &self,
        group: &str,
        index: u32,
        priority: u8,
    ) -> Result<(), RendererError> {
        if !self.metadata.motion_groups.iter().any(|g| g == group) {
            return Err(RendererError::MotionNotFound {
                group: group.to_string(),
                index,
            });
        }
        self.motions
            .lock()
            .expect("motions lock")
            .push((group.to_string(), index, priority));
        tokio::time::sleep(self.motion_clip).await;
        Ok(())
    }

    async fn set_expression(&self, expression_id: &str) -> Result<(), RendererError> {
        let known = self.metadata.expressions.iter().any(|e| e == expression_id);
        if !expression_id.is_empty() && !known {
            return Err(RendererError::ExpressionNotFound(expression_id.to_string()));
        }
        self.expressions_set
            .lock()
            .expect("expressions lock")
            .push(expression_id.to_string());
        Ok(())
    }

    fn set_mouth_open(&self, value: f64) {
        self.mouth.lock().expect("mouth lock").push(value);
    }

    fn set_transform(&self, transform: Transform) {
        self.transforms
            .lock()
            .expect("transform lock")
            .push(transform);
    }

    async fn speak(&self, audio_url: &str) -> Result<(), RendererError> {
        push(&self.log, format!("speak:{audio_url}"));
        tokio::time::sleep(self.speak_duration).await;
        Ok(())
    }

    fn dispose(&self) {
        push(&self.log, format!("dispose:{}", self.metadata.source_url));
    }
}

// =============================================================================
// Renderer
// =============================================================================

pub struct FakeRenderer {
    pub log: CallLog,
    pub available: bool,
    pub viewport: Mutex<Viewport>,
    /// Per-url load latency
    pub load_delays: Mutex<HashMap<String, Duration>>,
    pub failing_urls: Mutex<Vec<String>>,
    pub attached: Mutex<Vec<Arc<dyn AvatarModel>>>,
    pub loaded: Mutex<Vec<Arc<FakeModel>>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            available: true,
            viewport: Mutex::new(Viewport::new(400.0, 600.0)),
            load_delays: Mutex::new(HashMap::new()),
            failing_urls: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
            loaded: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn delay(&self, url: &str, delay: Duration) {
        self.load_delays
            .lock()
            .expect("delays lock")
            .insert(url.to_string(), delay);
    }

    pub fn fail(&self, url: &str) {
        self.failing_urls
            .lock()
            .expect("fail lock")
            .push(url.to_string());
    }

    pub fn attached_count(&self) -> usize {
        self.attached.lock().expect("attached lock").len()
    }

    /// Most recently loaded model, attached or not.
    pub fn last_loaded(&self) -> Option<Arc<FakeModel>> {
        self.loaded.lock().expect("loaded lock").last().cloned()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn viewport(&self) -> Viewport {
        *self.viewport.lock().expect("viewport lock")
    }

    async fn load_from_url(&self, url: &str) -> Result<Arc<dyn AvatarModel>, RendererError> {
        let delay = self
            .load_delays
            .lock()
            .expect("delays lock")
            .get(url)
            .copied()
            .unwrap_or(Duration::from_millis(10));
        tokio::time::sleep(delay).await;

        if self.failing_urls.lock().expect("fail lock").iter().any(|u| u == url) {
            return Err(RendererError::Fetch(format!("404 for {url}")));
        }
        let model = Arc::new(FakeModel::new(url, self.log.clone()));
        self.loaded.lock().expect("loaded lock").push(model.clone());
        push(&self.log, format!("loaded:{url}"));
        Ok(model)
    }

    fn attach(&self, model: &Arc<dyn AvatarModel>) {
        let mut attached = self.attached.lock().expect("attached lock");
        attached.push(model.clone());
        assert!(attached.len() <= 1, "more than one model attached");
        push(&self.log, format!("attach:{}", model.metadata().source_url));
    }

    fn detach(&self, model: &Arc<dyn AvatarModel>) {
        self.attached
            .lock()
            .expect("attached lock")
            .retain(|m| !Arc::ptr_eq(m, model));
        push(&self.log, format!("detach:{}", model.metadata().source_url));
    }
}

// =============================================================================
// Host side
// =============================================================================

/// Emitter whose posted events are decoded into a shared list.
pub fn recording_emitter() -> (EventEmitter, Arc<Mutex<Vec<Event>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let emitter = EventEmitter::new(
        Codec::system(),
        Arc::new(move |json: String| {
            let event = Codec::decode(&json)
                .expect("viewer posts valid envelopes")
                .into_event()
                .expect("viewer posts events");
            sink.lock().expect("events lock").push(event);
        }),
    );
    (emitter, events)
}

pub fn recorded(events: &Arc<Mutex<Vec<Event>>>) -> Vec<Event> {
    events.lock().expect("events lock").clone()
}

/// Let spawned tasks run without advancing the paused clock.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
