//! Avatar control facade.
//!
//! Owns the single attached model. Loading a replacement detaches and
//! disposes the old one before the new load is even awaited, so at most one
//! model is ever attached.
//!
//! Overlapping loads are resolved with a generation counter: a load that
//! finishes after a newer one started disposes its result and reports
//! `ModelError::Superseded`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ViewerConfig;
use crate::ports::{AvatarModel, Renderer, RendererError, Transform, Viewport};

/// Priority of the automatic idle motion, below the host's default.
pub const IDLE_MOTION_PRIORITY: u8 = 1;

/// Share of the viewport height the model may take.
const HEIGHT_FILL: f64 = 0.8;
/// Share of the viewport width the model may take.
const WIDTH_FILL: f64 = 0.9;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("No model loaded")]
    NoModelLoaded,
    #[error("Failed to load model {url}: {source}")]
    Load { url: String, source: RendererError },
    #[error("Load of {url} was superseded by a newer load")]
    Superseded { url: String },
    #[error(transparent)]
    Renderer(#[from] RendererError),
}

/// Names reported back to the host after a successful load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModel {
    pub model_url: String,
    pub motion_groups: Vec<String>,
    pub expressions: Vec<String>,
}

#[derive(Default)]
struct ModelState {
    current: Option<Arc<dyn AvatarModel>>,
    current_url: Option<String>,
    load_generation: u64,
}

pub struct ModelManager {
    renderer: Arc<dyn Renderer>,
    config: ViewerConfig,
    state: Mutex<ModelState>,
}

impl ModelManager {
    pub fn new(renderer: Arc<dyn Renderer>, config: ViewerConfig) -> Self {
        Self {
            renderer,
            config,
            state: Mutex::new(ModelState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ModelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current model with the one at `url`.
    pub async fn load_model(self: &Arc<Self>, url: &str) -> Result<LoadedModel, ModelError> {
        let generation = {
            let mut state = self.state();
            if let Some(previous) = state.current.take() {
                self.renderer.detach(&previous);
                previous.dispose();
                tracing::debug!(
                    model_url = state.current_url.as_deref().unwrap_or_default(),
                    "Disposed previous model"
                );
            }
            state.current_url = None;
            state.load_generation += 1;
            state.load_generation
        };

        tracing::info!(model_url = %url, "Loading model");
        let result = self.renderer.load_from_url(url).await;

        let model = {
            let mut state = self.state();
            if state.load_generation != generation {
                drop(state);
                if let Ok(stale) = result {
                    stale.dispose();
                }
                tracing::debug!(model_url = %url, "Model load superseded, result discarded");
                return Err(ModelError::Superseded {
                    url: url.to_string(),
                });
            }
            let model = result.map_err(|source| ModelError::Load {
                url: url.to_string(),
                source,
            })?;
            self.renderer.attach(&model);
            state.current = Some(model.clone());
            state.current_url = Some(url.to_string());
            model
        };

        self.fit_model();

        let metadata = model.metadata();
        if let Some(group) = idle_group(&metadata.motion_groups) {
            let idle_model = model.clone();
            let group = group.to_string();
            tokio::spawn(async move {
                if let Err(e) = idle_model
                    .play_motion(&group, 0, IDLE_MOTION_PRIORITY)
                    .await
                {
                    tracing::debug!(group = %group, error = %e, "Idle motion did not play");
                }
            });
        }

        let manager = Arc::downgrade(self);
        let delay = self.config.relayout_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                if manager.state().load_generation == generation {
                    manager.fit_model();
                }
            }
        });

        tracing::info!(
            model_url = %url,
            motion_groups = metadata.motion_groups.len(),
            expressions = metadata.expressions.len(),
            "Model loaded"
        );

        Ok(LoadedModel {
            model_url: url.to_string(),
            motion_groups: metadata.motion_groups,
            expressions: metadata.expressions,
        })
    }

    /// Play a clip on the current model. Resolves when the clip completes.
    pub async fn play_motion(
        &self,
        group: &str,
        index: u32,
        priority: u8,
    ) -> Result<(), ModelError> {
        let model = self.current_model().ok_or(ModelError::NoModelLoaded)?;
        model.play_motion(group, index, priority).await?;
        Ok(())
    }

    /// Apply a named expression; `""` resets to the default face.
    pub async fn set_expression(&self, expression_id: &str) -> Result<(), ModelError> {
        let model = self.current_model().ok_or(ModelError::NoModelLoaded)?;
        model.set_expression(expression_id).await?;
        Ok(())
    }

    /// Scale and position the current model to the renderer's viewport.
    pub fn fit_model(&self) {
        self.fit_to(self.renderer.viewport());
    }

    /// Refit after the host resized the viewer.
    pub fn on_resize(&self, viewport: Viewport) {
        tracing::trace!(width = viewport.width, height = viewport.height, "Viewport resized");
        self.fit_to(viewport);
    }

    fn fit_to(&self, viewport: Viewport) {
        let Some(model) = self.current_model() else {
            return;
        };
        let viewport = if viewport.is_empty() {
            self.config.fallback_viewport
        } else {
            viewport
        };
        let metadata = model.metadata();
        if let Some(transform) = fit_transform(viewport, metadata.width, metadata.height) {
            model.set_transform(transform);
        }
    }

    pub fn current_model(&self) -> Option<Arc<dyn AvatarModel>> {
        self.state().current.clone()
    }

    pub fn model_url(&self) -> Option<String> {
        self.state().current_url.clone()
    }

    pub fn motion_groups(&self) -> Vec<String> {
        self.current_model()
            .map(|m| m.metadata().motion_groups)
            .unwrap_or_default()
    }

    pub fn expressions(&self) -> Vec<String> {
        self.current_model()
            .map(|m| m.metadata().expressions)
            .unwrap_or_default()
    }
}

/// First group whose name mentions idle or standby.
pub fn idle_group(groups: &[String]) -> Option<&str> {
    groups
        .iter()
        .find(|g| {
            let lower = g.to_lowercase();
            lower.contains("idle") || lower.contains("standby")
        })
        .map(String::as_str)
}

/// Fit a `width`×`height` model to the bottom centre of `viewport`.
///
/// Returns `None` for a degenerate model size.
pub fn fit_transform(viewport: Viewport, width: f64, height: f64) -> Option<Transform> {
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    let scale = (HEIGHT_FILL * viewport.height / height).min(WIDTH_FILL * viewport.width / width);
    Some(Transform {
        scale,
        x: (viewport.width - width * scale) / 2.0,
        y: viewport.height - height * scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{MockAvatarModel, MockRenderer, ModelMetadata};
    use crate::test_fixtures::{entries, settle, FakeRenderer};
    use std::time::Duration;

    const A: &str = "https://cdn/a.model3.json";
    const B: &str = "https://cdn/b.model3.json";
    const C: &str = "https://cdn/c.model3.json";

    fn manager() -> (Arc<ModelManager>, Arc<FakeRenderer>) {
        let renderer = Arc::new(FakeRenderer::new());
        let manager = Arc::new(ModelManager::new(renderer.clone(), ViewerConfig::default()));
        (manager, renderer)
    }

    #[test]
    fn test_fit_transform_bottom_centre() {
        let t = fit_transform(Viewport::new(400.0, 600.0), 1000.0, 2000.0).expect("fits");
        // height bound: 0.8*600/2000 = 0.24, width bound: 0.9*400/1000 = 0.36
        assert!((t.scale - 0.24).abs() < 1e-9);
        assert!((t.x - 80.0).abs() < 1e-9);
        assert!((t.y - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_transform_rejects_degenerate_model() {
        assert!(fit_transform(Viewport::new(400.0, 600.0), 0.0, 10.0).is_none());
    }

    #[test]
    fn test_idle_group_matches_case_insensitively() {
        let groups = vec!["TapBody".to_string(), "STANDBY_loop".to_string()];
        assert_eq!(idle_group(&groups), Some("STANDBY_loop"));
        assert_eq!(idle_group(&["Tap".to_string()]), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_attaches_fits_and_plays_idle() {
        let (manager, renderer) = manager();

        let loaded = manager.load_model(A).await.expect("load");
        settle().await;

        assert_eq!(loaded.motion_groups, vec!["Idle", "TapBody"]);
        assert_eq!(loaded.expressions, vec!["f01", "f02", "f01"]);
        assert_eq!(manager.model_url().as_deref(), Some(A));
        assert_eq!(renderer.attached_count(), 1);

        let model = renderer.last_loaded().expect("model");
        assert!(model.last_transform().is_some());
        let motions = model.motions.lock().expect("lock").clone();
        assert_eq!(motions, vec![("Idle".to_string(), 0, IDLE_MOTION_PRIORITY)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relayout_refits_after_delay() {
        let (manager, renderer) = manager();
        manager.load_model(A).await.expect("load");
        let model = renderer.last_loaded().expect("model");
        let before = model.transforms.lock().expect("lock").len();

        *renderer.viewport.lock().expect("lock") = Viewport::new(800.0, 600.0);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(model.transforms.lock().expect("lock").len(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_viewport_uses_fallback() {
        let (manager, renderer) = manager();
        *renderer.viewport.lock().expect("lock") = Viewport::new(0.0, 0.0);
        manager.load_model(A).await.expect("load");

        let expected = fit_transform(Viewport::new(375.0, 300.0), 1000.0, 2000.0);
        let model = renderer.last_loaded().expect("model");
        assert_eq!(model.last_transform(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replacement_disposes_before_next_attach() {
        let (manager, renderer) = manager();
        manager.load_model(A).await.expect("load a");
        manager.load_model(B).await.expect("load b");

        let log = entries(&renderer.log);
        let at = |entry: String| log.iter().position(|e| *e == entry).expect("logged");
        let detach_a = at(format!("detach:{A}"));
        let dispose_a = at(format!("dispose:{A}"));
        let attach_b = at(format!("attach:{B}"));
        assert!(detach_a < dispose_a && dispose_a < attach_b);
        assert_eq!(renderer.attached_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_loads_keep_only_the_newest() {
        let (manager, renderer) = manager();
        renderer.delay(A, Duration::from_millis(300));
        renderer.delay(B, Duration::from_millis(200));
        renderer.delay(C, Duration::from_millis(100));

        let (a, b, c) = tokio::join!(
            manager.load_model(A),
            manager.load_model(B),
            manager.load_model(C)
        );

        assert!(matches!(a, Err(ModelError::Superseded { .. })));
        assert!(matches!(b, Err(ModelError::Superseded { .. })));
        assert_eq!(c.expect("newest wins").model_url, C);
        assert_eq!(renderer.attached_count(), 1);
        assert_eq!(manager.model_url().as_deref(), Some(C));

        let log = entries(&renderer.log);
        assert!(log.contains(&format!("dispose:{A}")));
        assert!(log.contains(&format!("dispose:{B}")));
        assert!(!log.contains(&format!("attach:{A}")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_leaves_no_model() {
        let (manager, renderer) = manager();
        manager.load_model(A).await.expect("load a");
        renderer.fail(B);

        let err = manager.load_model(B).await.expect_err("should fail");
        assert!(matches!(err, ModelError::Load { ref url, .. } if url == B));
        assert!(manager.current_model().is_none());
        assert_eq!(renderer.attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_without_model_fail() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.play_motion("Idle", 0, 2).await,
            Err(ModelError::NoModelLoaded)
        ));
        assert!(matches!(
            manager.set_expression("f01").await,
            Err(ModelError::NoModelLoaded)
        ));
        assert!(manager.motion_groups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_expression_is_renderer_error() {
        let (manager, _) = manager();
        manager.load_model(A).await.expect("load");
        assert!(manager.set_expression("").await.is_ok());
        assert!(matches!(
            manager.set_expression("nope").await,
            Err(ModelError::Renderer(RendererError::ExpressionNotFound(_)))
        ));
    }

    fn mock_metadata() -> ModelMetadata {
        ModelMetadata {
            source_url: A.to_string(),
            width: 1000.0,
            height: 2000.0,
            motion_groups: vec!["TapBody".to_string(), "Idle".to_string()],
            expressions: vec!["f01".to_string()],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_drives_renderer_port() {
        let mut model = MockAvatarModel::new();
        model.expect_metadata().returning(mock_metadata);
        model
            .expect_play_motion()
            .withf(|group, index, priority| {
                group == "Idle" && *index == 0 && *priority == IDLE_MOTION_PRIORITY
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        model
            .expect_set_transform()
            .withf(|t| (t.scale - 0.24).abs() < 1e-9)
            .times(2)
            .return_const(());
        model.expect_dispose().times(0);
        let model: Arc<dyn AvatarModel> = Arc::new(model);

        let mut renderer = MockRenderer::new();
        let loaded = model.clone();
        renderer
            .expect_load_from_url()
            .withf(|url| url == A)
            .times(1)
            .returning(move |_| Ok(loaded.clone()));
        renderer
            .expect_viewport()
            .returning(|| Viewport::new(400.0, 600.0));
        renderer.expect_attach().times(1).return_const(());
        renderer.expect_detach().times(0);

        let manager = Arc::new(ModelManager::new(Arc::new(renderer), ViewerConfig::default()));
        let loaded = manager.load_model(A).await.expect("load");
        assert_eq!(loaded.motion_groups, vec!["TapBody", "Idle"]);

        settle().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(manager.current_model().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renderer_failure_becomes_load_error() {
        let mut renderer = MockRenderer::new();
        renderer
            .expect_load_from_url()
            .returning(|url| Err(RendererError::Fetch(format!("404 for {url}"))));
        renderer.expect_attach().times(0);

        let manager = Arc::new(ModelManager::new(Arc::new(renderer), ViewerConfig::default()));
        let err = manager.load_model(A).await.expect_err("should fail");

        match err {
            ModelError::Load { url, source } => {
                assert_eq!(url, A);
                assert!(matches!(source, RendererError::Fetch(ref msg) if msg.ends_with(A)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(manager.current_model().is_none());
    }
}
