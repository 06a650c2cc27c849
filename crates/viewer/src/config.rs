//! Viewer tuning knobs, overridable through `KANKO_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::ports::Viewport;

/// Model loaded at startup when nothing else is configured.
pub const DEFAULT_MODEL_URL: &str = "https://cdn.jsdelivr.net/gh/guansss/pixi-live2d-display@master/test/assets/haru/haru_greeter_t03.model3.json";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Model loaded by `ViewerApp::start`
    pub model_url: String,
    /// Tick of the simulated mouth animation
    pub frame_interval: Duration,
    /// Simulated lip-sync length when a command gives none
    pub lip_sync_default: Duration,
    /// Grace period after which the lip-sync safety timer forces a finish
    pub lip_sync_safety_margin: Duration,
    /// Delay before the second fit after a model load
    pub relayout_delay: Duration,
    /// Used when the renderer reports an empty viewport
    pub fallback_viewport: Viewport,
    /// Clip length of the headless renderer's motions
    pub motion_clip: Duration,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model_url: DEFAULT_MODEL_URL.to_string(),
            frame_interval: Duration::from_millis(16),
            lip_sync_default: Duration::from_secs(10),
            lip_sync_safety_margin: Duration::from_millis(100),
            relayout_delay: Duration::from_millis(100),
            fallback_viewport: Viewport::new(375.0, 300.0),
            motion_clip: Duration::from_millis(1500),
        }
    }
}

impl ViewerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `KANKO_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("KANKO_MODEL_URL") {
            let url = url.trim();
            if url.is_empty() {
                return Err(ConfigError::Invalid {
                    key: "KANKO_MODEL_URL",
                    value: url.to_string(),
                });
            }
            config.model_url = url.to_string();
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "KANKO_FRAME_INTERVAL_MS")? {
            if ms == 0 {
                return Err(ConfigError::Invalid {
                    key: "KANKO_FRAME_INTERVAL_MS",
                    value: ms.to_string(),
                });
            }
            config.frame_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<f64, _>(&lookup, "KANKO_LIP_SYNC_DEFAULT_SECS")? {
            config.lip_sync_default = Some(secs)
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| ConfigError::Invalid {
                    key: "KANKO_LIP_SYNC_DEFAULT_SECS",
                    value: secs.to_string(),
                })?;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "KANKO_LIP_SYNC_SAFETY_MS")? {
            config.lip_sync_safety_margin = Duration::from_millis(ms);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "KANKO_RELAYOUT_DELAY_MS")? {
            config.relayout_delay = Duration::from_millis(ms);
        }
        if let Some(width) = parse::<f64, _>(&lookup, "KANKO_VIEWPORT_WIDTH")? {
            config.fallback_viewport.width = positive("KANKO_VIEWPORT_WIDTH", width)?;
        }
        if let Some(height) = parse::<f64, _>(&lookup, "KANKO_VIEWPORT_HEIGHT")? {
            config.fallback_viewport.height = positive("KANKO_VIEWPORT_HEIGHT", height)?;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "KANKO_MOTION_CLIP_MS")? {
            config.motion_clip = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => {
                tracing::info!(key, value = %raw.trim(), "Applied environment override");
                Ok(Some(value))
            }
            Err(_) => Err(ConfigError::Invalid { key, value: raw }),
        },
    }
}

fn positive(key: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        })
    }
}
