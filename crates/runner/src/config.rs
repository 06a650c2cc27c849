//! Runner configuration loaded from the environment.

use kanko_viewer::{ConfigError, ViewerConfig};

const DEFAULT_GUIDE_TEXT: &str = "ようこそ。こちらは浅草寺の雷門です。";
const DEFAULT_GUIDE_LANG: &str = "ja";

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub viewer: ViewerConfig,
    /// Narration spoken by the demo tour
    pub guide_text: String,
    pub guide_lang: String,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let viewer = ViewerConfig::from_lookup(&lookup)?;
        let guide_text = lookup("KANKO_GUIDE_TEXT")
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GUIDE_TEXT.to_string());
        let guide_lang = lookup("KANKO_GUIDE_LANG")
            .map(|lang| lang.trim().to_string())
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| DEFAULT_GUIDE_LANG.to_string());

        Ok(Self {
            viewer,
            guide_text,
            guide_lang,
        })
    }
}
