use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_CONFIG_FILE: &str = "my_config.json";

/// A key field that may hold one key or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(key) => vec![key.clone()],
            OneOrMany::Many(keys) => keys.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockProvider {
    #[default]
    Pexels,
    Pixabay,
}

impl StockProvider {
    pub fn name(self) -> &'static str {
        match self {
            StockProvider::Pexels => "pexels",
            StockProvider::Pixabay => "pixabay",
        }
    }

    pub fn other(self) -> Self {
        match self {
            StockProvider::Pexels => StockProvider::Pixabay,
            StockProvider::Pixabay => StockProvider::Pexels,
        }
    }
}

/// How a clip that doesn't match the frame's aspect ratio is fitted into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReframeMode {
    #[default]
    Letterbox,
    BlurredBackground,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockSettings {
    pub preferred_source: StockProvider,
    pub videos_per_scene: usize,
    pub alternative_keywords: usize,
}

impl Default for StockSettings {
    fn default() -> Self {
        Self {
            preferred_source: StockProvider::Pexels,
            videos_per_scene: 1,
            alternative_keywords: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub reframe: ReframeMode,
    pub ken_burns: bool,
    pub ken_burns_zoom: f64,
    pub blur_sigma: f64,
    pub target_duration_seconds: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            reframe: ReframeMode::Letterbox,
            ken_burns: true,
            ken_burns_zoom: 1.15,
            blur_sigma: 25.0,
            target_duration_seconds: crate::script::DEFAULT_TARGET_DURATION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "openai_api_key")]
    pub openai_key: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(rename = "elevenlabs_api_key")]
    pub elevenlabs_key: String,
    #[serde(default = "default_voice_id")]
    pub eleven_voice_id: String,
    #[serde(default = "default_model_id")]
    pub eleven_model_id: String,
    #[serde(default)]
    pub pexels_api_keys: OneOrMany,
    #[serde(default)]
    pub pixabay_api_keys: OneOrMany,
    #[serde(default)]
    pub together_api_key: Option<String>,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub stock: StockSettings,
    #[serde(default)]
    pub render: RenderSettings,
}

fn default_openai_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_voice_id() -> String {
    "JBFqnCBsd6RMkjVDRZzb".to_string()
}

fn default_model_id() -> String {
    "eleven_multilingual_v2".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;

        if config.openai_key.trim().is_empty() {
            anyhow::bail!("config: openai_api_key missing");
        }
        if config.elevenlabs_key.trim().is_empty() {
            anyhow::bail!("config: elevenlabs_api_key missing");
        }
        if config.render.width == 0 || config.render.height == 0 || config.render.fps == 0 {
            anyhow::bail!("config: render width, height and fps must be positive");
        }

        Ok(config)
    }

    /// Looks for `name` as given, then in each parent of the working directory.
    pub fn locate(name: &Path) -> Option<PathBuf> {
        if name.is_file() {
            return Some(name.to_path_buf());
        }
        if name.is_absolute() {
            return None;
        }
        let cwd = std::env::current_dir().ok()?;
        cwd.ancestors()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    pub fn together_key(&self) -> Option<&str> {
        self.together_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
