use anyhow::{Context, Result};
use facereg_vision::FaceSelection;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::matcher::DEFAULT_THRESHOLD;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACEREG_CONFIG_PATH").unwrap_or("/usr/local/etc/facereg/config.toml"))
});

pub static STORE_PREFIX: Lazy<PathBuf> = Lazy::new(|| match option_env!("FACEREG_STORE_PREFIX") {
    Some(prefix) => PathBuf::from(prefix),
    None => directories::ProjectDirs::from("", "", "facereg")
        .map(|dirs| dirs.data_dir().join("identities"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/facereg")),
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum embedding distance for a match. Lower = stricter.
    pub threshold: f64,
    /// Embedding length produced by the model.
    pub dimension: usize,
    /// Registry directory, defaults to [`STORE_PREFIX`].
    pub store: Option<PathBuf>,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: Option<PathBuf>,
    pub input_size: u32,
    pub face_selection: FaceSelection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            dimension: 128,
            store: None,
            model: ModelConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: None,
            input_size: 112,
            face_selection: FaceSelection::First,
        }
    }
}

impl Config {
    pub fn store_dir(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| STORE_PREFIX.to_path_buf())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            anyhow::bail!("threshold must be a positive number, got {}", self.threshold);
        }
        if self.dimension == 0 {
            anyhow::bail!("dimension must be at least 1");
        }
        if self.model.input_size == 0 {
            anyhow::bail!("model.input_size must be at least 1");
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
