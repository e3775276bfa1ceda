use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::convert::CompressionLevel;

pub const CONFIG_FILE_NAME: &str = "replay2png.json";

fn default_session_prefix() -> String {
    "10.1.24.".to_string()
}

fn default_session_data_prefix() -> String {
    "replay_".to_string()
}

fn default_manifest_name() -> String {
    "replay.json".to_string()
}

/// Naming conventions of a collection on disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionLayout {
    /// Prefix of session directories inside a collection root
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
    /// Prefix of the session-data directory inside a session directory
    #[serde(default = "default_session_data_prefix")]
    pub session_data_prefix: String,
    /// File name of the manifest inside the session-data directory
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
}

impl Default for SessionLayout {
    fn default() -> Self {
        Self {
            session_prefix: default_session_prefix(),
            session_data_prefix: default_session_data_prefix(),
            manifest_name: default_manifest_name(),
        }
    }
}

/// Application configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub layout: SessionLayout,
    /// Worker count; computed from the host when absent
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Compression level name or legacy code
    #[serde(default)]
    pub compression: Option<String>,
}

impl AppConfig {
    /// Load the config from an explicit file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let cfg: AppConfig = serde_json::from_str(&text).context("parsing config json")?;
        cfg.validate()
            .with_context(|| format!("validating config {}", path.display()))?;
        Ok(cfg)
    }

    /// Look for the config in the user data dir, then the current dir, then
    /// fall back to the built-in defaults.
    pub fn discover() -> Result<Self> {
        let mut tried: Vec<PathBuf> = Vec::new();
        if let Some(mut d) = dirs::data_dir() {
            d.push("replay2png");
            d.push(CONFIG_FILE_NAME);
            tried.push(d);
        }
        tried.push(PathBuf::from(CONFIG_FILE_NAME));

        for p in &tried {
            if p.exists() {
                return Self::from_file(p);
            }
        }
        Ok(AppConfig::default())
    }

    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        for (name, value) in [
            ("session_prefix", &layout.session_prefix),
            ("session_data_prefix", &layout.session_data_prefix),
            ("manifest_name", &layout.manifest_name),
        ] {
            if value.is_empty() {
                return Err(anyhow!("{} must not be empty", name));
            }
        }
        if self.jobs == Some(0) {
            return Err(anyhow!("jobs must be at least 1"));
        }
        self.compression_level()?;
        Ok(())
    }

    pub fn compression_level(&self) -> Result<CompressionLevel> {
        match &self.compression {
            Some(s) => Ok(s.parse()?),
            None => Ok(CompressionLevel::Default),
        }
    }
}

/// Default worker count: available parallelism plus two.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 2
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(home) = dirs::home_dir() else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home,
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}
