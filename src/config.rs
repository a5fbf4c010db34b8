use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// URL prefix and subdirectory for uploaded audio
pub const MUSIC_PREFIX: &str = "/uploads/music";
/// URL prefix and subdirectory for cover images
pub const COVERS_PREFIX: &str = "/uploads/covers";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub database: Database,
    #[serde(default)]
    pub uploads: Uploads,
    pub http: HttpConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
    /// origin allowed to call the API from a browser, e.g. `http://localhost:4200`
    #[serde(default)]
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Uploads {
    #[serde(default = "default_uploads_root")]
    pub root: PathBuf,
    /// absolute prefix for emitted file references, e.g. `http://localhost:8080`
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for Uploads {
    fn default() -> Self {
        Self {
            root: default_uploads_root(),
            base_url: None,
        }
    }
}

impl Uploads {
    pub fn music_dir(&self) -> PathBuf {
        self.root.join("music")
    }

    pub fn covers_dir(&self) -> PathBuf {
        self.root.join("covers")
    }
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("uploads")
}
