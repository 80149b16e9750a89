use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub identities: IdentityConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub recognition: RecognitionConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facewatch")
        .join("facewatch.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// JSON file listing enrolled identities as `{name, image}` records.
    /// Image paths are resolved relative to this file's directory.
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Durable cache of computed embeddings, rebuilt when the registry
    /// no longer matches it.
    #[serde(default = "default_embedding_cache_path")]
    pub cache_path: PathBuf,
}

fn default_registry_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("facewatch")
        .join("known_faces.json")
}

fn default_embedding_cache_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("facewatch")
        .join("embeddings.json")
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            cache_path: default_embedding_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding service endpoint: receives a base64 image, returns one
    /// embedding per detected face.
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_endpoint() -> String {
    "http://127.0.0.1:8190/embed".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    10
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Maximum cosine distance for a probe to count as a recognized
    /// identity. Empirically chosen; tune per embedding model.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,

    /// Identity that never triggers a notification when recognized.
    #[serde(default)]
    pub trusted_name: Option<String>,

    /// Snapshots smaller than this are treated as a camera error.
    #[serde(default = "default_min_snapshot_bytes")]
    pub min_snapshot_bytes: usize,
}

fn default_match_threshold() -> f32 {
    crate::matcher::DEFAULT_MATCH_THRESHOLD
}

fn default_min_snapshot_bytes() -> usize {
    1000
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            trusted_name: None,
            min_snapshot_bytes: default_min_snapshot_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between monitoring cycles. Clamped to
    /// [`min_interval_seconds`, `max_interval_seconds`].
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default = "default_min_interval_seconds")]
    pub min_interval_seconds: u64,

    #[serde(default = "default_max_interval_seconds")]
    pub max_interval_seconds: u64,

    /// The reachable-camera list is refreshed every Nth cycle (and whenever
    /// it is empty) rather than on every pass.
    #[serde(default = "default_camera_refresh_cycles")]
    pub camera_refresh_cycles: u64,

    #[serde(default = "default_snapshot_timeout_secs")]
    pub snapshot_timeout_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Upper bound on how long `stop()` waits for the worker to exit.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_interval_seconds() -> u64 {
    5
}

fn default_min_interval_seconds() -> u64 {
    5
}

fn default_max_interval_seconds() -> u64 {
    300
}

fn default_camera_refresh_cycles() -> u64 {
    5
}

fn default_snapshot_timeout_secs() -> u64 {
    5
}

fn default_probe_timeout_secs() -> u64 {
    2
}

fn default_stop_timeout_secs() -> u64 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            min_interval_seconds: default_min_interval_seconds(),
            max_interval_seconds: default_max_interval_seconds(),
            camera_refresh_cycles: default_camera_refresh_cycles(),
            snapshot_timeout_secs: default_snapshot_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_notify_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub user: String,

    #[serde(default = "default_notify_priority")]
    pub priority: i8,
}

fn default_notify_endpoint() -> String {
    "https://api.pushover.net/1/messages.json".to_string()
}

fn default_notify_priority() -> i8 {
    2
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_notify_endpoint(),
            token: String::new(),
            user: String::new(),
            priority: default_notify_priority(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            identities: IdentityConfig::default(),
            embedding: EmbeddingConfig::default(),
            recognition: RecognitionConfig::default(),
            monitor: MonitorConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("facewatch")
            .join("config.toml")
    }
}
