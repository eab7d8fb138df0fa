use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vidqueue::remote::GeminiConfig;
use vidqueue::remote::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use vidqueue::runner::RunnerConfig;
use vidqueue::scheduler::{CooldownConfig, EngineConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub runner: RunnerSection,
    pub quota: QuotaConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vidqueue"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub api_key_env: String,
    pub aspect_ratio: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: 120,
            api_key_env: "GEMINI_API_KEY".to_string(),
            aspect_ratio: "16:9".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub poll_interval_secs: u64,
    pub max_poll_secs: Option<u64>,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_poll_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub tick_interval_ms: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            initial_backoff_secs: 300,
            max_backoff_secs: 3600,
            tick_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub scan_interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { scan_interval_secs: 5 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            runner: RunnerSection::default(),
            quota: QuotaConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig {
            base_url: self.remote.base_url.clone(),
            model: self.remote.model.clone(),
            timeout: Duration::from_secs(self.remote.timeout_secs),
        }
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            runner: RunnerConfig {
                poll_interval: Duration::from_secs(self.runner.poll_interval_secs.max(1)),
                max_poll_duration: self.runner.max_poll_secs.map(Duration::from_secs),
                aspect_ratio: self.remote.aspect_ratio.clone(),
            },
            cooldown: CooldownConfig {
                initial_backoff: Duration::from_secs(self.quota.initial_backoff_secs),
                max_backoff: Duration::from_secs(self.quota.max_backoff_secs),
                tick_interval: Duration::from_millis(self.quota.tick_interval_ms.max(1)),
            },
            api_key_env: self.remote.api_key_env.clone(),
            ..Default::default()
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch.scan_interval_secs.max(1))
    }
}
