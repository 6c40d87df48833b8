use crate::core::validator::ValidationPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub mpv_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

impl PlayerConfig {
    pub fn mpv_binary(&self) -> PathBuf {
        self.mpv_path.clone().unwrap_or_else(|| PathBuf::from("mpv"))
    }

    /// IPC socket location, unique per process unless configured.
    pub fn ipc_socket(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("media-session-{}.sock", std::process::id()))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_file_size: u64,
    pub video_extensions: Vec<String>,
    pub subtitle_extensions: Vec<String>,
    pub forbidden_roots: Vec<PathBuf>,
    pub cache_freshness_ms: u64,
    pub cache_capacity: usize,
    pub integrity_interval_ms: u64,
    pub command_timeout_ms: u64,
    pub validation_timeout_ms: u64,
    pub player: PlayerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * GIB,
            video_extensions: ["mp4", "mkv", "avi", "mov", "webm", "m4v", "flv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            subtitle_extensions: ["srt", "vtt", "ass"].iter().map(|s| s.to_string()).collect(),
            forbidden_roots: default_forbidden_roots(),
            cache_freshness_ms: 30_000,
            cache_capacity: 64,
            integrity_interval_ms: 30_000,
            command_timeout_ms: 5_000,
            validation_timeout_ms: 5_000,
            player: PlayerConfig::default(),
        }
    }
}

#[cfg(windows)]
fn default_forbidden_roots() -> Vec<PathBuf> {
    ["C:\\Windows", "C:\\Program Files", "C:\\Program Files (x86)"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

#[cfg(not(windows))]
fn default_forbidden_roots() -> Vec<PathBuf> {
    [
        "/bin", "/sbin", "/boot", "/dev", "/etc", "/proc", "/sys", "/usr/bin", "/usr/sbin", "/usr/lib",
        "/System",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

impl SessionConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file at {}: {}", config_path.display(), e))?;

            match serde_json::from_str::<Self>(&content) {
                Ok(config) => {
                    log::info!("Loaded existing config from {}", config_path.display());
                    Ok(config)
                }
                Err(e) => {
                    log::warn!("Config file exists but has issues ({}), creating new one with defaults", e);
                    let new_config = Self::default();
                    new_config
                        .save_to(config_path)
                        .map_err(|save_err| anyhow::anyhow!("Failed to save new config: {}", save_err))?;
                    Ok(new_config)
                }
            }
        } else {
            log::info!("No config file found, creating default config");
            let config = Self::default();
            config
                .save_to(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to save default config: {}", e))?;
            log::info!("Created new config file at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("media-session")
            .join("config.json")
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            max_file_size: self.max_file_size,
            forbidden_roots: self.forbidden_roots.clone(),
            video_extensions: self.video_extensions.clone(),
            subtitle_extensions: self.subtitle_extensions.clone(),
        }
    }

    pub fn cache_freshness(&self) -> Duration {
        Duration::from_millis(self.cache_freshness_ms)
    }

    pub fn integrity_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic
        Duration::from_millis(self.integrity_interval_ms.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }
}
