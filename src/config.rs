use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, SlidemixError};

fn default_timeout_secs() -> u64 {
    600
}

fn default_prefix() -> String {
    "slidemix-".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Seconds before a running engine is killed; 0 waits forever
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Base directory for per-job workspaces (system temp dir when unset)
    pub work_root: Option<PathBuf>,
    /// Workspace directory name prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port for the static asset server
    pub port: u16,
    /// Directory served as the site root
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the rolling log file
    pub log_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            work_root: None,
            prefix: default_prefix(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            dir: PathBuf::from("./web"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(".slidemix").join("log"),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SlidemixError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| SlidemixError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SlidemixError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| SlidemixError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slidemix.toml");
        std::fs::write(&path, "[engine]\nbinary_path = \"/opt/ffmpeg/bin/ffmpeg\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.engine.binary_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.engine.timeout_secs, 600);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.staging.prefix, "slidemix-");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slidemix.toml");
        let mut config = Config::default();
        config.engine.timeout_secs = 0;
        config.staging.work_root = Some(dir.path().to_path_buf());

        config.save_to_file(&path).unwrap();
        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.engine.timeout_secs, 0);
        assert_eq!(reloaded.staging.work_root.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "engine = [").unwrap();
        assert!(matches!(Config::from_file(&path), Err(SlidemixError::Config(_))));
    }
}
