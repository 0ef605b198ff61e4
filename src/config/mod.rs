//! Configuration management for the clientlib cache

pub mod schema;

pub use schema::Config;

use crate::error::{ClientlibError, ClientlibResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clientlib")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clientlib")
    }

    /// Directory backing the cache store unless `cache.dir` overrides it
    pub fn default_cache_dir() -> PathBuf {
        Self::state_dir().join("cache")
    }

    /// Resolve the cache store directory for a configuration
    pub fn cache_dir(config: &Config) -> PathBuf {
        config
            .cache
            .dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Load configuration, using defaults if not exists
    pub async fn load(&self) -> ClientlibResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ClientlibResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            ClientlibError::io(format!("reading config from {}", path.display()), e)
        })?;

        let invalid = |reason: String| ClientlibError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        };
        let mut config: Config = toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        validate(&config).map_err(invalid)?;

        // A relative cache directory is kept next to the file naming it
        if let Some(dir) = config.cache.dir.as_mut() {
            if dir.is_relative() {
                let base = path.parent().unwrap_or_else(|| Path::new("."));
                *dir = base.join(&*dir);
            }
        }

        debug!(
            "Loaded config from {}: library {}, cache root {}",
            path.display(),
            config.library.root.display(),
            config.cache.root
        );
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ClientlibResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ClientlibError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ClientlibResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientlibError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

/// Reject values no component could work with
fn validate(config: &Config) -> Result<(), String> {
    match config.general.log_format.as_str() {
        "text" | "json" => {}
        other => {
            return Err(format!(
                "general.log_format must be \"text\" or \"json\", got \"{}\"",
                other
            ))
        }
    }

    let escapes = Path::new(config.cache.root.trim_start_matches('/'))
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes {
        return Err(format!(
            "cache.root {} must not contain '..'",
            config.cache.root
        ));
    }

    Ok(())
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.cache.root, "/var/cache/clientlibs");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.cache.root = "/var/cache/test".to_string();
        config.cache.gzip_enabled = true;

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.cache.root, "/var/cache/test");
        assert!(loaded.cache.gzip_enabled);
    }

    #[tokio::test]
    async fn invalid_file_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(&path, "[cache\nroot = ").await.unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, ClientlibError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn relative_cache_dir_follows_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(&path, "[cache]\ndir = \"built\"\n")
            .await
            .unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(ConfigManager::cache_dir(&config), temp.path().join("built"));
    }

    #[tokio::test]
    async fn absolute_cache_dir_kept() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(&path, "[cache]\ndir = \"/srv/clientlibs\"\n")
            .await
            .unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(config.cache.dir, Some(PathBuf::from("/srv/clientlibs")));
    }

    #[tokio::test]
    async fn unsupported_values_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path.clone());

        tokio::fs::write(&path, "[general]\nlog_format = \"xml\"\n")
            .await
            .unwrap();
        let err = manager.load().await.unwrap_err();
        assert!(err.to_string().contains("general.log_format"));

        tokio::fs::write(&path, "[cache]\nroot = \"/var/../etc\"\n")
            .await
            .unwrap();
        let err = manager.load().await.unwrap_err();
        assert!(matches!(err, ClientlibError::ConfigInvalid { .. }));
    }

    #[test]
    fn cache_dir_override() {
        let mut config = Config::default();
        assert_eq!(
            ConfigManager::cache_dir(&config),
            ConfigManager::default_cache_dir()
        );

        config.cache.dir = Some(PathBuf::from("/tmp/clientlibs"));
        assert_eq!(
            ConfigManager::cache_dir(&config),
            PathBuf::from("/tmp/clientlibs")
        );
    }
}
