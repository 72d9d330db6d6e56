use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default login service base URL (local development backend)
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,
    pub api_base_url: String,
    pub request_timeout_secs: u64,

    /// Accept the built-in demo credentials when the login service is unreachable.
    /// Demo convenience only; turn off for any real deployment.
    pub demo_fallback: bool,

    pub max_ecg_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 10,
            demo_fallback: true,
            max_ecg_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Get the default config directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".ecgclinic"))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from file or return default
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from file, or default when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Base URL with any trailing slash removed, checked for an http(s) scheme
    pub fn validated_base_url(&self) -> Result<String> {
        let cleaned = self.api_base_url.trim().trim_end_matches('/');
        let parsed = url::Url::parse(cleaned)
            .with_context(|| format!("Invalid API base URL '{}'", cleaned))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "API base URL must use http or https scheme, got: {}",
                parsed.scheme()
            );
        }
        Ok(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.schema_version, 1);
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert!(config.demo_fallback);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.api_base_url = "https://clinic.example.org".to_string();
        config.demo_fallback = false;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.api_base_url, "https://clinic.example.org");
        assert!(!loaded.demo_fallback);
    }

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.max_ecg_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"demo_fallback": false}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert!(!config.demo_fallback);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(Config::load(&path).is_err());
        let config = Config::load_or_default(&path);
        assert_eq!(config.schema_version, 1);
    }

    #[test]
    fn test_base_url_validation() {
        let mut config = Config::default();
        config.api_base_url = "http://localhost:8080/".to_string();
        assert_eq!(config.validated_base_url().unwrap(), "http://localhost:8080");

        config.api_base_url = "not-a-url".to_string();
        assert!(config.validated_base_url().is_err());

        config.api_base_url = "ftp://localhost:8080".to_string();
        assert!(config.validated_base_url().is_err());
    }

    #[test]
    fn test_zero_timeout_is_clamped() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}
