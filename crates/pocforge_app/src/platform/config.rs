//! Persistent settings in RON, by default `./pocforge.ron`.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use forge_logging::{forge_debug, forge_info};
use pocforge_engine::{
    write_atomic, ApiKey, CollectorSettings, LlmSettings, DEFAULT_API_URL, DEFAULT_MODEL,
    DEFAULT_SCANNER,
};
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "POCFORGE_API_KEY";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub key: String,
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            key: String::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("key", &ApiKey::new(self.key.as_str()))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub poc_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub scanner: String,
    /// Wait after each page load, in milliseconds.
    pub settle_ms: u64,
    pub extract_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let collector = CollectorSettings::default();
        Self {
            api: ApiConfig::default(),
            poc_dir: PathBuf::from("pocs"),
            catalog_path: PathBuf::from("poc_database.json"),
            scanner: DEFAULT_SCANNER.to_string(),
            settle_ms: collector.settle.as_millis() as u64,
            extract_limit: collector.extract_limit,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                forge_debug!("no config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        ron::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Like [`AppConfig::load`], then applies `POCFORGE_API_KEY`.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::load(path)?.with_key_override(std::env::var(API_KEY_ENV).ok()))
    }

    pub fn with_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.api.key = key;
        }
        self
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let pretty = ron::ser::PrettyConfig::new();
        let text = ron::ser::to_string_pretty(self, pretty).context("serializing config")?;
        write_atomic(path, &text).with_context(|| format!("writing config {}", path.display()))?;
        forge_info!("config saved to {}", path.display());
        Ok(())
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            api_url: self.api.url.clone(),
            api_key: ApiKey::new(self.api.key.as_str()),
            model: self.api.model.clone(),
            ..LlmSettings::default()
        }
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            settle: Duration::from_millis(self.settle_ms),
            extract_limit: self.extract_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&temp.path().join("absent.ron")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.settle_ms, 2000);
        assert_eq!(config.extract_limit, 3);
    }

    #[test]
    fn saved_config_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pocforge.ron");
        let mut config = AppConfig::default();
        config.api.key = "sk-stored".to_string();
        config.poc_dir = PathBuf::from("/srv/pocs");
        config.save(&path).unwrap();
        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pocforge.ron");
        fs::write(&path, r#"(scanner: "/opt/nuclei")"#).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.scanner, "/opt/nuclei");
        assert_eq!(config.poc_dir, PathBuf::from("pocs"));
    }

    #[test]
    fn broken_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pocforge.ron");
        fs::write(&path, "(scanner: ").unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn environment_key_wins_unless_blank() {
        let mut config = AppConfig::default();
        config.api.key = "sk-stored".to_string();
        let config = config.with_key_override(Some(" ".to_string()));
        assert_eq!(config.api.key, "sk-stored");
        let config = config.with_key_override(Some("sk-env".to_string()));
        assert_eq!(config.llm_settings().api_key.expose(), "sk-env");
    }

    #[test]
    fn key_never_appears_in_debug_output() {
        let mut config = AppConfig::default();
        config.api.key = "sk-very-secret".to_string();
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
