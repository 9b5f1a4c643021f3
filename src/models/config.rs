use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::PdfOptions;
use crate::services::PoolConfig;

/// Application configuration loaded from config.yaml
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Renderer pool sizing and validation policy
    #[serde(default)]
    pub pool: PoolConfig,

    /// Options applied when a request carries none
    #[serde(default = "PdfOptions::print_defaults")]
    pub render: PdfOptions,

    /// Headless browser settings
    #[serde(default)]
    pub chrome: ChromeConfig,
}

/// Headless browser used by the Chrome renderer
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChromeConfig {
    /// Browser binary; when unset, `CHROME_PATH` and then `PATH` are searched
    #[serde(default)]
    pub binary: Option<PathBuf>,

    /// Extra command line arguments
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Upper bound for a single load-and-print run
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,
}

fn default_args() -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
    ]
}

fn default_navigation_timeout() -> u64 {
    30_000
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: default_args(),
            navigation_timeout_ms: default_navigation_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config file configured, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<Self>(&content) {
                Ok(config) => {
                    tracing::info!(
                        path = %path.display(),
                        pool_min = config.pool.min,
                        pool_max = config.pool.max,
                        "Loaded configuration"
                    );
                    config
                }
                Err(e) => {
                    tracing::warn!(%e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(%e, path = %path.display(), "Failed to read config, using defaults");
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            render: PdfOptions::print_defaults(),
            chrome: ChromeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageFormat;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.pool.min, 1);
        assert_eq!(config.pool.max, 10);
        assert_eq!(config.pool.eviction_interval_ms, 5000);
        assert!(config.pool.validate_on_return);
        assert_eq!(config.render.format, Some(PageFormat::A4));
        assert_eq!(config.chrome.binary, None);
        assert_eq!(config.chrome.navigation_timeout_ms, 30_000);
    }

    #[test]
    fn test_default_args() {
        assert_eq!(
            default_args(),
            vec!["--no-sandbox".to_string(), "--disable-setuid-sandbox".to_string()]
        );
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
pool:
  min: 2
  max: 4
  eviction_interval_ms: 1000
  acquire_timeout_ms: 10000
render:
  format: Letter
  margin:
    top: 1in
    bottom: 1in
chrome:
  binary: /usr/bin/chromium
  args: ["--disable-gpu"]
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.pool.min, 2);
        assert_eq!(config.pool.max, 4);
        assert_eq!(config.pool.acquire_timeout_ms, Some(10_000));
        assert!(config.pool.validate_on_return);
        assert_eq!(config.render.format, Some(PageFormat::Letter));
        assert_eq!(config.render.margin.unwrap().top, "1in");
        assert_eq!(config.chrome.binary, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(config.chrome.args, vec!["--disable-gpu".to_string()]);
        assert_eq!(config.chrome.navigation_timeout_ms, 30_000);
    }

    #[test]
    fn test_deserialize_empty_sections_use_defaults() {
        let config: AppConfig = serde_yaml::from_str("pool: {}\n").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_missing_path_uses_defaults() {
        let config = AppConfig::load(None);
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool:\n  max: 3").unwrap();

        let config = AppConfig::load(Some(file.path()));
        assert_eq!(config.pool.max, 3);
    }

    #[test]
    fn test_load_invalid_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool: [not, a, map]").unwrap();

        let config = AppConfig::load(Some(file.path()));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = AppConfig::load(Some(Path::new("/nonexistent/pagepool.yaml")));
        assert_eq!(config, AppConfig::default());
    }
}
