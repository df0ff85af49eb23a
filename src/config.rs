// src/config.rs
// =============================================================================
// This file loads the run configuration from a TOML file.
//
// A run needs:
// - a destination folder (every source gets a subfolder inside it)
// - an ordered list of sources, each with a name and a root (menu) URL
// - optional retry and HTTP timeout settings (sensible defaults otherwise)
//
// The configuration is read once at startup and never changes afterwards.
//
// Rust concepts:
// - serde derive: turns TOML tables into structs for us
// - #[serde(default)]: fills missing fields from the Default impl
// - thiserror: readable, typed errors for a library-style module
// =============================================================================

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Errors that can happen while loading the config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One catalog root. `name` doubles as the destination subfolder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
}

/// Retry settings, as written in the `[retry]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts(),
            base_delay_ms: policy.base_delay().as_millis() as u64,
            max_delay_ms: policy.max_delay().as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// HTTP client settings, as written in the `[http]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// How long we wait for a TCP/TLS connection to be established
    pub connect_timeout_secs: u64,
    /// Whole-request limit for HTML pages (not applied to file downloads)
    pub page_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            page_timeout_secs: 60,
        }
    }
}

/// Everything a run needs, read once and then treated as immutable
#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub destination_folder: PathBuf,
    pub sources: Vec<Source>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Configuration {
    /// Reads and validates a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Configuration = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    // Each source writes into destination_folder/<name>, so names must be
    // usable as a single folder name and must not collide.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".to_string()));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            let name = source.name.as_str();
            if name.trim() != name || name.is_empty() || name == "." || name == ".." {
                return Err(ConfigError::Invalid(format!(
                    "source name '{}' is not a usable folder name",
                    source.name
                )));
            }
            if name.contains('/') || name.contains('\\') {
                return Err(ConfigError::Invalid(format!(
                    "source name '{}' must not contain path separators",
                    source.name
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::Invalid(format!(
                    "source name '{}' is used more than once",
                    source.name
                )));
            }
            if source.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' has an empty url",
                    source.name
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = write_config(
            r#"
destination_folder = "downloads"

[[sources]]
name = "nes"
url = "http://example.com/nes.htm"

[[sources]]
name = "snes"
url = "http://example.com/snes.htm"
"#,
        );

        let config = Configuration::load(file.path()).unwrap();
        assert_eq!(config.destination_folder, PathBuf::from("downloads"));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].name, "snes");
        assert_eq!(config.retry.max_attempts, RetryPolicy::default().max_attempts());
        assert_eq!(config.http.connect_timeout_secs, 10);
    }

    #[test]
    fn test_load_retry_table() {
        let file = write_config(
            r#"
destination_folder = "out"

[[sources]]
name = "gba"
url = "http://example.com/gba.htm"

[retry]
max_attempts = 2
base_delay_ms = 10
"#,
        );

        let config = Configuration::load(file.path()).unwrap();
        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.base_delay(), Duration::from_millis(10));
        assert_eq!(policy.max_delay(), RetryPolicy::default().max_delay());
    }

    #[test]
    fn test_reject_duplicate_source_names() {
        let file = write_config(
            r#"
destination_folder = "out"

[[sources]]
name = "nes"
url = "http://example.com/a.htm"

[[sources]]
name = "nes"
url = "http://example.com/b.htm"
"#,
        );

        let result = Configuration::load(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_reject_path_like_source_name() {
        let file = write_config(
            r#"
destination_folder = "out"

[[sources]]
name = "../escape"
url = "http://example.com/a.htm"
"#,
        );

        assert!(matches!(
            Configuration::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_example_config_loads() {
        let example = Path::new(env!("CARGO_MANIFEST_DIR")).join("harvest.example.toml");
        let config = Configuration::load(&example).unwrap();
        assert_eq!(config.sources[0].name, "nes");
        assert_eq!(config.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Configuration::load(Path::new("/definitely/not/here.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
