//! Configuration for gigsync.
//!
//! Settings come from `gigsync.toml`, layered in this order (later wins):
//! 1. built-in defaults
//! 2. the config file (`.gigsync/gigsync.toml` in the working directory, else
//!    `<config dir>/gigsync/gigsync.toml`)
//! 3. environment variables (`GIGSYNC_BASE_URL`, `GIGSYNC_LOG_FORMAT`)
//! 4. CLI flags
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! base_url = "http://127.0.0.1:8000"
//! request_timeout_secs = 10
//!
//! [seed]
//! placeholder_email = "client@example.com"
//!
//! [logging]
//! level = "info"
//! format = "pretty"
//! file = "/tmp/gigsync.log"
//!
//! [devserver]
//! port = 8000
//! gents = ["gent-1", "gent-2", "gent-3", "gent-4", "gent-5"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;

pub const CONFIG_DIR: &str = ".gigsync";
pub const CONFIG_FILE: &str = "gigsync.toml";

pub const ENV_BASE_URL: &str = "GIGSYNC_BASE_URL";
pub const ENV_LOG_FORMAT: &str = "GIGSYNC_LOG_FORMAT";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for terminals
    #[default]
    Pretty,
    /// One JSON object per line, for collectors
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid {
                field: "logging.format",
                message: format!("'{}' (valid values: pretty, json)", s),
            }),
        }
    }
}

/// Where the backend lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Defaults used when creating a gig before the user has edited it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_placeholder_email")]
    pub placeholder_email: String,
}

fn default_placeholder_email() -> String {
    "client@example.com".to_string()
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            placeholder_email: default_placeholder_email(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `GIGSYNC_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Also append logs to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Set by `-v`; forces `debug` even when `GIGSYNC_LOG` is set.
    #[serde(skip)]
    pub verbose: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
            verbose: false,
        }
    }
}

/// Settings for the local in-memory backend (`gigsync serve`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevServerConfig {
    #[serde(default = "default_devserver_port")]
    pub port: u16,
    /// Worker ids the backend accepts
    #[serde(default = "default_gents")]
    pub gents: Vec<String>,
}

fn default_devserver_port() -> u16 {
    8000
}

fn default_gents() -> Vec<String> {
    (1..=5).map(|n| format!("gent-{}", n)).collect()
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            port: default_devserver_port(),
            gents: default_gents(),
        }
    }
}

/// The complete gigsync.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GigsyncConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub devserver: DevServerConfig,
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub log_format: Option<LogFormat>,
    pub verbose: bool,
}

impl GigsyncConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Candidate config files, most specific first.
    pub fn search_paths(project_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![project_dir.join(CONFIG_DIR).join(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("gigsync").join(CONFIG_FILE));
        }
        paths
    }

    /// Load the first config file that exists, or defaults if none does.
    ///
    /// Returns the path that was used alongside the config.
    pub fn discover(project_dir: &Path) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in Self::search_paths(project_dir) {
            if path.is_file() {
                let config = Self::load(&path)?;
                return Ok((config, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize gigsync.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.server.base_url = url.trim().to_string();
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT).filter(|v| !v.trim().is_empty()) {
            self.logging.format = format.parse()?;
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, overrides: &CliOverrides) {
        if let Some(ref url) = overrides.base_url {
            self.server.base_url = url.clone();
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
        if overrides.verbose {
            self.logging.level = "debug".to_string();
            self.logging.verbose = true;
        }
    }

    /// Check values that would only fail later, at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = crate::gigs::client::parse_base_url(&self.server.base_url) {
            return Err(ConfigError::Invalid {
                field: "server.base_url",
                message: e.to_string(),
            });
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "server.request_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.seed.placeholder_email.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "seed.placeholder_email",
                message: "must not be empty".to_string(),
            });
        }
        if self.devserver.gents.iter().any(|g| g.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "devserver.gents",
                message: "gent ids must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Full resolution used by the CLI: file → env → CLI, then validation.
    pub fn resolve(
        project_dir: &Path,
        overrides: &CliOverrides,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let (mut config, path) = Self::discover(project_dir)?;
        config.apply_env()?;
        config.apply_cli(overrides);
        config.validate()?;
        Ok((config, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = GigsyncConfig::default();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.seed.placeholder_email, "client@example.com");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.devserver.gents.len(), 5);
        assert_eq!(config.devserver.gents[0], "gent-1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let content = r#"
[server]
base_url = "https://gigs.example.com"

[logging]
format = "json"
"#;
        let config = GigsyncConfig::parse(content).unwrap();
        assert_eq!(config.server.base_url, "https://gigs.example.com");
        assert_eq!(config.server.request_timeout_secs, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        let content = r#"
[logging]
format = "xml"
"#;
        assert!(GigsyncConfig::parse(content).is_err());
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gigsync.toml");
        std::fs::write(&path, "[server\nbase_url = 1").unwrap();
        match GigsyncConfig::load(&path) {
            Err(ConfigError::ParseFailed { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected ParseFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_discover_prefers_project_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_DIR).join(CONFIG_FILE);
        let mut config = GigsyncConfig::default();
        config.devserver.port = 9123;
        config.save(&path).unwrap();

        let (loaded, used) = GigsyncConfig::discover(dir.path()).unwrap();
        assert_eq!(used.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.devserver.port, 9123);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = GigsyncConfig::parse(
            r#"
[server]
base_url = "http://file:8000"
"#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_BASE_URL, "http://env:9000"),
            (ENV_LOG_FORMAT, "JSON"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.base_url, "http://env:9000");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_ignores_blank_values() {
        let mut config = GigsyncConfig::default();
        config
            .apply_env_with(|k| (k == ENV_BASE_URL).then(|| "  ".to_string()))
            .unwrap();
        assert_eq!(config.server.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = GigsyncConfig::default();
        config
            .apply_env_with(|k| (k == ENV_BASE_URL).then(|| "http://env:1".to_string()))
            .unwrap();
        config.apply_cli(&CliOverrides {
            base_url: Some("http://cli:2".to_string()),
            log_format: None,
            verbose: true,
        });
        assert_eq!(config.server.base_url, "http://cli:2");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.verbose);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = GigsyncConfig::default();
        config.server.base_url = "ftp://nope".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "server.base_url", .. })
        ));

        let mut config = GigsyncConfig::default();
        config.server.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = GigsyncConfig::default();
        config.seed.placeholder_email = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_round_trip_display() {
        for format in [LogFormat::Pretty, LogFormat::Json] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
