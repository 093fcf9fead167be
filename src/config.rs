//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.uptime-auditor.toml` files.

use crate::error::AuditError;
use crate::models::FailurePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = ".uptime-auditor.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Object store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Time window settings.
    #[serde(default)]
    pub window: WindowConfig,

    /// Spreadsheet sync settings.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of concurrent object fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Abort on the first bad key, or skip it and continue.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn default_output() -> String {
    "uptime_report.md".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// Which object store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// S3 REST API
    #[default]
    S3,
    /// Local directory mirroring the bucket layout
    Local,
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Network name; first component of every submission key.
    #[serde(default)]
    pub network: String,

    /// Bucket holding the submissions (s3 backend).
    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,

    /// Override for S3-compatible endpoints; requests go path-style.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Root directory (local backend).
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Keys requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Timeout for each store call in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Retries for transient store failures.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Initial retry backoff, doubled on each retry.
    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            network: String::new(),
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            root: None,
            page_size: default_page_size(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            retry_backoff_ms: default_backoff(),
        }
    }
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> usize {
    3
}

fn default_backoff() -> u64 {
    250
}

/// Time window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Lookback used when no previous execution is recorded.
    #[serde(default = "default_lookback")]
    pub lookback_hours: u64,

    /// File holding the last execution time.
    #[serde(default = "default_marker_path")]
    pub marker_path: PathBuf,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback(),
            marker_path: default_marker_path(),
        }
    }
}

fn default_lookback() -> u64 {
    12
}

fn default_marker_path() -> PathBuf {
    PathBuf::from(".uptime-auditor.last-run")
}

/// Spreadsheet sync settings. Sync runs only when `spreadsheet_id` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,

    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,

    #[serde(default = "default_sheets_api")]
    pub api_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            sheet_name: default_sheet_name(),
            api_url: default_sheets_api(),
        }
    }
}

fn default_sheet_name() -> String {
    "Uptime".to_string()
}

fn default_sheets_api() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load `.uptime-auditor.toml` from `dir` if it exists.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let path = dir.join(DEFAULT_CONFIG_FILE);

        if path.exists() {
            let config = Self::load(&path)?;
            Ok(Some((config, path)))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref network) = args.network {
            self.store.network = network.clone();
        }
        if let Some(ref bucket) = args.bucket {
            self.store.bucket = bucket.clone();
        }
        if let Some(ref region) = args.region {
            self.store.region = region.clone();
        }
        if let Some(ref endpoint) = args.endpoint {
            self.store.endpoint = Some(endpoint.clone());
        }
        if let Some(backend) = args.backend {
            self.store.backend = backend;
        }
        if let Some(ref root) = args.root {
            self.store.root = Some(root.clone());
            // A root only makes sense for the local backend.
            if args.backend.is_none() {
                self.store.backend = StoreBackend::Local;
            }
        }
        if let Some(timeout) = args.timeout {
            self.store.timeout_seconds = timeout;
        }
        if let Some(retries) = args.retries {
            self.store.retries = retries;
        }

        if let Some(hours) = args.lookback_hours {
            self.window.lookback_hours = hours;
        }
        if let Some(ref marker) = args.marker {
            self.window.marker_path = marker.clone();
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.skip_invalid {
            self.general.failure_policy = FailurePolicy::Skip;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref sheet_id) = args.sheet_id {
            self.sync.spreadsheet_id = Some(sheet_id.clone());
        }
        if let Some(ref sheet_name) = args.sheet_name {
            self.sync.sheet_name = sheet_name.clone();
        }
    }

    /// Check run parameters before anything touches the store.
    pub fn validate(&self) -> Result<(), AuditError> {
        let network = self.store.network.trim();
        if network.is_empty() {
            return Err(AuditError::Config(
                "network name is required (--network or [store].network)".to_string(),
            ));
        }
        if network.contains('/') {
            return Err(AuditError::Config(format!(
                "network name {:?} must not contain '/'",
                network
            )));
        }

        match self.store.backend {
            StoreBackend::S3 => {
                if self.store.bucket.trim().is_empty() {
                    return Err(AuditError::Config(
                        "bucket is required for the s3 backend (--bucket or [store].bucket)"
                            .to_string(),
                    ));
                }
                if self.store.region.trim().is_empty() && self.store.endpoint.is_none() {
                    return Err(AuditError::Config(
                        "region or endpoint is required for the s3 backend".to_string(),
                    ));
                }
            }
            StoreBackend::Local => match self.store.root {
                Some(ref root) if root.is_dir() => {}
                Some(ref root) => {
                    return Err(AuditError::Config(format!(
                        "store root is not a directory: {}",
                        root.display()
                    )))
                }
                None => {
                    return Err(AuditError::Config(
                        "root is required for the local backend (--root or [store].root)"
                            .to_string(),
                    ))
                }
            },
        }

        if self.general.concurrency == 0 {
            return Err(AuditError::Config("concurrency must be at least 1".to_string()));
        }
        if self.store.page_size == 0 {
            return Err(AuditError::Config("page size must be at least 1".to_string()));
        }
        if self.store.timeout_seconds == 0 {
            return Err(AuditError::Config(
                "store timeout must be at least 1 second".to_string(),
            ));
        }
        if self.window.lookback_hours == 0 {
            return Err(AuditError::Config(
                "lookback must be at least 1 hour".to_string(),
            ));
        }
        if let Some(ref id) = self.sync.spreadsheet_id {
            if id.trim().is_empty() {
                return Err(AuditError::Config("spreadsheet id is empty".to_string()));
            }
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_s3() -> Config {
        let mut config = Config::default();
        config.store.network = "berkeley".to_string();
        config.store.bucket = "uptime-submissions".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.backend, StoreBackend::S3);
        assert_eq!(config.store.page_size, 1000);
        assert_eq!(config.window.lookback_hours, 12);
        assert_eq!(config.general.failure_policy, FailurePolicy::Abort);
        assert!(config.sync.spreadsheet_id.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.json"
concurrency = 8
failure_policy = "skip"

[store]
network = "berkeley"
bucket = "uptime-submissions"
region = "eu-west-1"
retries = 5

[window]
lookback_hours = 24

[sync]
spreadsheet_id = "abc123"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.json");
        assert_eq!(config.general.concurrency, 8);
        assert_eq!(config.general.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.store.network, "berkeley");
        assert_eq!(config.store.region, "eu-west-1");
        assert_eq!(config.store.retries, 5);
        assert_eq!(config.store.timeout_seconds, 30);
        assert_eq!(config.window.lookback_hours, 24);
        assert_eq!(config.sync.spreadsheet_id.as_deref(), Some("abc123"));
        assert_eq!(config.sync.sheet_name, "Uptime");
    }

    #[test]
    fn test_validate() {
        assert!(valid_s3().validate().is_ok());

        let mut missing_network = valid_s3();
        missing_network.store.network = " ".to_string();
        assert!(matches!(missing_network.validate(), Err(AuditError::Config(_))));

        let mut missing_bucket = valid_s3();
        missing_bucket.store.bucket.clear();
        assert!(missing_bucket.validate().is_err());

        let mut zero_concurrency = valid_s3();
        zero_concurrency.general.concurrency = 0;
        assert!(zero_concurrency.validate().is_err());

        let mut zero_lookback = valid_s3();
        zero_lookback.window.lookback_hours = 0;
        assert!(zero_lookback.validate().is_err());
    }

    #[test]
    fn test_validate_local_backend() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = valid_s3();
        config.store.backend = StoreBackend::Local;
        assert!(config.validate().is_err());

        config.store.root = Some(temp_dir.path().join("missing"));
        assert!(config.validate().is_err());

        config.store.root = Some(temp_dir.path().to_path_buf());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[store]\nnetwork = \"devnet\"\nbucket = \"b\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.store.network, "devnet");
        assert!(Config::load(&temp_dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_load_from_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(Config::load_from_dir(temp_dir.path()).unwrap().is_none());

        std::fs::write(
            temp_dir.path().join(DEFAULT_CONFIG_FILE),
            "[general]\nfailure_policy = \"skip\"\n",
        )
        .unwrap();
        let (config, path) = Config::load_from_dir(temp_dir.path()).unwrap().unwrap();
        assert_eq!(config.general.failure_policy, FailurePolicy::Skip);
        assert!(path.ends_with(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn test_load_from_dir_rejects_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(DEFAULT_CONFIG_FILE),
            "[general]\nfailure_policy = \"skip\"\n\n[window]\nmarker_path = \"/data/marker\"\nlookback_hours = \"oops\"\n",
        )
        .unwrap();

        let err = Config::load_from_dir(temp_dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[window]"));
        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.store.page_size, 1000);
    }
}
