//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values. Options left unset fall back
//! to the config file, then to built-in defaults.

use crate::config::StoreBackend;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Uptime Auditor - audit uptime submissions stored in an object store
///
/// Lists the submissions a network's nodes uploaded since the last run,
/// resolves each (public key, remote address) pair to a stable identity,
/// and writes a Markdown or JSON report. Optionally syncs identities into
/// a spreadsheet.
///
/// Examples:
///   uptime-auditor --network berkeley --bucket uptime-submissions
///   uptime-auditor --network berkeley --root ./mirror --format json
///   uptime-auditor --network berkeley --bucket b --since 2024-01-01T00:00:00Z --dry-run
///   uptime-auditor --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Network name; submissions live under <network>/submissions/<date>/
    #[arg(short, long, value_name = "NAME", env = "UPTIME_NETWORK")]
    pub network: Option<String>,

    /// Bucket holding the submissions (s3 backend)
    #[arg(short, long, value_name = "BUCKET", env = "UPTIME_BUCKET")]
    pub bucket: Option<String>,

    /// Bucket region
    #[arg(long, value_name = "REGION", env = "AWS_REGION")]
    pub region: Option<String>,

    /// S3-compatible endpoint, used instead of the AWS URL
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Object store backend (s3, local)
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<StoreBackend>,

    /// Directory mirroring the bucket layout; implies --backend local
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .uptime-auditor.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Number of concurrent object fetches
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Timeout for each store call in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Retries for transient store failures
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<usize>,

    /// Lookback used when no previous run is recorded
    #[arg(long, value_name = "HOURS")]
    pub lookback_hours: Option<u64>,

    /// File recording the last execution time
    #[arg(long, value_name = "FILE")]
    pub marker: Option<PathBuf>,

    /// Window start (RFC 3339), replacing the recorded last execution
    #[arg(long, value_name = "TIME", value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,

    /// Skip malformed keys and undecodable objects instead of aborting
    ///
    /// Skipped keys are listed in the report. Exit code 2 when any were skipped.
    #[arg(long)]
    pub skip_invalid: bool,

    /// Dry run: list in-window keys without fetching objects
    #[arg(long)]
    pub dry_run: bool,

    /// Do not record this run as the last execution
    #[arg(long)]
    pub no_marker_update: bool,

    /// Spreadsheet to sync identities into
    #[arg(long, value_name = "ID")]
    pub sheet_id: Option<String>,

    /// Sheet (tab) name inside the spreadsheet
    #[arg(long, value_name = "NAME")]
    pub sheet_name: Option<String>,

    /// OAuth bearer token for the Sheets API
    #[arg(long, value_name = "TOKEN", env = "GOOGLE_SHEETS_TOKEN", hide_env_values = true)]
    pub sheets_token: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .uptime-auditor.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

fn parse_since(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// Only checks what can be decided from the flags alone; the merged
    /// configuration is checked by [`crate::config::Config::validate`].
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.lookback_hours == Some(0) {
            return Err("Lookback must be at least 1 hour".to_string());
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err("Endpoint URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref root) = self.root {
            if !root.is_dir() {
                return Err(format!("Store root is not a directory: {}", root.display()));
            }
        }

        if let Some(since) = self.since {
            if since > Utc::now() {
                return Err(format!("--since {} is in the future", since.to_rfc3339()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is `[general].verbose`; `--quiet` still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
