//! Uptime Auditor - uptime submission auditor
//!
//! A CLI tool that lists the uptime submissions a network's nodes uploaded
//! to an object store since the previous run, resolves each submitter to a
//! stable identity and writes an audit report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, store access, malformed data under abort, etc.)
//!   2 - Run completed but some keys were skipped

mod analysis;
mod cli;
mod config;
mod decoder;
mod error;
mod models;
mod report;
mod scanner;
mod sink;
mod store;
mod window;

use analysis::{Analyzer, AnalyzerSettings};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, StoreBackend, DEFAULT_CONFIG_FILE};
use models::{Report, ReportMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::{LocalStore, ObjectStore, ResilientStore, RetryPolicy, S3Store};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use window::{ExecutionMarker, FileMarker, SystemClock, WindowResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration; a broken config file stops the run here
    let (config, source) = match load_config(&args, Path::new(".")) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, &config);

    info!("Uptime Auditor v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", redacted(&args));
    match source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    // Run the audit
    match run_audit(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Audit failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .uptime-auditor.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Set [store].network and [store].bucket (or root) before the first run.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// `RUST_LOG`, when set, overrides the level chosen by `-v`/`-q` and
/// `[general].verbose`.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Copy of the arguments that is safe to log.
fn redacted(args: &Args) -> Args {
    let mut args = args.clone();
    if args.sheets_token.is_some() {
        args.sheets_token = Some("***".to_string());
    }
    args
}

/// Run the complete audit workflow. Returns the exit code (0 or 2).
async fn run_audit(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.validate()?;

    let store = build_store(&config).await?;
    let resolver = WindowResolver::new(config.window.lookback_hours)?;
    debug!("Lookback without a recorded run: {}h", resolver.lookback().num_hours());
    let marker = FileMarker::new(config.window.marker_path.clone());

    let settings = AnalyzerSettings {
        network: config.store.network.trim().to_string(),
        concurrency: config.general.concurrency,
        policy: config.general.failure_policy,
        start_override: args.since,
    };
    let analyzer = Analyzer::new(store, Arc::new(SystemClock), resolver, settings);

    // Handle --dry-run: list keys and exit
    if args.dry_run {
        return handle_dry_run(&analyzer, &marker).await;
    }

    println!("🔎 Auditing uptime submissions");
    println!("   Network: {}", config.store.network);
    println!("   Store: {}", store_label(&config));
    println!("   Failure policy: {}", config.general.failure_policy);

    let outcome = analyzer.run(&marker).await?;
    println!("   Window: {}", outcome.window);

    // Build the report
    println!("\n📝 Generating report...");

    let activity = analysis::activity_by_identity(&outcome.submissions);
    let entries = analysis::identity_entries(&outcome.registry, &activity);
    let shared = analysis::shared_addresses(&outcome.registry);
    let duration = start_time.elapsed().as_secs_f64();

    let metadata = ReportMetadata {
        network: config.store.network.clone(),
        bucket: store_label(&config),
        window_start: outcome.window.start(),
        window_end: outcome.window.end(),
        partitions: outcome.partitions.clone(),
        analysis_date: Utc::now(),
        keys_listed: outcome.keys_listed,
        submissions_in_window: outcome.submissions.len(),
        identities: outcome.registry.len(),
        keys_skipped: outcome.skipped.len(),
        failure_policy: config.general.failure_policy,
        duration_seconds: duration,
    };

    let report = Report {
        metadata,
        identities: entries,
        shared_addresses: shared,
        skipped: outcome.skipped.clone(),
    };

    let output_path = Path::new(&config.general.output);
    report::write_report(&report, output_path, args.format == OutputFormat::Json)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Push identities downstream
    if let Some(ref spreadsheet_id) = config.sync.spreadsheet_id {
        let token = args
            .sheets_token
            .as_deref()
            .context("A Sheets token is required to sync (--sheets-token or GOOGLE_SHEETS_TOKEN)")?;
        let sink = sink::SheetsSink::new(
            &config.sync.api_url,
            spreadsheet_id,
            &config.sync.sheet_name,
            token,
            Duration::from_secs(config.store.timeout_seconds),
        )?;
        let summary = sink::sync_registry(&sink, &report.identities).await?;
        println!(
            "\n📤 Synced {} identities to sheet {} ({} updated, {} appended)",
            report.identities.len(),
            config.sync.sheet_name,
            summary.updated,
            summary.appended
        );
    }

    // Record this run only once everything above succeeded
    if args.no_marker_update {
        info!("Leaving last execution marker untouched");
    } else {
        marker.write(outcome.window.end())?;
        debug!(
            "Recorded last execution {} in {}",
            outcome.window.end().to_rfc3339(),
            marker.path().display()
        );
    }

    // Print summary
    println!("\n📊 Audit Summary:");
    if outcome.registry.is_empty() {
        println!("   No submissions fell inside the window.");
    }
    println!("   Keys listed: {}", outcome.keys_listed);
    println!("   Submissions in window: {}", outcome.submissions.len());
    println!(
        "   Identities: {} ({} distinct public keys)",
        outcome.registry.len(),
        analysis::distinct_public_keys(&outcome.registry)
    );
    if !report.shared_addresses.is_empty() {
        println!("   Shared addresses: {}", report.shared_addresses.len());
    }
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Audit complete! Report saved to: {}",
        output_path.display()
    );

    if !outcome.skipped.is_empty() {
        eprintln!(
            "\n⚠️  {} keys were skipped; see the report for details (exit code 2).",
            outcome.skipped.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: list in-window keys, fetch nothing, exit.
async fn handle_dry_run(analyzer: &Analyzer, marker: &FileMarker) -> Result<i32> {
    println!("\n🔍 Dry run: listing keys (no objects fetched)...\n");

    let scan = analyzer.scan(marker).await?;
    println!("   Window: {}", scan.window);

    for partition in &scan.partitions {
        println!("   Partition: {}", partition);
    }

    if scan.keys.is_empty() {
        println!("   No submissions fall inside the window.");
    } else {
        println!("   Found {} submissions that would be fetched:\n", scan.keys.len());
        for key in &scan.keys {
            println!("     📄 {} ({})", key.key, key.timestamp.to_rfc3339());
        }
    }
    println!("\n   Total listed: {}", scan.keys_listed);

    for skipped in &scan.skipped {
        println!("   ⚠️  skipped {} ({}: {})", skipped.key, skipped.kind, skipped.reason);
    }

    println!("\n✅ Dry run complete. No objects were fetched and the marker was not updated.");
    Ok(if scan.skipped.is_empty() { 0 } else { 2 })
}

/// Build the configured store, wrapped with timeouts and retries.
async fn build_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    let policy = RetryPolicy {
        retries: config.store.retries,
        base_backoff: Duration::from_millis(config.store.retry_backoff_ms),
        call_timeout: Duration::from_secs(config.store.timeout_seconds),
    };

    let store: Arc<dyn ObjectStore> = match config.store.backend {
        StoreBackend::Local => {
            let root = config
                .store
                .root
                .clone()
                .context("The local backend needs a root directory")?;
            info!("Using local store at {}", root.display());
            Arc::new(ResilientStore::new(
                LocalStore::new(root, config.store.page_size),
                policy,
            ))
        }
        StoreBackend::S3 => {
            let s3 = S3Store::connect(
                &config.store.bucket,
                &config.store.region,
                config.store.endpoint.as_deref(),
                config.store.page_size,
                policy.call_timeout,
            )
            .await?;
            info!("Using S3 bucket {} in {}", s3.bucket(), config.store.region);
            Arc::new(ResilientStore::new(s3, policy))
        }
    };

    Ok(store)
}

/// Human-readable location of the store.
fn store_label(config: &Config) -> String {
    match config.store.backend {
        StoreBackend::S3 => config.store.bucket.clone(),
        StoreBackend::Local => config
            .store
            .root
            .as_ref()
            .map(|root| root.display().to_string())
            .unwrap_or_default(),
    }
}

/// Load configuration from file or use defaults, then apply CLI overrides.
///
/// An explicit `--config` wins over `.uptime-auditor.toml` in `dir`. A
/// config file that exists but cannot be read or parsed is an error.
/// Returns the merged config and the file it came from, if any.
fn load_config(args: &Args, dir: &Path) -> Result<(Config, Option<PathBuf>)> {
    let (mut config, source) = match args.config {
        Some(ref config_path) => (Config::load(config_path)?, Some(config_path.clone())),
        None => match Config::load_from_dir(dir)
            .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_FILE))?
        {
            Some((config, path)) => (config, Some(path)),
            None => (Config::default(), None),
        },
    };

    config.merge_with_args(args);
    Ok((config, source))
}
