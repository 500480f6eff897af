//! Site-Mirror main entry point
//!
//! This is the command-line interface for the Site-Mirror crawler.

use anyhow::{bail, Context};
use clap::Parser;
use site_mirror::config::{load_config, Config, ConsistencyMode, RuntimeSettings};
use site_mirror::crawler::{cancel_pair, crawl, CancelHandle};
use site_mirror::output::{load_statistics, print_statistics};
use site_mirror::storage::SqliteTaskStore;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Site-Mirror: a resumable single-site crawler
///
/// Site-Mirror downloads every text document of one site into a local
/// directory. Interrupt it at any time; running it again with the same
/// start URL and output directory resumes where it stopped and never
/// downloads a document twice.
#[derive(Parser, Debug)]
#[command(name = "site-mirror")]
#[command(version)]
#[command(about = "A resumable single-site crawler", long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// URL where crawling starts; defines the site to mirror
    #[arg(short = 'u', long = "url", value_name = "URL")]
    url: Option<String>,

    /// Existing directory to save results into
    #[arg(short = 'd', long = "output-dir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Number of workers fetching in parallel
    #[arg(short = 'w', long)]
    workers: Option<u32>,

    /// HTTP timeout in seconds
    #[arg(short = 't', long = "http-timeout", value_name = "SECS")]
    http_timeout: Option<u64>,

    /// Log to stdout instead of crawler.log in the output dir
    #[arg(short = 'c', long = "log-to-stdout")]
    log_to_stdout: bool,

    /// How in-flight tasks survive a crash: split or journaled
    #[arg(long, value_name = "MODE")]
    consistency: Option<ConsistencyMode>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate settings and show where results would go without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics of an existing crawl and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    /// Loads the config file if given, then applies flag overrides
    fn effective_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(url) = &self.url {
            config.crawler.start_url = Some(url.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output.output_dir = Some(dir.clone());
        }
        if let Some(workers) = self.workers {
            config.crawler.workers = workers;
        }
        if let Some(timeout) = self.http_timeout {
            config.crawler.http_timeout = timeout;
        }
        if let Some(mode) = self.consistency {
            config.crawler.consistency = mode;
        }
        if self.log_to_stdout {
            config.output.log_to_stdout = true;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = cli.effective_config()?;
    let settings = RuntimeSettings::resolve(&config).context("invalid settings")?;

    if cli.dry_run {
        handle_dry_run(&settings);
        return Ok(());
    }

    if cli.stats {
        return handle_stats(&settings.store_path);
    }

    settings.prepare_dirs()?;
    setup_logging(cli.verbose, cli.quiet, settings.log_path.as_deref())?;

    println!("using {} as crawler output dir", settings.crawl_root.display());
    if let Some(log_path) = &settings.log_path {
        println!("logging to {}", log_path.display());
    }

    handle_crawl(settings).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// Logs go to `log_path` when given, otherwise to stdout. `RUST_LOG`
/// overrides the verbosity flags.
fn setup_logging(verbose: u8, quiet: bool, log_path: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            // Only show errors
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("site_mirror=info,warn"),
                1 => EnvFilter::new("site_mirror=debug,info"),
                2 => EnvFilter::new("site_mirror=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false);

    match log_path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }

    Ok(())
}

/// Handles the --dry-run mode: shows the resolved settings
fn handle_dry_run(settings: &RuntimeSettings) {
    println!("=== Site-Mirror Dry Run ===\n");

    println!("Crawl:");
    println!("  Start URL: {}", settings.start_url);
    println!("  Domain: {}", settings.target_domain);
    println!("  Workers: {}", settings.workers);
    println!("  HTTP timeout: {:?}", settings.http_timeout);
    println!("  Pause between jobs: {:?}", settings.pause_between_jobs);
    println!("  Consistency: {}", settings.consistency);
    println!("  User agent: {}", settings.user_agent);

    println!("\nOutput:");
    println!("  Crawl root: {}", settings.crawl_root.display());
    println!("  Documents: {}", settings.documents_root.display());
    println!("  Task store: {}", settings.store_path.display());
    match &settings.log_path {
        Some(path) => println!("  Log: {}", path.display()),
        None => println!("  Log: stdout"),
    }

    let resuming = settings.store_path.exists();
    println!("\n✓ Configuration is valid (hash: {})", settings.config_hash);
    if resuming {
        println!("✓ Would resume the existing crawl");
    } else {
        println!("✓ Would start a new crawl");
    }
}

/// Handles the --stats mode: shows statistics from the task store
fn handle_stats(store_path: &Path) -> anyhow::Result<()> {
    if !store_path.exists() {
        bail!("no crawl found at {}", store_path.display());
    }

    println!("Task store: {}\n", store_path.display());

    let store = SqliteTaskStore::open_for_stats(store_path)
        .with_context(|| format!("failed to open {}", store_path.display()))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Cancels the crawl on Ctrl-C or SIGTERM
fn spawn_signal_listener(cancel: CancelHandle) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::warn!("Got shutdown signal, finishing in-flight tasks...");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Handles the main crawl operation
async fn handle_crawl(settings: RuntimeSettings) -> anyhow::Result<()> {
    let (cancel, signal) = cancel_pair();
    spawn_signal_listener(cancel);

    tracing::info!(
        "Mirroring {} from {} ({} mode)",
        settings.target_domain,
        settings.start_url,
        settings.consistency
    );

    match crawl(Arc::new(settings), signal).await {
        Ok(report) => {
            if report.drained() {
                tracing::info!("Crawl completed");
                println!(
                    "crawl completed: {} task(s) processed",
                    report.tasks_completed()
                );
            } else {
                tracing::warn!("Crawl interrupted, run again to resume");
                println!(
                    "crawl interrupted after {} task(s); run again to resume",
                    report.tasks_completed()
                );
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e).context("crawl failed")
        }
    }
}
