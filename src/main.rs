//! Harvester main entry point
//!
//! This is the command-line interface for the Harvester scrape orchestrator.

use anyhow::{bail, Context};
use clap::Parser;
use harvester::config::{load_config_with_hash, Config};
use harvester::{ExportFormat, Job, JobMode, JobStatus, Orchestrator, Target};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Harvester: a scrape job orchestrator
///
/// Harvester fetches one page, a list of pages, or a whole site and turns
/// every page into the requested formats (HTML, text, markdown, JSON, CSV),
/// optionally with screenshots per device profile.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(version)]
#[command(about = "A scrape job orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Target URL (repeat for multiple mode)
    #[arg(short, long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// How the target is walked
    #[arg(short, long, default_value = "single")]
    mode: JobMode,

    /// Export format for the job's results
    #[arg(short, long, default_value = "json")]
    format: ExportFormat,

    /// Write the export here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Validate config and show what would be scraped without fetching
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let target = Target::from_inputs(cli.mode, &cli.urls).context("Invalid target")?;

    if cli.dry_run {
        handle_dry_run(&config, &target, cli.format);
        return Ok(());
    }

    let job = handle_scrape(&config, target).await?;
    print_summary(&job);

    let body = harvester::output::export(job.results(), cli.format)
        .with_context(|| format!("Failed to export results as {}", cli.format))?;
    match &cli.output {
        Some(path) => {
            std::fs::write(path, &body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!("Wrote {} export to {}", cli.format, path.display());
        }
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&body)
                .context("Failed to write export to stdout")?;
        }
    }

    if job.status() == JobStatus::Failed {
        bail!(
            "Job failed: {}",
            job.failure().unwrap_or("no reason recorded")
        );
    }
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvester=info,warn"),
            1 => EnvFilter::new("harvester=debug,info"),
            2 => EnvFilter::new("harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles the --dry-run mode: shows the effective setup without fetching
fn handle_dry_run(config: &Config, target: &Target, format: ExportFormat) {
    let options = &config.defaults;

    eprintln!("=== Harvester Dry Run ===\n");

    eprintln!("Renderer:");
    eprintln!("  Kind: {:?}", config.renderer.kind);
    eprintln!("  User agent: {}", config.renderer.user_agent);
    eprintln!("  Sessions: {}", config.renderer.sessions);

    eprintln!("\nOptions:");
    eprintln!("  Max pages: {}", options.max_pages);
    eprintln!("  Max depth: {}", options.max_depth);
    eprintln!("  Max concurrent: {}", options.max_concurrent);
    eprintln!("  Request delay: {}ms", options.request_delay_ms);
    eprintln!("  Page timeout: {}ms", options.page_timeout_ms);
    eprintln!("  Same origin only: {}", options.same_origin_only);
    let formats: Vec<&str> = options.output_formats.iter().map(|f| f.as_str()).collect();
    eprintln!("  Formats: {}", formats.join(", "));
    if options.take_screenshots {
        let devices: Vec<&str> = options.device_profiles.iter().map(|d| d.as_str()).collect();
        eprintln!("  Screenshots: {}", devices.join(", "));
    }

    eprintln!("\nTarget ({} mode):", target.mode());
    for url in target.urls() {
        eprintln!("  - {}", url);
    }

    eprintln!("\n✓ Configuration is valid");
    eprintln!("✓ Would export results as {} ({})", format, format.mime_type());
}

/// Runs one job to completion; Ctrl-C cancels it and keeps partial results
///
/// The orchestrator is shut down on every path so browser sessions are quit.
async fn handle_scrape(config: &Config, target: Target) -> anyhow::Result<Job> {
    let orchestrator =
        Orchestrator::from_config(config).context("Failed to initialize orchestrator")?;
    let id = orchestrator.submit(target, config.defaults.clone());

    let job = tokio::select! {
        job = orchestrator.wait(id) => job,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, cancelling job {}", id);
            match orchestrator.cancel(id) {
                Ok(()) => orchestrator.wait(id).await,
                Err(e) => Err(e),
            }
        }
    };

    orchestrator.shutdown().await;
    job.with_context(|| format!("Job {} did not finish", id))
}

fn print_summary(job: &Job) {
    let summary = job.summary();
    eprintln!(
        "Job {} {}{}: {} pages, {} failed, {}ms",
        summary.id,
        summary.status,
        if summary.cancelled { " (cancelled)" } else { "" },
        summary.pages,
        summary.failed_pages,
        summary.total_time_ms.unwrap_or(0)
    );
    for error in job.errors() {
        eprintln!("  ! {}", error);
    }
}
