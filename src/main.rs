//! CLI entry point for the archive-fetch tool.

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use archive_fetch::scheduler::DEFAULT_SAMPLE_INTERVAL;
use archive_fetch::transport::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use archive_fetch::{
    ArchiveDownloader, ArchiveSource, ConcurrencyPolicy, DEFAULT_TARGET_UTILIZATION,
    HttpTransport, ProcStatSampler, ProgressObserver, RunSummary, TracingObserver,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod progress_ui;

use app_config::FileConfig;
use cli::{Args, DEFAULT_OUTPUT_DIR};
use progress_ui::ProgressUi;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = app_config::load_config(args.config.as_deref())?;

    init_tracing(&args, &file_config);
    debug!(?args, ?file_config, "configuration resolved");

    let source = ArchiveSource::parse(&args.item_url)
        .with_context(|| format!("Cannot download '{}'", args.item_url))?;
    info!(identifier = source.identifier(), url = %source.download_url(), "archive-fetch starting");

    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_interrupt_handler(Arc::clone(&interrupted));

    let transport = HttpTransport::with_timeouts(
        file_config.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        file_config.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
    );
    let sampler = ProcStatSampler::new(
        file_config
            .sample_interval_ms
            .map_or(DEFAULT_SAMPLE_INTERVAL, Duration::from_millis),
    );

    let use_progress = !args.no_progress && !args.quiet && io::stderr().is_terminal();
    let progress = use_progress.then(|| Arc::new(ProgressUi::new()));
    let observer: Arc<dyn ProgressObserver> = match &progress {
        Some(ui) => Arc::clone(ui) as Arc<dyn ProgressObserver>,
        None => Arc::new(TracingObserver),
    };

    let destination_root = output_root(&args, &file_config);
    let downloader = ArchiveDownloader::new(source, destination_root, Arc::new(transport))
        .with_policy(resolve_policy(&args, &file_config))
        .with_sampler(Arc::new(sampler))
        .with_observer(observer)
        .with_interrupt(interrupted);

    let result = downloader.download_all().await;
    if let Some(ui) = &progress {
        ui.finish();
    }
    let summary = result.context("Download run failed")?;
    report(&summary);

    Ok(())
}

/// Priority: `RUST_LOG` > `--quiet` > `-v` count > config `verbosity` > info.
fn init_tracing(args: &Args, file_config: &FileConfig) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", app_config::VerbositySetting::log_level),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn spawn_interrupt_handler(interrupted: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight chunks, partial files are kept");
            interrupted.store(true, Ordering::SeqCst);
        }
    });
}

fn output_root(args: &Args, file_config: &FileConfig) -> PathBuf {
    args.output_dir
        .clone()
        .or_else(|| file_config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// CLI flags override file values; a fixed worker count wins over CPU sizing.
fn resolve_policy(args: &Args, file_config: &FileConfig) -> ConcurrencyPolicy {
    if let Some(workers) = args.workers.or(file_config.workers) {
        return ConcurrencyPolicy::Fixed(usize::from(workers));
    }
    ConcurrencyPolicy::Adaptive {
        target_utilization: args
            .target_cpu
            .or(file_config.target_utilization)
            .map_or(DEFAULT_TARGET_UTILIZATION, f64::from),
        max_workers: args
            .max_workers
            .or(file_config.max_workers)
            .map(usize::from),
    }
}

fn report(summary: &RunSummary) {
    let Some(manifest_path) = &summary.manifest_path else {
        println!(
            "No files found for '{}'; nothing downloaded.",
            summary.identifier
        );
        return;
    };

    println!(
        "{}: {} files ({} downloaded, {} already present, {} failed) with {} workers",
        summary.identifier,
        summary.total_files,
        summary.downloaded,
        summary.already_downloaded,
        summary.failed,
        summary.workers
    );
    println!("Manifest: {}", manifest_path.display());

    if summary.interrupted {
        warn!("run was interrupted; rerun the same command to resume");
    }
    if summary.failed > 0 {
        warn!(
            failed = summary.failed,
            "some files failed; rerun the same command to retry them"
        );
    }
}
