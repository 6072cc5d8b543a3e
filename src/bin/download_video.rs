#![forbid(unsafe_code)]

//! Command-line front end for the download client. Plays the part of the
//! watch page's Download button (one download per id, all running at once)
//! and of the Downloads page (live progress, then completed/failed lists).

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use ryotube_downloads::{
    config::{self, BufferMode, Settings},
    download::{
        DownloadFilter, DownloadManager, DownloadRecord, DownloadSort, DownloadStatus,
        format_bytes,
    },
};
use tokio::{signal, sync::watch};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Download RyoTube videos with live progress.")]
struct Cli {
    #[arg(value_name = "VIDEO_ID", required = true, help = "Numeric ids of the videos to download")]
    video_ids: Vec<u64>,
    #[arg(long = "config", value_name = "PATH", default_value = config::DEFAULT_CONFIG_FILE, help = "Path to the TOML config file")]
    config: PathBuf,
    #[arg(
        long = "api-url",
        value_name = "URL",
        help = "Override the backend base URL"
    )]
    api_url: Option<String>,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        help = "Directory the videos are saved into"
    )]
    output: Option<PathBuf>,
    #[arg(
        long = "buffering",
        value_enum,
        help = "Hold chunks in memory or stream them to a temp file"
    )]
    buffering: Option<BufferMode>,
    #[arg(long = "json", help = "Print the final download list as JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    println!("===================================");
    println!("RyoTube Downloader");
    println!("===================================");
    println!("Backend: {}", settings.api_base_url);
    println!("Saving to: {}", settings.download_dir.display());
    println!();

    let manager =
        DownloadManager::from_settings(settings).context("initializing download client")?;
    let renderer = tokio::spawn(render_progress(manager.registry().subscribe()));
    let interrupt = tokio::spawn(interrupt_on_ctrl_c(manager.clone()));

    let mut handles = Vec::new();
    let mut not_started = 0usize;
    let video_ids = unique_ids(&cli.video_ids);
    for (index, &video_id) in video_ids.iter().enumerate() {
        if manager.is_shut_down() {
            not_started += video_ids.len() - index;
            break;
        }
        match manager.start_for_video(video_id).await {
            Ok(handle) => handles.push(handle),
            Err(err) => {
                not_started += 1;
                error!(video_id, error = %err, "could not start download");
                eprintln!("Could not start video {}: {}", video_id, err);
            }
        }
    }

    let mut unfinished = not_started;
    for handle in handles {
        if handle.wait().await.is_err() {
            unfinished += 1;
        }
    }

    interrupt.abort();
    renderer.abort();

    let registry = manager.registry();
    if cli.json {
        let records = registry.view(DownloadFilter::All, DownloadSort::Recent);
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("serializing download list")?
        );
    } else {
        print_summary(&manager);
    }

    if unfinished > 0 {
        bail!("{} of {} download(s) did not complete", unfinished, video_ids.len());
    }
    Ok(())
}

/// First Ctrl+C cancels everything and stops new downloads from starting.
/// A second one exits right away.
async fn interrupt_on_ctrl_c(manager: DownloadManager) {
    if signal::ctrl_c().await.is_err() {
        return;
    }
    eprintln!("Interrupted, cancelling {} download(s)...", manager.shutdown());
    if signal::ctrl_c().await.is_ok() {
        eprintln!("Interrupted again, exiting.");
        std::process::exit(130);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Config file, then environment, then command-line flags.
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = config::load_settings_from(&cli.config)?;
    apply_cli_overrides(&mut settings, cli);
    Ok(settings)
}

fn apply_cli_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(url) = &cli.api_url {
        settings.api_base_url = url.clone();
    }
    if let Some(dir) = &cli.output {
        settings.download_dir = dir.clone();
    }
    if let Some(buffering) = cli.buffering {
        settings.buffering = buffering;
    }
}

/// Drops repeated ids while keeping the order they were given in.
fn unique_ids(ids: &[u64]) -> Vec<u64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Prints a line whenever a record changes status or crosses a 10% step.
async fn render_progress(mut rx: watch::Receiver<Vec<DownloadRecord>>) {
    let mut shown: HashMap<u64, (DownloadStatus, u8)> = HashMap::new();
    while rx.changed().await.is_ok() {
        let records = rx.borrow_and_update().clone();
        for record in &records {
            let key = (record.status, record.progress / 10);
            if shown.get(&record.id) != Some(&key) {
                shown.insert(record.id, key);
                println!("{}", progress_line(record));
            }
        }
    }
}

fn progress_line(record: &DownloadRecord) -> String {
    let size = if record.file_size > 0 {
        format_bytes(record.file_size)
    } else {
        "size unknown".to_string()
    };
    format!(
        "[{:>3}%] {:<11} #{} {} ({})",
        record.progress,
        record.status.label(),
        record.id,
        record.title,
        size
    )
}

fn print_summary(manager: &DownloadManager) {
    let registry = manager.registry();
    let summary = registry.summary();
    let partition = registry.partition();

    println!();
    println!("===================================");
    println!(
        "Downloaded Videos: {} ({})",
        summary.completed,
        format_bytes(summary.completed_bytes)
    );
    println!("===================================");
    for record in &partition.completed {
        let location = record
            .saved_to
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        println!(
            "  #{} {} - {} [{}] {}",
            record.id,
            record.title,
            record.channel_name,
            format_bytes(record.file_size),
            location
        );
    }
    if !partition.failed.is_empty() {
        println!();
        println!("Not completed: {}", summary.failed);
        for record in &partition.failed {
            println!(
                "  #{} {} ({} at {}%)",
                record.id,
                record.title,
                record.status.label(),
                record.progress
            );
        }
    }
}
