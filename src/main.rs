use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pothole_media::config::{self, IntakeConfig};
use pothole_media::intake::queue::{QueueSnapshotItem, UploadQueue};
use pothole_media::intake::transcode::{ImageTranscoder, MagickTranscoder, NativeTranscoder};
use pothole_media::intake::validator::{AddMode, RejectionSummary};
use pothole_media::media::model::{GpsCoordinate, MediaFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "pothole-media", version, about = "Pothole report media intake")]
struct Cli {
    /// Config directory (defaults to ~/.pothole-media)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run files or folders through intake and print a JSON report
    Intake {
        paths: Vec<PathBuf>,
        /// Override the configured file limit
        #[arg(long)]
        max_files: Option<usize>,
        /// Feed the files as several appended selections of this size
        #[arg(long)]
        batch_size: Option<usize>,
        /// Convert with the built-in encoder instead of ImageMagick
        #[arg(long)]
        no_magick: bool,
    },
    /// Write a poster frame for a video URL or path
    #[cfg(feature = "ffmpeg")]
    Poster {
        url: String,
        #[arg(long, default_value_t = 1.0)]
        at: f64,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long, short)]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct BatchReport {
    accepted: usize,
    rejections: RejectionSummary,
    summary: String,
    gps: Option<GpsCoordinate>,
    error: Option<String>,
}

#[derive(Serialize)]
struct IntakeReport {
    batches: Vec<BatchReport>,
    queue: Vec<QueueSnapshotItem>,
}

/// Expand folders into their files. Symlinks are skipped.
fn collect_files(paths: &[PathBuf]) -> Vec<MediaFile> {
    let mut files = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.path_is_symlink())
        {
            match entry {
                Err(e) => tracing::warn!("scan error: {}", e),
                Ok(entry) if entry.file_type().is_file() => {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    files.push(MediaFile::from_path(entry.path().to_path_buf(), size));
                }
                Ok(_) => {}
            }
        }
    }
    files
}

fn load_config(dir: Option<&Path>) -> Result<IntakeConfig> {
    match dir.map(Path::to_path_buf).or_else(config::config_home) {
        Some(home) => config::read_config(&home),
        None => Ok(IntakeConfig::default()),
    }
}

async fn run_intake(
    mut config: IntakeConfig,
    paths: Vec<PathBuf>,
    max_files: Option<usize>,
    batch_size: Option<usize>,
    no_magick: bool,
) -> Result<IntakeReport> {
    if let Some(n) = max_files {
        config.max_files = n;
    }
    let transcoder: Arc<dyn ImageTranscoder> = if no_magick {
        Arc::new(NativeTranscoder)
    } else {
        Arc::new(MagickTranscoder::default())
    };
    let mut queue = UploadQueue::new(config, transcoder);
    queue.on_gps_found(|gps| {
        tracing::info!(
            "suggested report location: {:.6}, {:.6}",
            gps.latitude(),
            gps.longitude()
        )
    });

    let files = collect_files(&paths);
    let chunk = batch_size.unwrap_or(files.len()).max(1);
    let mut batches = Vec::new();
    for (i, selection) in files.chunks(chunk).enumerate() {
        let mode = if i == 0 { AddMode::Replace } else { AddMode::Append };
        let report = match queue.add_files(selection.to_vec(), mode).await {
            Ok(outcome) => BatchReport {
                accepted: outcome.accepted.len(),
                summary: outcome.rejections.to_string(),
                rejections: outcome.rejections,
                gps: outcome.gps,
                error: None,
            },
            Err(e) => BatchReport {
                accepted: 0,
                rejections: RejectionSummary::default(),
                summary: String::new(),
                gps: None,
                error: Some(e.to_string()),
            },
        };
        batches.push(report);
    }

    queue.settle().await;
    Ok(IntakeReport {
        batches,
        queue: queue.snapshot(),
    })
}

#[cfg(feature = "ffmpeg")]
async fn run_poster(config: IntakeConfig, url: String, at: f64, width: Option<u32>, output: PathBuf) -> Result<()> {
    use pothole_media::poster::{ffmpeg::FfmpegBackend, generate_poster};
    let width = width.unwrap_or(config.poster.detail_width);
    let poster = generate_poster(&FfmpegBackend, &url, at, width)
        .await
        .with_context(|| format!("generating poster for {}", url))?;
    std::fs::write(&output, &poster.bytes)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!("poster {}x{} written to {:?}", poster.width, poster.height, output);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    pothole_media::init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Intake {
            paths,
            max_files,
            batch_size,
            no_magick,
        } => {
            let report = run_intake(config, paths, max_files, batch_size, no_magick).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("serializing report")?
            );
        }
        #[cfg(feature = "ffmpeg")]
        Command::Poster {
            url,
            at,
            width,
            output,
        } => run_poster(config, url, at, width, output).await?,
    }
    Ok(())
}
