//! The `optipack batch` command: transform a directory into a ZIP archive.

use clap::{Args, ValueEnum};
use optipack_core::pipeline::{DiscoveredFile, FileDiscovery};
use optipack_core::{
    ArchiveSummary, BatchProgress, BatchService, Config, OutputWriter, ReportFormat,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::watch;

use super::{expand_path, TransformArgs};

/// Report formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportArg {
    /// Single JSON document
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl From<ReportArg> for ReportFormat {
    fn from(arg: ReportArg) -> Self {
        match arg {
            ReportArg::Json => ReportFormat::Json,
            ReportArg::Jsonl => ReportFormat::JsonLines,
        }
    }
}

/// Arguments for the `batch` command.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Image file or directory to process
    #[arg(required = true)]
    pub input: PathBuf,

    /// ZIP archive to write
    #[arg(short, long, required = true)]
    pub output: PathBuf,

    /// Number of parallel workers (overrides config)
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Write a per-image report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Report format
    #[arg(long, value_enum, default_value = "json")]
    pub report_format: ReportArg,

    #[command(flatten)]
    pub transform: TransformArgs,
}

/// Execute the batch command.
pub async fn execute(args: BatchArgs) -> anyhow::Result<()> {
    let input = expand_path(&args.input);
    anyhow::ensure!(input.exists(), "Input path not found: {}", input.display());

    let mut config = Config::load()?;
    if let Some(parallel) = args.parallel {
        anyhow::ensure!(parallel > 0, "--parallel must be at least 1");
        config.processing.parallel_workers = parallel;
    }

    let discovery = FileDiscovery::new(&config.processing);
    let files = discovery.discover(&input);
    let files = skip_oversized(files, config.limits.max_item_bytes());
    anyhow::ensure!(!files.is_empty(), "No supported images found in {}", input.display());
    tracing::info!(
        "Found {} images ({:.1} MB)",
        files.len(),
        FileDiscovery::total_size(&files) as f64 / 1_000_000.0
    );

    let total = files.len();
    let service = BatchService::new(config);
    let spec = service.spec_from_form(args.transform.to_form())?;

    let start_time = Instant::now();
    let (progress_tx, mut progress) = watch::channel(BatchProgress::new(total));
    let progress_bar = create_progress_bar(total as u64);
    let progress_task = tokio::spawn({
        let bar = progress_bar.clone();
        async move {
            while progress.changed().await.is_ok() {
                let snapshot = *progress.borrow_and_update();
                bar.set_position(snapshot.completed as u64);
                if snapshot.failed > 0 {
                    bar.set_message(format!("{} failed", snapshot.failed));
                }
            }
        }
    });

    // Files are read one item-cap sized group at a time into a single archive.
    let output_path = expand_path(&args.output);
    let archive = tokio::fs::File::create(&output_path).await?;
    let summary = service.archive_files(&files, spec, archive, &progress_tx).await;
    drop(progress_tx);
    let _ = progress_task.await;
    progress_bar.finish_and_clear();
    let summary = summary?;

    if let Some(report) = &args.report {
        let report = expand_path(report);
        let mut writer = OutputWriter::new(
            BufWriter::new(File::create(&report)?),
            args.report_format.into(),
            true,
        );
        writer.write_summary(&summary)?;
        writer.flush()?;
        tracing::info!("Report written to {}", report.display());
    }

    for failure in &summary.failures {
        eprintln!("  skipped {}: {}", failure.name, failure.error);
    }
    print_summary(&summary, start_time.elapsed());
    println!("{}", output_path.display());
    Ok(())
}

/// Drop files over the per-item ceiling with a warning instead of failing the batch.
fn skip_oversized(files: Vec<DiscoveredFile>, max_bytes: u64) -> Vec<DiscoveredFile> {
    files
        .into_iter()
        .filter(|f| {
            if f.size > max_bytes {
                tracing::warn!(
                    "Skipping {}: {} bytes exceeds the {} byte limit",
                    f.path.display(),
                    f.size,
                    max_bytes
                );
                false
            } else {
                true
            }
        })
        .collect()
}

/// Create a progress bar for batch processing.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb
}

/// Print a formatted summary table after batch processing.
fn print_summary(summary: &ArchiveSummary, elapsed: std::time::Duration) {
    let succeeded = summary.entries.len();
    let failed = summary.failures.len();
    let original = summary.original_bytes();
    let optimized = summary.optimized_bytes();
    let reduction = optipack_core::types::reduction_percent(original, optimized);
    let rate = if elapsed.as_secs_f64() > 0.0 {
        succeeded as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Archived:     {:>8}", succeeded);
    if failed > 0 {
        eprintln!("    Failed:       {:>8}", failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Original:     {:>7.1} MB", original as f64 / 1_000_000.0);
    eprintln!("    Optimized:    {:>7.1} MB", optimized as f64 / 1_000_000.0);
    eprintln!("    Reduction:    {:>7.1}%", reduction);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_oversized() {
        let files = vec![
            DiscoveredFile {
                path: PathBuf::from("small.png"),
                size: 10,
            },
            DiscoveredFile {
                path: PathBuf::from("big.png"),
                size: 11,
            },
        ];
        let kept = skip_oversized(files, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, PathBuf::from("small.png"));
    }

    #[test]
    fn test_report_arg_maps_to_core_format() {
        assert_eq!(ReportFormat::from(ReportArg::Json), ReportFormat::Json);
        assert_eq!(ReportFormat::from(ReportArg::Jsonl), ReportFormat::JsonLines);
    }
}
