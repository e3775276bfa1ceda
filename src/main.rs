use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use replay2png::{
    expand_home, AppConfig, CollectionJob, CompressionLevel, Job, JobConfig, Progress, RunSummary,
    SessionJob,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(version, about = "Convert raw 422 replay frames to PNG images.")]
struct Args {
    /// A replay.json, a directory containing one, or a root with many robot sessions
    #[arg(short, long, default_value = ".")]
    input: PathBuf,

    /// Where to put the PNG files (defaults to next to the source frames)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of frames converted concurrently
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// PNG compression: default, none, fast, best (or 0, -1, -2, -3)
    #[arg(short, long, allow_hyphen_values = true)]
    compression: Option<CompressionLevel>,

    /// Rewrite topImage entries of the original replay.json to the new PNGs
    #[arg(short, long, default_value_t = false)]
    modify_original: bool,

    /// Exit with an error if any frame failed to convert
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Config file (defaults to replay2png.json in the data dir or current dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show a progress bar instead of per-frame log lines
    #[arg(long, default_value_t = false)]
    progress: bool,

    /// Debug logging
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn init_logging(args: &Args) {
    // RUST_LOG wins; otherwise pick a level from the flags
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if args.verbose {
            "replay2png=debug".to_string()
        } else if args.progress {
            "replay2png=warn".to_string()
        } else {
            "replay2png=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<AppConfig> {
    match &args.config {
        Some(path) => AppConfig::from_file(&expand_home(path)),
        None => AppConfig::discover(),
    }
}

/// Progress callback driving one bar per session.
fn progress_bar() -> Arc<dyn Fn(Progress) + Send + Sync> {
    let bar: Arc<Mutex<Option<ProgressBar>>> = Arc::new(Mutex::new(None));
    Arc::new(move |progress: Progress| {
        let Ok(mut guard) = bar.lock() else { return };
        if progress.completed == 0 {
            let pb = ProgressBar::new(progress.total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message("Converting frames");
            *guard = Some(pb);
        }
        if let Some(pb) = guard.as_ref() {
            pb.set_position(progress.completed as u64);
            if progress.completed >= progress.total {
                pb.finish_with_message("Done");
            }
        }
    })
}

/// Pick the job for `input`: a manifest file or its directory gives one
/// session, any other directory is treated as a collection root.
fn build_job(input: &Path, output: Option<PathBuf>, cfg: JobConfig, progress: bool) -> Result<Box<dyn Job>> {
    let manifest_in_dir = input.join(&cfg.layout.manifest_name);
    let manifest = if input.is_file() {
        Some(input.to_path_buf())
    } else if manifest_in_dir.is_file() {
        Some(manifest_in_dir)
    } else {
        None
    };

    let job: Box<dyn Job> = match manifest {
        Some(manifest) => {
            let output = match output {
                Some(o) => o,
                None => manifest
                    .parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| anyhow!("manifest {} has no parent directory", manifest.display()))?,
            };
            let mut job = SessionJob::new(manifest, output, cfg);
            if progress {
                job = job.with_progress(progress_bar());
            }
            Box::new(job)
        }
        None => {
            let output = output.unwrap_or_else(|| input.to_path_buf());
            let mut job = CollectionJob::new(input, output, cfg);
            if progress {
                job = job.with_progress(progress_bar());
            }
            Box::new(job)
        }
    };
    Ok(job)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Sessions: {}  Frames: {}  Converted: {}  Skipped: {}  Failed: {}",
        summary.sessions,
        summary.frames,
        summary.converted,
        summary.skipped,
        summary.failed()
    );
    for failure in &summary.failures {
        println!("  failed: {}: {}", failure.source.display(), failure.message);
    }
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();
    init_logging(&args);

    let file_cfg = load_config(&args)?;
    let workers = args.jobs.or(file_cfg.jobs).unwrap_or_else(replay2png::config::default_workers);
    let compression = match args.compression {
        Some(c) => c,
        None => file_cfg.compression_level()?,
    };
    let cfg = JobConfig {
        workers,
        compression,
        rewrite_manifest: args.modify_original,
        layout: file_cfg.layout.clone(),
    };
    cfg.validate()?;

    let input = expand_home(&args.input);
    let input = fs::canonicalize(&input).with_context(|| format!("resolving input {}", input.display()))?;
    let output = args.output.as_deref().map(expand_home);

    let mut job = build_job(&input, output, cfg, args.progress)?;
    let summary = job.execute()?;

    print_summary(&summary);
    println!("Finished converting after {:.2?}!", start_time.elapsed());

    if args.strict && summary.failed() > 0 {
        return Err(anyhow!("{} frame(s) failed to convert", summary.failed()));
    }
    Ok(())
}
