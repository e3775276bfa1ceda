use std::path::PathBuf;
use std::sync::Arc;

use crate::config::SessionLayout;
use crate::convert::CompressionLevel;
use crate::error::{Error, Result};

/// Settings shared by every job of a run.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Upper bound on concurrent frame conversions
    pub workers: usize,
    pub compression: CompressionLevel,
    /// Write converted top-camera paths back into the manifest
    pub rewrite_manifest: bool,
    pub layout: SessionLayout,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            workers: crate::config::default_workers(),
            compression: CompressionLevel::Default,
            rewrite_manifest: false,
            layout: SessionLayout::default(),
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("worker count must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Progress of a session's conversion.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Frames with a result so far
    pub completed: usize,
    pub total: usize,
    /// 0.0 to 100.0
    pub percentage: f64,
    pub message: String,
}

impl Progress {
    pub fn converting_frames(completed: usize, total: usize) -> Self {
        let percentage = if total > 0 {
            (completed as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            completed,
            total,
            percentage,
            message: format!("Converting frame {} of {}", completed, total),
        }
    }
}

/// Callback receiving [`Progress`] updates.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// A frame that could not be converted.
#[derive(Debug, Clone)]
pub struct FailedFrame {
    pub source: PathBuf,
    pub message: String,
}

/// Counters aggregated over one or more sessions.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sessions: usize,
    pub frames: usize,
    pub converted: usize,
    /// Frames whose manifest entry already referenced a PNG
    pub skipped: usize,
    pub failures: Vec<FailedFrame>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.sessions += other.sessions;
        self.frames += other.frames;
        self.converted += other.converted;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }
}

/// The lifecycle shared by collection and session jobs.
///
/// `pre_prepare` applies the static configuration given at construction,
/// `prepare` loads state from disk and `run` does the work.
pub trait Job {
    fn pre_prepare(&mut self) -> Result<()>;

    fn prepare(&mut self) -> Result<()>;

    fn run(&mut self) -> Result<RunSummary>;

    /// All three phases in order.
    fn execute(&mut self) -> Result<RunSummary> {
        self.pre_prepare()?;
        self.prepare()?;
        self.run()
    }
}
