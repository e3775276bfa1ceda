//! One recording session: a manifest and the raw frames it references.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::{display_chain, Error, Result};
use crate::frame::{check_relative_reference, FrameJob, FrameResult};
use crate::job::{FailedFrame, Job, JobConfig, Progress, ProgressFn, RunSummary};
use crate::manifest::{Camera, Manifest};
use crate::pool::run_pool;

/// Lifecycle of a [`SessionJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    /// Output directory exists
    Configured,
    /// Manifest loaded and frame jobs derived
    Prepared,
    Running,
    Done,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            SessionState::Created => "created",
            SessionState::Configured => "configured",
            SessionState::Prepared => "prepared",
            SessionState::Running => "running",
            SessionState::Done => "done",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts every frame of one manifest.
pub struct SessionJob {
    manifest_path: PathBuf,
    manifest_dir: PathBuf,
    output_dir: PathBuf,
    name: String,
    config: JobConfig,
    state: SessionState,
    manifest: Option<Manifest>,
    frames: Vec<FrameJob>,
    /// Manifest record index of each entry in `frames`
    records: Vec<usize>,
    skipped: usize,
    progress: Option<ProgressFn>,
}

impl SessionJob {
    pub fn new(manifest_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, config: JobConfig) -> Self {
        let manifest_path = manifest_path.into();
        let manifest_dir = match manifest_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = session_name(&manifest_dir);
        Self {
            manifest_path,
            manifest_dir,
            output_dir: output_dir.into(),
            name,
            config,
            state: SessionState::Created,
            manifest: None,
            frames: Vec::new(),
            records: Vec::new(),
            skipped: 0,
            progress: None,
        }
    }

    /// Report progress after every collected frame result.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames(&self) -> &[FrameJob] {
        &self.frames
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    fn expect_state(&self, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::JobState {
                expected: expected.as_str(),
                found: self.state.as_str(),
            })
        }
    }

    fn derive_frames(&self, manifest: &Manifest) -> Result<Vec<(usize, FrameJob)>> {
        manifest
            .frames
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let invalid = |reason| Error::InvalidRecord { index, reason };
                let (camera, image) = record.image().map_err(invalid)?;
                check_relative_reference(image).map_err(invalid)?;
                let size = record.image_size_422().map_err(invalid)?;
                let job = FrameJob::new(
                    camera == Camera::Top,
                    image,
                    &self.manifest_dir,
                    &self.output_dir,
                    size,
                    self.config.compression,
                );
                Ok((index, job))
            })
            .collect()
    }

    fn log_result(&self, job: &FrameJob, result: &FrameResult) {
        match &result.outcome {
            Ok(()) => info!(
                session = %self.name,
                "[success] {} -> {}",
                file_name(&job.source_path),
                job.absolute_output_path.display()
            ),
            Err(e) => error!(
                session = %self.name,
                kind = ?e.kind(),
                "conversion unsuccessful for {}: {}",
                job.source_path.display(),
                display_chain(e)
            ),
        }
    }

    /// Point `topImage` of every converted top-camera frame at its PNG and
    /// overwrite the manifest. `bottomImage` is never touched.
    fn rewrite_manifest(&mut self, results: &[FrameResult]) -> Result<()> {
        let manifest = self.manifest.as_mut().ok_or(Error::JobState {
            expected: SessionState::Prepared.as_str(),
            found: SessionState::Created.as_str(),
        })?;

        let mut patched = 0usize;
        for result in results.iter().filter(|r| r.is_success()) {
            let job = &self.frames[result.index];
            if job.is_top_camera {
                manifest.frames[self.records[result.index]].set_top_image(job.relative_output_path.clone());
                patched += 1;
            }
        }

        manifest.save(&self.manifest_path)?;
        info!(
            session = %self.name,
            patched,
            "rewrote {}",
            self.manifest_path.display()
        );
        Ok(())
    }
}

impl Job for SessionJob {
    fn pre_prepare(&mut self) -> Result<()> {
        self.expect_state(SessionState::Created)?;
        self.config.validate()?;
        fs::create_dir_all(&self.output_dir).map_err(|source| Error::OutputDir {
            path: self.output_dir.clone(),
            source,
        })?;
        info!("Using {} as output dir for {}", self.output_dir.display(), self.name);
        self.state = SessionState::Configured;
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        self.expect_state(SessionState::Configured)?;
        info!("Loading {} for {}", self.manifest_path.display(), self.name);
        let manifest = Manifest::load(&self.manifest_path)?;
        let (done, pending): (Vec<_>, Vec<_>) = self
            .derive_frames(&manifest)?
            .into_iter()
            .partition(|(_, job)| job.is_already_converted());
        for (record, job) in &done {
            info!(
                session = %self.name,
                record = *record,
                "{} is already converted, skipping",
                job.source_path.display()
            );
        }
        self.skipped = done.len();
        (self.records, self.frames) = pending.into_iter().unzip();
        self.manifest = Some(manifest);
        self.state = SessionState::Prepared;
        Ok(())
    }

    fn run(&mut self) -> Result<RunSummary> {
        self.expect_state(SessionState::Prepared)?;
        self.state = SessionState::Running;

        let total = self.frames.len();
        info!(
            session = %self.name,
            frames = total,
            workers = self.config.workers,
            "converting frames"
        );

        let mut completed = 0usize;
        let progress = self.progress.clone();
        if let Some(cb) = &progress {
            cb(Progress::converting_frames(0, total));
        }
        let results = run_pool(&self.frames, self.config.workers, |job, result| {
            completed += 1;
            self.log_result(job, result);
            if let Some(cb) = &progress {
                cb(Progress::converting_frames(completed, total));
            }
        });

        let mut summary = RunSummary {
            sessions: 1,
            frames: total + self.skipped,
            skipped: self.skipped,
            ..RunSummary::default()
        };
        for result in &results {
            match &result.outcome {
                Ok(()) => summary.converted += 1,
                Err(e) => summary.failures.push(FailedFrame {
                    source: self.frames[result.index].source_path.clone(),
                    message: display_chain(e),
                }),
            }
        }
        info!(
            session = %self.name,
            converted = summary.converted,
            skipped = summary.skipped,
            failed = summary.failed(),
            "session finished"
        );

        if self.config.rewrite_manifest {
            self.rewrite_manifest(&results)?;
        }

        self.state = SessionState::Done;
        Ok(summary)
    }
}

/// Display name of a session: the directory holding the session-data dir,
/// e.g. `10.1.24.33` for `.../10.1.24.33/replay_x/replay.json`.
fn session_name(manifest_dir: &Path) -> String {
    manifest_dir
        .parent()
        .and_then(Path::file_name)
        .or_else(|| manifest_dir.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| manifest_dir.display().to_string())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
