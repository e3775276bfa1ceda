//! Discovery and sequential processing of many sessions under one root.
//!
//! Layout on disk:
//!
//! ```text
//! root/
//!   10.1.24.33/            session dir (session_prefix)
//!     replay_2019-05-02/   session-data dir (session_data_prefix)
//!       replay.json        manifest (manifest_name)
//!       *.422
//! ```

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SessionLayout;
use crate::error::{display_chain, Error, Result};
use crate::job::{Job, JobConfig, ProgressFn, RunSummary};
use crate::session::SessionJob;

/// A session found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLocation {
    /// Session directory name, e.g. `10.1.24.33`
    pub name: String,
    /// Path of the session-data dir relative to the root
    pub relative_dir: PathBuf,
    pub manifest_path: PathBuf,
}

/// Result of scanning a collection root.
#[derive(Debug, Default)]
pub struct Discovery {
    pub sessions: Vec<SessionLocation>,
    /// Session directories that were skipped, as `ManifestNotFound` errors
    pub skipped: Vec<Error>,
}

fn child_dirs(dir: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter(|e| e.as_ref().map(|e| e.file_type().is_dir()).unwrap_or(true))
}

fn name_of(entry: &walkdir::DirEntry) -> String {
    entry.file_name().to_string_lossy().into_owned()
}

/// Scan the immediate children of `root` for sessions.
///
/// Fails only if `root` itself cannot be listed. Unreadable children, such
/// as dangling symlinks, are logged and ignored; problems inside a single
/// session directory are reported in [`Discovery::skipped`].
pub fn discover_sessions(root: &Path, layout: &SessionLayout) -> Result<Discovery> {
    let discovery_err = |source| Error::Discovery {
        path: root.to_path_buf(),
        source,
    };
    if !root.is_dir() {
        return Err(discovery_err(io::Error::new(
            io::ErrorKind::NotFound,
            "not a directory",
        )));
    }

    let mut found = Discovery::default();
    for entry in child_dirs(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                warn!("Ignoring unreadable entry in {}: {}", root.display(), e);
                continue;
            }
            Err(e) => return Err(discovery_err(e.into())),
        };
        let name = name_of(&entry);
        debug!("Checking {} ...", name);
        if !name.starts_with(&layout.session_prefix) {
            continue;
        }
        match locate_manifest(entry.path(), layout) {
            Ok((data_dir, manifest_path)) => found.sessions.push(SessionLocation {
                relative_dir: PathBuf::from(&name).join(data_dir),
                name,
                manifest_path,
            }),
            Err(e) => found.skipped.push(e),
        }
    }
    Ok(found)
}

/// Find the unique session-data dir in `session_dir` and its manifest.
fn locate_manifest(session_dir: &Path, layout: &SessionLayout) -> Result<(String, PathBuf)> {
    let not_found = |reason: String| Error::ManifestNotFound {
        dir: session_dir.to_path_buf(),
        reason,
    };

    let mut candidates = Vec::new();
    for entry in child_dirs(session_dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                debug!("Ignoring unreadable entry in {}: {}", session_dir.display(), e);
                continue;
            }
            Err(e) => return Err(not_found(e.to_string())),
        };
        let name = name_of(&entry);
        if name.starts_with(&layout.session_data_prefix) {
            candidates.push(name);
        }
    }

    let data_dir = match candidates.len() {
        0 => {
            return Err(not_found(format!(
                "no {}* directory",
                layout.session_data_prefix
            )))
        }
        1 => candidates.remove(0),
        _ => {
            return Err(not_found(format!(
                "{}* is ambiguous: {}",
                layout.session_data_prefix,
                candidates.join(", ")
            )))
        }
    };

    let manifest_path = session_dir.join(&data_dir).join(&layout.manifest_name);
    if !manifest_path.is_file() {
        return Err(not_found(format!("{} is missing", manifest_path.display())));
    }
    Ok((data_dir, manifest_path))
}

/// Runs one [`SessionJob`] per session found under a root, one after another.
pub struct CollectionJob {
    root: PathBuf,
    output_root: PathBuf,
    config: JobConfig,
    queue: VecDeque<SessionJob>,
    progress: Option<ProgressFn>,
}

impl CollectionJob {
    pub fn new(root: impl Into<PathBuf>, output_root: impl Into<PathBuf>, config: JobConfig) -> Self {
        Self {
            root: root.into(),
            output_root: output_root.into(),
            config,
            queue: VecDeque::new(),
            progress: None,
        }
    }

    /// Progress callback handed to every session.
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sessions still waiting to run.
    pub fn pending(&self) -> impl Iterator<Item = &SessionJob> {
        self.queue.iter()
    }
}

impl Job for CollectionJob {
    /// Discovers sessions and pre-prepares a job for each. The queue is
    /// complete once this returns.
    fn pre_prepare(&mut self) -> Result<()> {
        info!("Building jobs for {} ...", self.root.display());
        self.config.validate()?;
        let discovery = discover_sessions(&self.root, &self.config.layout)?;

        for skipped in &discovery.skipped {
            warn!("Skipping session: {}", display_chain(skipped));
        }
        for location in discovery.sessions {
            info!("Building job for {} ...", location.name);
            let mut job = SessionJob::new(
                location.manifest_path,
                self.output_root.join(&location.relative_dir),
                self.config.clone(),
            );
            if let Some(progress) = &self.progress {
                job = job.with_progress(progress.clone());
            }
            job.pre_prepare()?;
            self.queue.push_back(job);
        }

        if self.queue.is_empty() {
            warn!(
                "No sessions matching {}* found in {}",
                self.config.layout.session_prefix,
                self.root.display()
            );
        }
        info!("Building jobs... done ({} sessions)", self.queue.len());
        Ok(())
    }

    /// Loads every queued manifest, so an invalid record anywhere in the
    /// collection stops the run before the first frame is converted.
    fn prepare(&mut self) -> Result<()> {
        for session in &mut self.queue {
            session.prepare()?;
        }
        Ok(())
    }

    fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        while let Some(mut session) = self.queue.pop_front() {
            summary.merge(session.run()?);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_session(root: &Path, name: &str, data_dirs: &[&str], with_manifest: bool) {
        for data in data_dirs {
            let dir = root.join(name).join(data);
            fs::create_dir_all(&dir).unwrap();
            if with_manifest {
                fs::write(dir.join("replay.json"), br#"{"config":[],"frames":[]}"#).unwrap();
            }
        }
        if data_dirs.is_empty() {
            fs::create_dir_all(root.join(name)).unwrap();
        }
    }

    #[test]
    fn finds_matching_sessions_in_name_order() {
        let tmp = TempDir::new().unwrap();
        make_session(tmp.path(), "10.1.24.35", &["replay_b"], true);
        make_session(tmp.path(), "10.1.24.33", &["replay_a"], true);
        make_session(tmp.path(), "other", &["replay_c"], true);
        fs::write(tmp.path().join("10.1.24.99"), b"not a dir").unwrap();

        let found = discover_sessions(tmp.path(), &SessionLayout::default()).unwrap();
        let names: Vec<_> = found.sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["10.1.24.33", "10.1.24.35"]);
        assert_eq!(found.sessions[0].relative_dir, PathBuf::from("10.1.24.33/replay_a"));
        assert_eq!(
            found.sessions[0].manifest_path,
            tmp.path().join("10.1.24.33/replay_a/replay.json")
        );
        assert!(found.skipped.is_empty());
    }

    #[test]
    fn incomplete_sessions_are_skipped() {
        let tmp = TempDir::new().unwrap();
        make_session(tmp.path(), "10.1.24.1", &[], false);
        make_session(tmp.path(), "10.1.24.2", &["replay_a"], false);
        make_session(tmp.path(), "10.1.24.3", &["replay_a", "replay_b"], true);
        make_session(tmp.path(), "10.1.24.4", &["replay_a"], true);

        let found = discover_sessions(tmp.path(), &SessionLayout::default()).unwrap();
        assert_eq!(found.sessions.len(), 1);
        assert_eq!(found.skipped.len(), 3);
        assert!(found
            .skipped
            .iter()
            .all(|e| matches!(e, Error::ManifestNotFound { .. })));
    }

    #[test]
    fn unlistable_root_is_a_discovery_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            discover_sessions(&missing, &SessionLayout::default()),
            Err(Error::Discovery { .. })
        ));
    }

    #[test]
    fn queue_is_built_before_running() {
        let tmp = TempDir::new().unwrap();
        make_session(tmp.path(), "10.1.24.33", &["replay_a"], true);
        make_session(tmp.path(), "10.1.24.34", &["replay_a"], true);
        let out = tmp.path().join("out");

        let mut job = CollectionJob::new(tmp.path(), &out, JobConfig::default());
        job.pre_prepare().unwrap();
        assert_eq!(job.pending().count(), 2);
        assert!(out.join("10.1.24.33/replay_a").is_dir());
        assert!(out.join("10.1.24.34/replay_a").is_dir());

        job.prepare().unwrap();
        let summary = job.run().unwrap();
        assert_eq!(summary.sessions, 2);
        assert_eq!(job.pending().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlinks_do_not_abort_discovery() {
        let tmp = TempDir::new().unwrap();
        make_session(tmp.path(), "10.1.24.33", &["replay_a"], true);
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("10.1.24.99")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone"), tmp.path().join("zz_dangling")).unwrap();
        std::os::unix::fs::symlink(
            tmp.path().join("gone"),
            tmp.path().join("10.1.24.33").join("replay_zz"),
        )
        .unwrap();

        let found = discover_sessions(tmp.path(), &SessionLayout::default()).unwrap();
        assert_eq!(found.sessions.len(), 1);
        assert_eq!(found.sessions[0].name, "10.1.24.33");

        let out = tmp.path().join("out");
        let summary = CollectionJob::new(tmp.path(), &out, JobConfig::default())
            .execute()
            .unwrap();
        assert_eq!(summary.sessions, 1);
    }

    #[test]
    fn invalid_record_in_any_session_stops_before_converting() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("10.1.24.33").join("replay_a");
        fs::create_dir_all(&good).unwrap();
        fs::write(good.join("a.422"), [0u8; 4]).unwrap();
        fs::write(
            good.join("replay.json"),
            br#"{"frames":[{"topImage":"a.422","imageSize422":[1,1]}]}"#,
        )
        .unwrap();
        let bad = tmp.path().join("10.1.24.34").join("replay_b");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("replay.json"), br#"{"frames":[{"imageSize422":[1,1]}]}"#).unwrap();

        let mut job = CollectionJob::new(tmp.path(), tmp.path(), JobConfig::default());
        job.pre_prepare().unwrap();
        assert!(matches!(job.prepare(), Err(Error::InvalidRecord { index: 0, .. })));
        assert!(!good.join("a.png").exists());
    }

    #[test]
    fn custom_layout_is_honoured() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("robot-7").join("log_1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("frames.json"), br#"{"frames":[]}"#).unwrap();

        let layout = SessionLayout {
            session_prefix: "robot-".into(),
            session_data_prefix: "log_".into(),
            manifest_name: "frames.json".into(),
        };
        let found = discover_sessions(tmp.path(), &layout).unwrap();
        assert_eq!(found.sessions.len(), 1);
        assert_eq!(found.sessions[0].manifest_path, dir.join("frames.json"));
    }
}
