//! # replay2png - Replay Frame Converter Library
//!
//! `replay2png` converts the raw packed 422 camera frames of robot replay
//! recordings into PNG images.
//!
//! ## Features
//!
//! - Convert every frame referenced by a `replay.json` manifest
//! - Discover and convert whole collections of robot sessions
//! - Bounded pool of worker threads; one failed frame never stops the others
//! - Optionally rewrite the manifest to reference the new PNG files
//! - Progress reporting for integration with UI applications
//!
//! ## Example
//!
//! ```no_run
//! use replay2png::{Job, JobConfig, SessionJob};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JobConfig {
//!     workers: 4,
//!     rewrite_manifest: true,
//!     ..JobConfig::default()
//! };
//! let mut job = SessionJob::new("logs/replay_1/replay.json", "out/replay_1", config);
//! let summary = job.execute()?;
//! println!("{} of {} frames converted", summary.converted, summary.frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## Collections
//!
//! A collection root holds one directory per robot (`10.1.24.*`), each with a
//! single `replay_*` directory containing the manifest:
//!
//! ```no_run
//! use replay2png::{CollectionJob, Job, JobConfig};
//!
//! let mut job = CollectionJob::new("logs", "out", JobConfig::default());
//! let summary = job.execute().unwrap();
//! println!("{} sessions, {} failed frames", summary.sessions, summary.failed());
//! ```

pub mod collection;
pub mod config;
pub mod convert;
pub mod error;
pub mod frame;
pub mod job;
pub mod manifest;
pub mod pool;
pub mod session;

pub use collection::{discover_sessions, CollectionJob, Discovery, SessionLocation};
pub use config::{expand_home, AppConfig, SessionLayout};
pub use convert::{convert_frame, encode_png, expand_422, CompressionLevel};
pub use error::{Error, FrameError, FrameErrorKind, Result};
pub use frame::{FrameJob, FrameResult, Size};
pub use job::{FailedFrame, Job, JobConfig, Progress, ProgressFn, RunSummary};
pub use manifest::{Camera, FrameRecord, Manifest};
pub use pool::{convert_job, run_pool};
pub use session::{SessionJob, SessionState};
