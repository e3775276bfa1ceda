//! Error types for `replay2png`.
//!
//! Two severities exist. [`Error`] aborts the whole run: manifest I/O,
//! discovery, invalid records and configuration problems. [`FrameError`] is
//! scoped to a single frame; it is captured in a [`crate::FrameResult`] and
//! never stops the other frames of a session.

use std::io;
use std::path::PathBuf;

use image::ImageError;
use thiserror::Error;

/// Convenience alias for results carrying a fatal [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors. Any of these terminates the run.
#[derive(Debug, Error)]
pub enum Error {
    /// The collection root could not be listed.
    #[error("failed to list collection root {path}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A session directory does not contain a usable manifest.
    #[error("no manifest could be found in {dir}: {reason}")]
    ManifestNotFound { dir: PathBuf, reason: String },

    /// The manifest file could not be read.
    #[error("failed to read manifest {path}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The manifest file is not valid manifest JSON.
    #[error("failed to parse manifest {path}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The rewritten manifest could not be serialized or written.
    #[error("failed to save manifest {path}")]
    ManifestSave {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A frame record violates the manifest's shape rules.
    #[error("frame record {index} is invalid: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// The output directory could not be created.
    #[error("failed to create output directory {path}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A configuration value is out of range or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A job operation was called out of order.
    #[error("job is {found}, expected {expected}")]
    JobState {
        expected: &'static str,
        found: &'static str,
    },
}

/// Field-less mirror of [`FrameError`], used for summaries and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameErrorKind {
    SourceOpen,
    SourceRead,
    DestinationCreate,
    DestinationWrite,
    MalformedFrame,
    Encode,
}

/// Errors that affect a single frame only.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("failed to open source {path}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read source {path}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create destination {path}")]
    DestinationCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write destination {path}")]
    DestinationWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The raw buffer does not describe a frame of the declared size.
    #[error("malformed frame: {actual} bytes do not form a {width}x{height} frame ({expected} bytes expected)")]
    MalformedFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("failed to encode png")]
    Encode(#[source] ImageError),
}

impl FrameError {
    pub fn kind(&self) -> FrameErrorKind {
        match self {
            FrameError::SourceOpen { .. } => FrameErrorKind::SourceOpen,
            FrameError::SourceRead { .. } => FrameErrorKind::SourceRead,
            FrameError::DestinationCreate { .. } => FrameErrorKind::DestinationCreate,
            FrameError::DestinationWrite { .. } => FrameErrorKind::DestinationWrite,
            FrameError::MalformedFrame { .. } => FrameErrorKind::MalformedFrame,
            FrameError::Encode(_) => FrameErrorKind::Encode,
        }
    }
}

/// Formats an error with its whole `source()` chain, `a: b: c`.
pub fn display_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut cur = err.source();
    while let Some(cause) = cur {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        cur = cause.source();
    }
    out
}
