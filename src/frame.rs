use std::path::{Component, Path, PathBuf};

use crate::convert::CompressionLevel;
use crate::error::FrameError;

/// Extension given to converted frames.
pub const OUTPUT_EXTENSION: &str = "png";

/// Width and height of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel size of a frame declared as `self` in packed 422 groups.
    pub fn expanded(self) -> Self {
        Self {
            width: self.width * 2,
            height: self.height,
        }
    }
}

/// One frame to convert, derived from a manifest frame record.
#[derive(Debug, Clone)]
pub struct FrameJob {
    /// Whether the record referenced `topImage` (as opposed to `bottomImage`)
    pub is_top_camera: bool,
    /// Absolute path of the raw packed file
    pub source_path: PathBuf,
    /// Manifest-relative path of the PNG, as written back into the manifest
    pub relative_output_path: String,
    /// Where the PNG is written
    pub absolute_output_path: PathBuf,
    /// Declared size in packed groups
    pub source_size: Size,
    /// Expanded size in pixels
    pub target_size: Size,
    pub compression: CompressionLevel,
}

impl FrameJob {
    /// Build a job for the manifest-relative `image` reference.
    pub fn new(
        is_top_camera: bool,
        image: &str,
        manifest_dir: &Path,
        output_dir: &Path,
        source_size: Size,
        compression: CompressionLevel,
    ) -> Self {
        let relative_output_path = output_relative_path(image);
        Self {
            is_top_camera,
            source_path: manifest_dir.join(image),
            absolute_output_path: output_dir.join(&relative_output_path),
            relative_output_path,
            source_size,
            target_size: source_size.expanded(),
            compression,
        }
    }

    /// Whether the referenced image already is a PNG, e.g. after a run that
    /// rewrote the manifest. Converting it again would truncate its only copy.
    pub fn is_already_converted(&self) -> bool {
        self.source_path == self.absolute_output_path
            || self
                .source_path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(OUTPUT_EXTENSION))
    }
}

/// Reject image references that are absolute or climb out of the manifest
/// directory; the same path is used below the output directory.
pub fn check_relative_reference(image: &str) -> Result<(), String> {
    let inside = Path::new(image)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if inside {
        Ok(())
    } else {
        Err(format!("image reference {image} must be relative to the manifest directory"))
    }
}

/// Swap the extension of a relative image reference for `png`, once.
///
/// A reference without an extension gets one appended.
pub fn output_relative_path(image: &str) -> String {
    Path::new(image)
        .with_extension(OUTPUT_EXTENSION)
        .to_string_lossy()
        .into_owned()
}

/// Outcome of one [`FrameJob`], referring to it by index.
#[derive(Debug)]
pub struct FrameResult {
    pub index: usize,
    pub outcome: Result<(), FrameError>,
}

impl FrameResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
