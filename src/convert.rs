//! Packed 422 to RGBA expansion and PNG encoding.
//!
//! A packed group is four bytes `(y1, u, y2, v)` describing two horizontally
//! adjacent pixels. Each group becomes the RGBA pixels `(y1, u, v, 255)` and
//! `(y2, u, v, 255)`. The channels are copied as-is; no color-space
//! conversion happens, and downstream tooling relies on that layout.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::{Error, FrameError};
use crate::frame::Size;

/// Bytes per packed pixel pair.
pub const PACKED_GROUP_LEN: usize = 4;

const OPAQUE: u8 = u8::MAX;

/// PNG compression setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompressionLevel {
    #[default]
    Default,
    NoCompression,
    BestSpeed,
    BestCompression,
}

impl CompressionLevel {
    /// Codec settings used for this level.
    pub fn png_settings(self) -> (CompressionType, FilterType) {
        match self {
            CompressionLevel::Default => (CompressionType::Default, FilterType::Adaptive),
            // The encoder has no stored-block mode; fast deflate without
            // filtering is the closest it offers.
            CompressionLevel::NoCompression => (CompressionType::Fast, FilterType::NoFilter),
            CompressionLevel::BestSpeed => (CompressionType::Fast, FilterType::Adaptive),
            CompressionLevel::BestCompression => (CompressionType::Best, FilterType::Adaptive),
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionLevel::Default => "default",
            CompressionLevel::NoCompression => "none",
            CompressionLevel::BestSpeed => "fast",
            CompressionLevel::BestCompression => "best",
        };
        f.write_str(name)
    }
}

/// Accepts the level names as well as the legacy integer codes
/// `0` (default), `-1` (none), `-2` (fast) and `-3` (best).
impl FromStr for CompressionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "0" => Ok(CompressionLevel::Default),
            "none" | "no-compression" | "-1" => Ok(CompressionLevel::NoCompression),
            "fast" | "best-speed" | "-2" => Ok(CompressionLevel::BestSpeed),
            "best" | "best-compression" | "-3" => Ok(CompressionLevel::BestCompression),
            other => Err(Error::Config(format!(
                "unknown compression level '{}' (expected default, none, fast, best or 0..-3)",
                other
            ))),
        }
    }
}

/// Expand a packed 422 buffer into an RGBA image of `target` size.
///
/// `target` is the expanded size, so its width must be even and the buffer
/// must hold exactly `target.width / 2 * target.height` groups.
pub fn expand_422(raw: &[u8], target: Size) -> Result<RgbaImage, FrameError> {
    let malformed = || FrameError::MalformedFrame {
        width: target.width,
        height: target.height,
        expected: target.width as usize / 2 * target.height as usize * PACKED_GROUP_LEN,
        actual: raw.len(),
    };

    let out_len = target.width as usize * target.height as usize * 4;
    if target.width % 2 != 0 || raw.len() % PACKED_GROUP_LEN != 0 || raw.len() * 2 != out_len {
        return Err(malformed());
    }

    let mut pixels = Vec::with_capacity(out_len);
    for group in raw.chunks_exact(PACKED_GROUP_LEN) {
        let (y1, u, y2, v) = (group[0], group[1], group[2], group[3]);
        pixels.extend_from_slice(&[y1, u, v, OPAQUE, y2, u, v, OPAQUE]);
    }

    RgbaImage::from_raw(target.width, target.height, pixels).ok_or_else(malformed)
}

/// Encode an RGBA image as PNG.
pub fn encode_png<W: Write>(writer: W, image: &RgbaImage, level: CompressionLevel) -> Result<(), FrameError> {
    let (compression, filter) = level.png_settings();
    PngEncoder::new_with_quality(writer, compression, filter)
        .write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
        .map_err(FrameError::Encode)
}

/// Convert a raw packed frame to PNG, writing the encoded stream to `writer`.
///
/// The buffer is validated before anything is written.
pub fn convert_frame<W: Write>(raw: &[u8], writer: W, target: Size, level: CompressionLevel) -> Result<(), FrameError> {
    let image = expand_422(raw, target)?;
    encode_png(writer, &image, level)
}
