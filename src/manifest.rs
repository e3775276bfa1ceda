//! The `replay.json` manifest.
//!
//! Only the image references and `imageSize422` of a frame record are
//! interpreted. Everything else (IMU samples, sonar, joint angles, ball
//! detection, ...) is kept as raw JSON values in their original key order so
//! a rewrite reproduces them unchanged.

use std::fs;
use std::path::Path;

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::frame::Size;

pub const TOP_IMAGE: &str = "topImage";
pub const BOTTOM_IMAGE: &str = "bottomImage";
pub const IMAGE_SIZE_422: &str = "imageSize422";

const CONFIG_KEYS: [&str; 2] = ["config", "Config"];
const FRAMES_KEYS: [&str; 2] = ["frames", "Frames"];

/// A loaded manifest.
///
/// The top-level object is kept as read, with unknown keys and key spelling
/// intact; only `frames` is parsed into records.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub frames: Vec<FrameRecord>,
    /// Top-level object; the frames entry is a placeholder while loaded
    document: Map<String, Value>,
    frames_key: String,
}

/// Which camera a frame was recorded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Camera {
    Top,
    Bottom,
}

/// One entry of `frames`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameRecord(Map<String, Value>);

impl FrameRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn top_image(&self) -> Option<&str> {
        self.non_empty_str(TOP_IMAGE)
    }

    pub fn bottom_image(&self) -> Option<&str> {
        self.non_empty_str(BOTTOM_IMAGE)
    }

    /// Replace `topImage`, keeping its position among the other keys.
    pub fn set_top_image(&mut self, path: impl Into<String>) {
        self.0.insert(TOP_IMAGE.to_string(), Value::String(path.into()));
    }

    /// The single image this record refers to.
    ///
    /// Exactly one of `topImage` and `bottomImage` must be a non-empty string.
    pub fn image(&self) -> std::result::Result<(Camera, &str), String> {
        match (self.top_image(), self.bottom_image()) {
            (Some(top), None) => Ok((Camera::Top, top)),
            (None, Some(bottom)) => Ok((Camera::Bottom, bottom)),
            (None, None) => Err("neither topImage nor bottomImage is set".to_string()),
            (Some(_), Some(_)) => Err("both topImage and bottomImage are set".to_string()),
        }
    }

    /// `imageSize422` as a size in packed groups.
    pub fn image_size_422(&self) -> std::result::Result<Size, String> {
        let dims = self
            .0
            .get(IMAGE_SIZE_422)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("{} is missing or not an array", IMAGE_SIZE_422))?;
        let dim = |v: &Value| v.as_u64().and_then(|n| u16::try_from(n).ok());
        match dims.as_slice() {
            [w, h] => match (dim(w), dim(h)) {
                (Some(w), Some(h)) => Ok(Size::new(u32::from(w), u32::from(h))),
                _ => Err(format!("{} must hold two u16 values", IMAGE_SIZE_422)),
            },
            _ => Err(format!("{} must have exactly two entries", IMAGE_SIZE_422)),
        }
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mut document: Map<String, Value> = Map::deserialize(deserializer)?;
        let frames_key = FRAMES_KEYS
            .iter()
            .find(|key| document.contains_key(**key))
            .ok_or_else(|| D::Error::missing_field("frames"))?
            .to_string();
        let raw = document
            .get_mut(frames_key.as_str())
            .map(Value::take)
            .unwrap_or(Value::Null);
        let frames = Vec::<FrameRecord>::deserialize(raw).map_err(D::Error::custom)?;
        Ok(Self {
            frames,
            document,
            frames_key,
        })
    }
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.document.len()))?;
        for (key, value) in &self.document {
            if *key == self.frames_key {
                map.serialize_entry(key, &self.frames)?;
            } else {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

impl Manifest {
    /// The `config` entry, under either spelling.
    pub fn config(&self) -> Option<&Value> {
        CONFIG_KEYS.iter().find_map(|key| self.document.get(*key))
    }

    /// A top-level entry other than the frames.
    pub fn get(&self, key: &str) -> Option<&Value> {
        if key == self.frames_key {
            None
        } else {
            self.document.get(key)
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path).map_err(|source| Error::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| Error::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overwrite `path` with this manifest as compact JSON.
    ///
    /// The document is fully serialized before the file is touched.
    pub fn save(&self, path: &Path) -> Result<()> {
        let save_err = |source| Error::ManifestSave {
            path: path.to_path_buf(),
            source,
        };
        let data = serde_json::to_vec(self).map_err(|e| save_err(e.into()))?;
        fs::write(path, data).map_err(save_err)
    }
}
