//! Session data model and the JSON session loader.
//!
//! A session is a time-ordered list of frames, each holding the clustered
//! radar detections observed at one timestamp. Detections are addressed by a
//! [`DetectionId`] (frame index, detection index) so later stages can refer
//! back to them without comparing coordinates.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use super::geometry::Point;

/// Errors that can occur while loading or validating session data.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid session file {path}: {reason}")]
    InvalidSession { path: PathBuf, reason: String },

    #[error("Malformed detection {index} at timestamp {timestamp}: {reason}")]
    MalformedDetection {
        timestamp: f64,
        index: usize,
        reason: String,
    },

    #[error("Duplicate timestamp: {0}")]
    DuplicateTimestamp(f64),

    #[error("Timestamps not strictly increasing: {previous} followed by {next}")]
    Unordered { previous: f64, next: f64 },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Stable identity of a detection within one [`MeasurementSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectionId {
    /// Index of the frame in time order.
    pub frame: usize,
    /// Index of the detection within its frame, in source order.
    pub index: usize,
}

/// One clustered radar return.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    /// Cluster size proxy.
    pub area: f64,
    /// Outline x coordinates, display only.
    pub polygon_x: Vec<f64>,
    /// Outline y coordinates, display only.
    pub polygon_y: Vec<f64>,
    /// Grey level assigned by color scaling, display only.
    pub color: Option<[u8; 3]>,
}

impl Detection {
    /// Creates a detection without an outline.
    pub fn new(x: f64, y: f64, area: f64) -> Self {
        Self {
            x,
            y,
            area,
            polygon_x: Vec::new(),
            polygon_y: Vec::new(),
            color: None,
        }
    }

    /// Creates a detection with an outline.
    pub fn with_polygon(x: f64, y: f64, area: f64, polygon_x: Vec<f64>, polygon_y: Vec<f64>) -> Self {
        Self {
            x,
            y,
            area,
            polygon_x,
            polygon_y,
            color: None,
        }
    }

    #[inline]
    pub fn position(&self) -> Point {
        [self.x, self.y]
    }
}

/// All detections observed at one timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: f64,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            timestamp,
            detections,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Time-ordered frames of one session.
///
/// Timestamps are strictly increasing. The set is read-only for the
/// detection stages; pre-processing produces new sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementSet {
    frames: Vec<Frame>,
}

impl MeasurementSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Builds a set from frames already in time order.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Unordered`] if timestamps are not strictly
    /// increasing.
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self> {
        for pair in frames.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(LoaderError::Unordered {
                    previous: pair[0].timestamp,
                    next: pair[1].timestamp,
                });
            }
        }
        Ok(Self { frames })
    }

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// The frame immediately after `index`, if any.
    #[inline]
    pub fn next_frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index + 1)
    }

    /// Returns the number of frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total number of detections over all frames.
    pub fn detection_count(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }

    pub fn detection(&self, id: DetectionId) -> Option<&Detection> {
        self.frames
            .get(id.frame)
            .and_then(|frame| frame.detections.get(id.index))
    }

    pub fn timestamp(&self, frame: usize) -> Option<f64> {
        self.frames.get(frame).map(|f| f.timestamp)
    }

    /// Iterates over every detection with its id, in time then source order.
    pub fn iter_detections(&self) -> impl Iterator<Item = (DetectionId, &Detection)> {
        self.frames.iter().enumerate().flat_map(|(frame, f)| {
            f.detections
                .iter()
                .enumerate()
                .map(move |(index, d)| (DetectionId { frame, index }, d))
        })
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }
}

/// Load a session exported as JSON.
///
/// The expected format is an object keyed by timestamp:
///
/// ```json
/// {
///   "Timestamp": "...",
///   "1692447761.25": [[x, y, area, [px0, px1, ...], [py0, py1, ...]], ...]
/// }
/// ```
///
/// Keys that are not numeric are bookkeeping entries and are skipped.
/// Detection arrays may carry extra trailing elements, which are ignored.
/// Frames are returned sorted by timestamp.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON, or any
/// detection is malformed.
pub fn load_session_json<P: AsRef<Path>>(path: P) -> Result<MeasurementSet> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let root: Value = serde_json::from_reader(BufReader::new(file))?;
    parse_session(&root, path)
}

/// Parse an already-decoded session document.
pub fn parse_session(root: &Value, path: &Path) -> Result<MeasurementSet> {
    let object = root.as_object().ok_or_else(|| LoaderError::InvalidSession {
        path: path.to_path_buf(),
        reason: "top level is not an object".to_string(),
    })?;

    let mut frames = Vec::with_capacity(object.len());

    for (key, value) in object {
        let timestamp = match key.trim().parse::<f64>() {
            Ok(t) if t.is_finite() => t,
            _ => {
                log::debug!("{}: skipping non-timestamp key '{}'", path.display(), key);
                continue;
            }
        };

        let entries = value.as_array().ok_or_else(|| LoaderError::InvalidSession {
            path: path.to_path_buf(),
            reason: format!("value at timestamp {} is not an array", key),
        })?;

        let detections = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| parse_detection(entry, timestamp, index))
            .collect::<Result<Vec<_>>>()?;

        frames.push(Frame::new(timestamp, detections));
    }

    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    for pair in frames.windows(2) {
        if pair[0].timestamp == pair[1].timestamp {
            return Err(LoaderError::DuplicateTimestamp(pair[0].timestamp));
        }
    }

    MeasurementSet::from_frames(frames)
}

fn parse_detection(entry: &Value, timestamp: f64, index: usize) -> Result<Detection> {
    let malformed = |reason: String| LoaderError::MalformedDetection {
        timestamp,
        index,
        reason,
    };

    let fields = entry
        .as_array()
        .ok_or_else(|| malformed("detection is not an array".to_string()))?;

    if fields.len() < 5 {
        return Err(malformed(format!(
            "expected at least 5 fields (x, y, area, polygon_x, polygon_y), found {}",
            fields.len()
        )));
    }

    let number = |i: usize, name: &str| -> Result<f64> {
        fields[i]
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(format!("{} is not a finite number", name)))
    };

    let x = number(0, "x")?;
    let y = number(1, "y")?;
    let area = number(2, "area")?;

    let outline = |i: usize, name: &str| -> Result<Vec<f64>> {
        let values = fields[i]
            .as_array()
            .ok_or_else(|| malformed(format!("{} is not an array", name)))?;
        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| malformed(format!("{} contains a non-numeric value", name)))
            })
            .collect()
    };

    let polygon_x = outline(3, "polygon_x")?;
    let polygon_y = outline(4, "polygon_y")?;

    if polygon_x.len() != polygon_y.len() {
        return Err(malformed(format!(
            "polygon_x has {} values but polygon_y has {}",
            polygon_x.len(),
            polygon_y.len()
        )));
    }

    Ok(Detection::with_polygon(x, y, area, polygon_x, polygon_y))
}
