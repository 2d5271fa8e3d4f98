//! Offline detection of merged radar measurements.
//!
//! Two close, persistent radar returns sometimes show up as a single larger
//! return for one scan before splitting again. This crate finds those events
//! in recorded sessions of clustered detections:
//! - Loading JSON sessions and filtering them to a region of interest
//! - Linking detections into short tracks
//! - Finding close measurement pairs and predicting merges in the next scan
//! - Discarding merges that are really one object, using track continuity
//! - Exporting results as CSV and PNG
//!
//! # Example
//!
//! ```no_run
//! use merged_measurement::{core::loaders::load_session_json, MergeDetector, PipelineConfig};
//!
//! let raw = load_session_json("rosbag_2023-08-19-14-22-41.json").unwrap();
//! let detector = MergeDetector::new(PipelineConfig::default());
//! let report = detector.detect(&detector.preprocess(&raw));
//! println!("{} merged measurements", report.merges.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use crate::config::{ClosePairConfig, OutputConfig, PipelineConfig, RegionConfig, TrackingConfig};
pub use crate::core::loaders::{Detection, DetectionId, Frame, MeasurementSet};
pub use crate::processors::pipeline::{DetectionReport, MergeDetector};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
