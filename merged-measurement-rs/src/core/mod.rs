//! Core data types, geometry and I/O operations.

pub mod geometry;
pub mod loaders;
pub mod transforms;
pub mod writers;

pub use geometry::{distance, point_in_polygon, BoundingCircle, Point};
pub use loaders::{load_session_json, Detection, DetectionId, Frame, LoaderError, MeasurementSet};
pub use writers::{write_merges_csv, write_track_summary_csv, write_tracks_csv, WriteError};
