//! Merge detection stages.

pub mod close_pairs;
pub mod false_positives;
pub mod merging;
pub mod pipeline;
pub mod registry;
pub mod tracking;

// Re-export key types for convenience
pub use close_pairs::{find_close_pairs, CloseMeasurementPair, DetectionRef};
pub use false_positives::{FalsePositiveFilter, FalsePositiveReason, FilterVerdict};
pub use merging::{predict_merge, predict_merges, MergeMeasurement, Prediction, PredictionSummary};
pub use pipeline::{
    collect_session_files, process_batch, process_session, BatchOptions, BatchOutcome,
    DetectionReport, MergeDetector, SessionOutcome,
};
pub use registry::{
    collect_recorded_sessions, FileRegistry, MemoryRegistry, ProcessedRegistry, RegistryError,
};
pub use tracking::{
    build_tracks, Assignment, AssignmentPolicy, GreedyNearestPolicy, Track, TrackBuilder,
    TrackId, TrackIndex, TrackSample,
};
