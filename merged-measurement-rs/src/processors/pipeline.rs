//! Merged measurement detection for whole sessions.
//!
//! [`MergeDetector`] runs the detection stages over one in-memory session:
//!
//! 1. **Tracks**: greedy linking of detections over time
//! 2. **Close pairs**: simultaneous detections near each other
//! 3. **Prediction**: a single larger detection inside the pair's circle in
//!    the next frame
//! 4. **Filtering**: drop merges whose points all belong to one track
//!
//! [`process_session`] and [`process_batch`] wrap this with loading,
//! pre-processing, export and registry bookkeeping. Sessions are independent,
//! so batches run in parallel; each session's stages run in sequence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::PipelineConfig;
use crate::core::loaders::{load_session_json, MeasurementSet};
use crate::core::transforms::{apply_color_scaling, filter_to_region};
use crate::core::writers::{write_merges_csv, write_track_summary_csv, write_tracks_csv};
use crate::processors::close_pairs::{find_close_pairs, CloseMeasurementPair};
use crate::processors::false_positives::FalsePositiveFilter;
use crate::processors::merging::{predict_merges, MergeMeasurement};
use crate::processors::registry::{is_json, ProcessedRegistry};
use crate::processors::tracking::{build_tracks, Track};
use crate::visualization::{self, FrameWindow};

/// Everything the detector found in one session.
#[derive(Debug, Clone, Default)]
pub struct DetectionReport {
    pub tracks: Vec<Track>,
    pub close_pairs: Vec<CloseMeasurementPair>,
    /// Merges predicted before false-positive filtering.
    pub candidates: Vec<MergeMeasurement>,
    /// Merges that survived filtering.
    pub merges: Vec<MergeMeasurement>,
    /// Pairs rejected because several detections were near the circle.
    pub ambiguous: usize,
}

impl DetectionReport {
    /// Candidates removed by the false-positive filter.
    pub fn false_positives(&self) -> usize {
        self.candidates.len() - self.merges.len()
    }
}

/// Runs the detection stages with one configuration.
#[derive(Debug, Clone, Default)]
pub struct MergeDetector {
    config: PipelineConfig,
}

impl MergeDetector {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Detect merged measurements in a pre-processed session.
    pub fn detect(&self, set: &MeasurementSet) -> DetectionReport {
        let tracks = build_tracks(set, &self.config.tracking);
        let close_pairs = find_close_pairs(set, &self.config.close_pairs);

        if close_pairs.is_empty() {
            log::info!("No close measurements, resulting in no merged measurements");
            return DetectionReport {
                tracks,
                ..DetectionReport::default()
            };
        }

        let predictions = predict_merges(&close_pairs, set, &self.config.close_pairs);
        let merges = FalsePositiveFilter::new(&tracks).retain(&predictions.merges);

        log::debug!(
            "{} close pairs, {} candidates, {} ambiguous, {} kept",
            close_pairs.len(),
            predictions.merges.len(),
            predictions.ambiguous,
            merges.len()
        );

        DetectionReport {
            tracks,
            close_pairs,
            candidates: predictions.merges,
            merges,
            ambiguous: predictions.ambiguous,
        }
    }

    /// Region filter (when enabled) and color scaling.
    pub fn preprocess(&self, set: &MeasurementSet) -> MeasurementSet {
        let mut set = if self.config.region.enabled {
            filter_to_region(set, &self.config.region.vertices)
        } else {
            set.clone()
        };
        apply_color_scaling(&mut set);
        set
    }
}

/// Summary of one processed session file.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub path: PathBuf,
    /// File name used as the registry key.
    pub name: String,
    pub frames: usize,
    pub detections: usize,
    pub tracks: usize,
    pub close_pairs: usize,
    pub candidates: usize,
    pub ambiguous: usize,
    pub merges: usize,
    /// Files written for this session.
    pub outputs: Vec<PathBuf>,
}

pub(crate) fn session_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn session_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "session".to_string())
}

/// Load, pre-process and analyze one session file.
///
/// When the session has merged measurements and `output_dir` is given,
/// results are written to `output_dir/<file stem>/`: merge and track CSVs if
/// enabled, and with plotting enabled one PNG per merge plus a session
/// overview.
pub fn process_session(
    path: &Path,
    config: &PipelineConfig,
    output_dir: Option<&Path>,
) -> Result<SessionOutcome> {
    let name = session_name(path);

    let raw = load_session_json(path)
        .with_context(|| format!("Failed to load session: {}", path.display()))?;

    let detector = MergeDetector::new(config.clone());
    let set = detector.preprocess(&raw);
    let report = detector.detect(&set);

    log::info!(
        "{}: {} frames, {} detections, {} tracks, {} merged measurements",
        name,
        set.len(),
        set.detection_count(),
        report.tracks.len(),
        report.merges.len()
    );

    let mut outputs = Vec::new();
    if let Some(out_dir) = output_dir {
        if !report.merges.is_empty() {
            let session_dir = out_dir.join(session_stem(path));
            outputs = export_session(&session_dir, &set, &report, config)?;
        }
    }

    Ok(SessionOutcome {
        path: path.to_path_buf(),
        name,
        frames: set.len(),
        detections: set.detection_count(),
        tracks: report.tracks.len(),
        close_pairs: report.close_pairs.len(),
        candidates: report.candidates.len(),
        ambiguous: report.ambiguous,
        merges: report.merges.len(),
        outputs,
    })
}

/// Write CSVs and plots for one session's report.
pub fn export_session(
    session_dir: &Path,
    set: &MeasurementSet,
    report: &DetectionReport,
    config: &PipelineConfig,
) -> Result<Vec<PathBuf>> {
    let mut outputs = Vec::new();

    if config.output.write_csv {
        let merges_path = session_dir.join("merged_measurements.csv");
        write_merges_csv(&merges_path, &report.merges)?;
        outputs.push(merges_path);

        let tracks_path = session_dir.join("tracks.csv");
        write_tracks_csv(&tracks_path, &report.tracks)?;
        outputs.push(tracks_path);

        let summary_path = session_dir.join("track_summary.csv");
        write_track_summary_csv(&summary_path, &report.tracks)?;
        outputs.push(summary_path);
    }

    if config.output.plot && !report.merges.is_empty() {
        let size = (config.output.plot_width, config.output.plot_height);
        let window = FrameWindow::new(config.output.frames_before, config.output.frames_after);
        for (i, merge) in report.merges.iter().enumerate() {
            let plot_path = session_dir.join(format!("merged_measurement_{:03}.png", i));
            visualization::plot_merge_event(&plot_path, set, merge, window, size)
                .with_context(|| format!("Failed to plot {}", plot_path.display()))?;
            outputs.push(plot_path);
        }

        let overview_path = session_dir.join("all_merged_measurements.png");
        visualization::plot_session_overview(&overview_path, set, &report.merges, size)
            .with_context(|| format!("Failed to plot {}", overview_path.display()))?;
        outputs.push(overview_path);
    }

    Ok(outputs)
}

/// Options for [`process_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub output_dir: Option<PathBuf>,
    /// Process sessions even if the registry already lists them.
    pub reprocess: bool,
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub processed: Vec<SessionOutcome>,
    /// Sessions skipped because the registry already lists them.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Sessions newly added to the registry.
    pub recorded: usize,
}

impl BatchOutcome {
    pub fn total_merges(&self) -> usize {
        self.processed.iter().map(|o| o.merges).sum()
    }
}

/// Process many session files in parallel.
///
/// Sessions already in the registry are skipped unless `reprocess` is set.
/// After all sessions finish, every session with at least one merged
/// measurement is recorded in the registry. A failing session is reported
/// and does not stop the batch; only registry failures abort it.
pub fn process_batch(
    paths: &[PathBuf],
    config: &PipelineConfig,
    options: &BatchOptions,
    registry: &mut dyn ProcessedRegistry,
) -> Result<BatchOutcome> {
    process_batch_with_progress(paths, config, options, registry, |_| {})
}

/// [`process_batch`], calling `on_session` from the worker threads as each
/// pending session finishes. Skipped sessions are not reported.
pub fn process_batch_with_progress<F>(
    paths: &[PathBuf],
    config: &PipelineConfig,
    options: &BatchOptions,
    registry: &mut dyn ProcessedRegistry,
    on_session: F,
) -> Result<BatchOutcome>
where
    F: Fn(&Path) + Sync,
{
    let mut outcome = BatchOutcome::default();

    let pending: Vec<&PathBuf> = paths
        .iter()
        .filter(|path| {
            let known = registry.contains(&session_name(path));
            if known && !options.reprocess {
                log::info!("{}: already processed, skipping", path.display());
                outcome.skipped.push((*path).clone());
            }
            options.reprocess || !known
        })
        .collect();

    let results: Vec<(PathBuf, Result<SessionOutcome>)> = pending
        .par_iter()
        .map(|path| {
            let result = process_session(path, config, options.output_dir.as_deref());
            on_session(path.as_path());
            ((*path).clone(), result)
        })
        .collect();

    for (path, result) in results {
        match result {
            Ok(session) => {
                if session.merges > 0 && registry.record(&session.name)? {
                    outcome.recorded += 1;
                }
                outcome.processed.push(session);
            }
            Err(e) => {
                log::warn!("{}: {:#}", path.display(), e);
                outcome.failed.push((path, format!("{:#}", e)));
            }
        }
    }

    Ok(outcome)
}

/// Expand inputs into session files: files are kept, directories are
/// scanned (non-recursively) for `*.json`. Results are sorted and deduplicated.
pub fn collect_session_files(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)
                .into_iter()
                .flatten()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| is_json(path))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files.sort();
    files.dedup();
    files
}
