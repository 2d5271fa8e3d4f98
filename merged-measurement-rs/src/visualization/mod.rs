//! Visualization of merged measurement events.
//!
//! Renders PNGs using the plotters library:
//!
//! - one image per merge, showing the frames around it as context greyed by
//!   their position in that window, the close pair and their outlines in blue,
//!   the merged detection and its outline in orange, and the search circle;
//! - one overview per session with every detection in its session-wide grey
//!   and every retained merge on top.

use std::ops::Range;
use std::path::Path;

use plotters::chart::ChartContext;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::cartesian::Cartesian2d;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::geometry::Point;
use crate::core::loaders::{Detection, MeasurementSet};
use crate::core::transforms::interval_to_grey;
use crate::processors::merging::MergeMeasurement;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Merge refers to frame {0}, which is not in the session")]
    MissingFrame(usize),

    #[error("Nothing to plot: session or merge list is empty")]
    EmptySession,
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Close measurement pair color.
const PAIR_COLOR: RGBColor = RGBColor(31, 119, 180);

/// Merged measurement color.
const MERGED_COLOR: RGBColor = RGBColor(255, 127, 14);

/// Fallback for detections without an assigned grey level.
const BACKGROUND_COLOR: RGBColor = RGBColor(150, 150, 150);

/// Minimum half-width of a plotted window.
const MIN_HALF_EXTENT: f64 = 30.0;

/// Interval of the oldest context frame; keeps it visible on white.
const CONTEXT_GREY_FLOOR: f64 = 0.2;

/// Frames drawn around a merge.
///
/// `before` frames precede the pair's frame; `after` frames start at it.
/// The following frame, where the merged detection lives, is always covered
/// when the session has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub before: usize,
    pub after: usize,
}

impl FrameWindow {
    pub fn new(before: usize, after: usize) -> Self {
        Self { before, after }
    }

    /// Frame indices around `frame`, clamped to `0..frame_count`.
    pub fn range(&self, frame: usize, frame_count: usize) -> Range<usize> {
        let start = frame.saturating_sub(self.before).min(frame_count);
        let end = frame.saturating_add(self.after.max(2)).min(frame_count);
        start..end.max(start)
    }
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new(30, 10)
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

fn outline(detection: &Detection) -> Vec<(f64, f64)> {
    detection
        .polygon_x
        .iter()
        .copied()
        .zip(detection.polygon_y.iter().copied())
        .collect()
}

fn rgb([r, g, b]: [u8; 3]) -> RGBColor {
    RGBColor(r, g, b)
}

/// Grey for the frame at `position` of `count` context frames, oldest lightest.
fn context_grey(position: usize, count: usize) -> RGBColor {
    let interval = if count <= 1 {
        1.0
    } else {
        position as f64 / (count - 1) as f64
    };
    rgb(interval_to_grey(CONTEXT_GREY_FLOOR + (1.0 - CONTEXT_GREY_FLOOR) * interval))
}

/// Square window centered on the merge, large enough for the pair, the
/// merged detection and the search circle.
fn merge_window(merge: &MergeMeasurement) -> (f64, f64, f64, f64) {
    let circle = &merge.pair.circle;
    let [cx, cy] = circle.center;

    let points = [
        merge.pair.first.position(),
        merge.pair.second.position(),
        merge.merged.position(),
    ];
    let reach = points
        .iter()
        .map(|p| (p[0] - cx).abs().max((p[1] - cy).abs()))
        .fold(circle.radius * 2.0, f64::max);

    let half = (reach * 1.5).max(MIN_HALF_EXTENT);
    (cx - half, cx + half, cy - half, cy + half)
}

/// Square window around all `points` with a small margin.
fn overview_window(points: impl Iterator<Item = Point>) -> Option<(f64, f64, f64, f64)> {
    let (x_min, x_max, y_min, y_max) = points.fold(None, |acc: Option<(f64, f64, f64, f64)>, [x, y]| {
        Some(match acc {
            None => (x, x, y, y),
            Some((x0, x1, y0, y1)) => (x0.min(x), x1.max(x), y0.min(y), y1.max(y)),
        })
    })?;

    let (cx, cy) = ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0);
    let half = ((x_max - x_min).max(y_max - y_min) / 2.0 * 1.1).max(MIN_HALF_EXTENT);
    Some((cx - half, cx + half, cy - half, cy + half))
}

fn ensure_parent(output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Search circle, outlines and points of one merge.
fn draw_merge(chart: &mut Chart<'_, '_>, merge: &MergeMeasurement) -> Result<()> {
    let circle = &merge.pair.circle;
    let circle_outline: Vec<(f64, f64)> = (0..=72)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::PI / 36.0;
            (
                circle.center[0] + circle.radius * angle.cos(),
                circle.center[1] + circle.radius * angle.sin(),
            )
        })
        .collect();
    chart
        .draw_series(std::iter::once(PathElement::new(circle_outline, BLACK.stroke_width(1))))
        .map_err(plot_err)?;

    let outlines = [
        (&merge.pair.first.detection, PAIR_COLOR),
        (&merge.pair.second.detection, PAIR_COLOR),
        (&merge.merged.detection, MERGED_COLOR),
    ];
    chart
        .draw_series(
            outlines
                .iter()
                .filter(|(d, _)| !d.polygon_x.is_empty())
                .map(|(d, color)| PathElement::new(outline(d), color.stroke_width(3))),
        )
        .map_err(plot_err)?;

    // Points of interest on top
    chart
        .draw_series(
            outlines
                .iter()
                .map(|(d, color)| Circle::new((d.x, d.y), 5, color.filled())),
        )
        .map_err(plot_err)?;

    Ok(())
}

/// Plot one merged measurement with its surrounding frames and save it as PNG.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image (parent must exist or be creatable)
/// * `set` - Pre-processed session the merge was found in
/// * `merge` - The merge to draw
/// * `window` - Context frames drawn in the background
/// * `size` - Image size in pixels (width, height)
pub fn plot_merge_event(
    output_path: &Path,
    set: &MeasurementSet,
    merge: &MergeMeasurement,
    window: FrameWindow,
    size: (u32, u32),
) -> Result<()> {
    if set.is_empty() {
        return Err(VisualizationError::EmptySession);
    }
    for frame in [merge.pair.frame(), merge.merged.id.frame] {
        if set.frame(frame).is_none() {
            return Err(VisualizationError::MissingFrame(frame));
        }
    }

    let (x_min, x_max, y_min, y_max) = merge_window(merge);
    let in_view = |d: &Detection| d.x >= x_min && d.x <= x_max && d.y >= y_min && d.y <= y_max;

    let context = window.range(merge.pair.frame(), set.len());
    let count = context.len();
    let background: Vec<(&Detection, RGBColor)> = set.frames()[context]
        .iter()
        .enumerate()
        .flat_map(|(position, frame)| {
            let color = context_grey(position, count);
            frame.detections.iter().map(move |d| (d, color))
        })
        .filter(|(d, _)| in_view(*d))
        .collect();

    ensure_parent(output_path)?;

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .draw_series(
            background
                .iter()
                .map(|(d, color)| Circle::new((d.x, d.y), 3, color.filled())),
        )
        .map_err(plot_err)?;

    draw_merge(&mut chart, merge)?;

    root.present().map_err(plot_err)?;

    Ok(())
}

/// Plot every detection of the session in its grey level with all `merges`
/// on top, and save it as PNG.
pub fn plot_session_overview(
    output_path: &Path,
    set: &MeasurementSet,
    merges: &[MergeMeasurement],
    size: (u32, u32),
) -> Result<()> {
    if set.detection_count() == 0 || merges.is_empty() {
        return Err(VisualizationError::EmptySession);
    }

    let merge_points = merges.iter().flat_map(|m| {
        [
            m.pair.first.position(),
            m.pair.second.position(),
            m.merged.position(),
        ]
    });
    let (x_min, x_max, y_min, y_max) =
        overview_window(set.iter_detections().map(|(_, d)| d.position()).chain(merge_points))
            .ok_or(VisualizationError::EmptySession)?;

    ensure_parent(output_path)?;

    let root = BitMapBackend::new(output_path, size).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(plot_err)?;

    chart
        .draw_series(set.iter_detections().map(|(_, d)| {
            let color = d.color.map(rgb).unwrap_or(BACKGROUND_COLOR);
            Circle::new((d.x, d.y), 2, color.filled())
        }))
        .map_err(plot_err)?;

    for merge in merges {
        draw_merge(&mut chart, merge)?;
    }

    root.present().map_err(plot_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BoundingCircle;
    use crate::core::loaders::{DetectionId, Frame};
    use crate::processors::close_pairs::{CloseMeasurementPair, DetectionRef};
    use tempfile::tempdir;

    fn merge_in(frames: (usize, usize)) -> MergeMeasurement {
        let detection_ref = |frame: usize, index: usize, d: Detection| DetectionRef {
            id: DetectionId { frame, index },
            timestamp: frame as f64,
            detection: d,
        };
        MergeMeasurement {
            pair: CloseMeasurementPair {
                first: detection_ref(frames.0, 0, Detection::new(-8.0, 0.0, 8.0)),
                second: detection_ref(frames.0, 1, Detection::new(8.0, 0.0, 8.0)),
                separation: 16.0,
                circle: BoundingCircle::enclosing([-8.0, 0.0], [8.0, 0.0], 0.8),
            },
            merged: detection_ref(
                frames.1,
                0,
                Detection::with_polygon(0.0, 0.0, 30.0, vec![-3.0, 3.0, 3.0, -3.0, -3.0], vec![-3.0, -3.0, 3.0, 3.0, -3.0]),
            ),
            track_ids: None,
        }
    }

    fn session() -> MeasurementSet {
        let mut set = MeasurementSet::from_frames(vec![
            Frame::new(0.0, vec![Detection::new(-8.0, 0.0, 8.0), Detection::new(8.0, 0.0, 8.0)]),
            Frame::new(1.0, vec![Detection::new(0.0, 0.0, 30.0)]),
            Frame::new(2.0, vec![Detection::new(-4.0, 60.0, 8.0)]),
        ])
        .unwrap();
        crate::core::transforms::apply_color_scaling(&mut set);
        set
    }

    #[test]
    fn test_merge_window_covers_points() {
        let (x_min, x_max, y_min, y_max) = merge_window(&merge_in((0, 1)));
        assert!(x_min < -8.0 && x_max > 8.0);
        assert!(y_min < 0.0 && y_max > 0.0);
        assert!((x_max - x_min - 2.0 * MIN_HALF_EXTENT).abs() < 1e-9);
    }

    #[test]
    fn test_frame_window_clamps_to_session() {
        let window = FrameWindow::default();
        assert_eq!(window.range(5, 100), 0..15);
        assert_eq!(window.range(50, 100), 20..60);
        assert_eq!(window.range(95, 100), 65..100);
        assert_eq!(window.range(0, 1), 0..1);
    }

    #[test]
    fn test_frame_window_keeps_following_frame() {
        let window = FrameWindow::new(0, 0);
        assert_eq!(window.range(3, 10), 3..5);
        assert_eq!(window.range(12, 10), 10..10);
    }

    #[test]
    fn test_context_grey_darkens_over_window() {
        let RGBColor(oldest, _, _) = context_grey(0, 5);
        let RGBColor(newest, _, _) = context_grey(4, 5);
        assert!(oldest > newest);
        assert!(oldest < 255);
        assert_eq!(newest, 0);
        let RGBColor(single, _, _) = context_grey(0, 1);
        assert_eq!(single, 0);
    }

    #[test]
    fn test_plot_merge_event_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots").join("merge.png");

        plot_merge_event(&path, &session(), &merge_in((0, 1)), FrameWindow::default(), (320, 240)).unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_plot_merge_event_missing_frame() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("merge.png");

        let result = plot_merge_event(&path, &session(), &merge_in((2, 3)), FrameWindow::default(), (320, 240));
        assert!(matches!(result, Err(VisualizationError::MissingFrame(3))));
    }

    #[test]
    fn test_plot_merge_event_empty_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("merge.png");

        let result = plot_merge_event(&path, &MeasurementSet::new(), &merge_in((0, 1)), FrameWindow::default(), (320, 240));
        assert!(matches!(result, Err(VisualizationError::EmptySession)));
        assert!(!path.exists());
    }

    #[test]
    fn test_plot_session_overview_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overview").join("all_merged_measurements.png");

        plot_session_overview(&path, &session(), &[merge_in((0, 1))], (320, 240)).unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_plot_session_overview_rejects_empty_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("overview.png");

        let no_merges = plot_session_overview(&path, &session(), &[], (320, 240));
        assert!(matches!(no_merges, Err(VisualizationError::EmptySession)));

        let no_detections = plot_session_overview(&path, &MeasurementSet::new(), &[merge_in((0, 1))], (320, 240));
        assert!(matches!(no_detections, Err(VisualizationError::EmptySession)));
        assert!(!path.exists());
    }

    #[test]
    fn test_overview_window_spans_all_points() {
        let (x_min, x_max, y_min, y_max) =
            overview_window([[-100.0, 0.0], [100.0, 20.0]].into_iter()).unwrap();
        assert!(x_min < -100.0 && x_max > 100.0);
        assert!(y_min < 0.0 && y_max > 20.0);
        assert!(overview_window(std::iter::empty()).is_none());
    }
}
