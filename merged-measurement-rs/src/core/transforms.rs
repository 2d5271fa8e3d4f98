//! Pre-processing applied to a session before detection.
//!
//! This module provides:
//! - Region-of-interest filtering with a polygon
//! - Time-based grey-level color scaling for display

use super::geometry::{point_in_polygon, Point};
use super::loaders::{Frame, MeasurementSet};

/// Keep only detections inside the region polygon.
///
/// Every frame is kept, even if it ends up empty, so the "next timestamp"
/// seen by the merge predictor is unchanged. Detection order within a frame
/// is preserved.
///
/// # Arguments
///
/// * `set` - Session to filter
/// * `vertices` - Region polygon, implicitly closed
///
/// # Returns
///
/// A new set containing only detections inside the region.
pub fn filter_to_region(set: &MeasurementSet, vertices: &[Point]) -> MeasurementSet {
    let frames: Vec<Frame> = set
        .frames()
        .iter()
        .map(|frame| {
            let detections = frame
                .detections
                .iter()
                .filter(|d| point_in_polygon(d.position(), vertices))
                .cloned()
                .collect();
            Frame::new(frame.timestamp, detections)
        })
        .collect();

    let kept: usize = frames.iter().map(Frame::len).sum();
    log::debug!(
        "region filter kept {} of {} detections",
        kept,
        set.detection_count()
    );

    // Timestamps are unchanged, so ordering still holds
    MeasurementSet::from_frames(frames).unwrap_or_default()
}

/// Relative position of each frame in the session, used for color scaling.
///
/// `interval = (t - t0 + tN / 5) / (tN - t0 + tN / 5)`, where `t0` and `tN`
/// are the first and last timestamps. The offset keeps the first frame from
/// being fully transparent. A degenerate denominator yields 1.0 for every
/// frame.
pub fn color_intervals(set: &MeasurementSet) -> Vec<f64> {
    let frames = set.frames();
    let (first, last) = match (frames.first(), frames.last()) {
        (Some(f), Some(l)) => (f.timestamp, l.timestamp),
        _ => return Vec::new(),
    };

    let offset = last / 5.0;
    let denominator = last - first + offset;

    frames
        .iter()
        .map(|frame| {
            if denominator.abs() < f64::EPSILON || !denominator.is_finite() {
                1.0
            } else {
                (frame.timestamp - first + offset) / denominator
            }
        })
        .collect()
}

/// Map an interval to a grey level: 0 is white, 1 is black.
#[inline]
pub fn interval_to_grey(interval: f64) -> [u8; 3] {
    let level = (255.0 * (1.0 - interval)).round().clamp(0.0, 255.0) as u8;
    [level, level, level]
}

/// Assign every detection a grey level from its frame's position in time.
///
/// Later frames are drawn darker.
pub fn apply_color_scaling(set: &mut MeasurementSet) {
    let intervals = color_intervals(set);
    for (frame, interval) in set.frames_mut().iter_mut().zip(intervals) {
        let color = interval_to_grey(interval);
        for detection in &mut frame.detections {
            detection.color = Some(color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::Detection;

    fn session() -> MeasurementSet {
        MeasurementSet::from_frames(vec![
            Frame::new(
                10.0,
                vec![
                    Detection::new(0.0, -40.0, 6.0),
                    Detection::new(-60.0, -20.0, 6.0),
                    Detection::new(50.0, -20.0, 6.0),
                ],
            ),
            Frame::new(15.0, vec![Detection::new(500.0, 500.0, 6.0)]),
            Frame::new(20.0, vec![Detection::new(10.0, -30.0, 6.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_filter_to_region_keeps_frames() {
        let region = crate::config::RegionConfig::default().vertices;
        let filtered = filter_to_region(&session(), &region);

        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered.frames()[0].len(), 2);
        assert_eq!(filtered.frames()[0].detections[0].position(), [0.0, -40.0]);
        assert_eq!(filtered.frames()[0].detections[1].position(), [50.0, -20.0]);
        assert!(filtered.frames()[1].is_empty());
        assert_eq!(filtered.frames()[2].len(), 1);
    }

    #[test]
    fn test_color_intervals() {
        let intervals = color_intervals(&session());
        // offset = 4, denominator = 14
        assert_eq!(intervals.len(), 3);
        assert!((intervals[0] - 4.0 / 14.0).abs() < 1e-12);
        assert!((intervals[1] - 9.0 / 14.0).abs() < 1e-12);
        assert!((intervals[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_color_intervals_single_zero_timestamp() {
        let set = MeasurementSet::from_frames(vec![Frame::new(0.0, vec![])]).unwrap();
        assert_eq!(color_intervals(&set), vec![1.0]);
        assert!(color_intervals(&MeasurementSet::new()).is_empty());
    }

    #[test]
    fn test_interval_to_grey() {
        assert_eq!(interval_to_grey(0.0), [255, 255, 255]);
        assert_eq!(interval_to_grey(1.0), [0, 0, 0]);
        assert_eq!(interval_to_grey(2.0), [0, 0, 0]);
    }

    #[test]
    fn test_apply_color_scaling() {
        let mut set = session();
        apply_color_scaling(&mut set);

        let first = set.frames()[0].detections[0].color.unwrap();
        let last = set.frames()[2].detections[0].color.unwrap();
        assert!(first[0] > last[0]);
        assert_eq!(last, [0, 0, 0]);
        assert!(set.iter_detections().all(|(_, d)| d.color.is_some()));
    }
}
