//! Close measurement pair detection.

use crate::config::ClosePairConfig;
use crate::core::geometry::{distance, BoundingCircle, Point};
use crate::core::loaders::{Detection, DetectionId, MeasurementSet};

/// A detection together with its identity in the session.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRef {
    pub id: DetectionId,
    pub timestamp: f64,
    pub detection: Detection,
}

impl DetectionRef {
    #[inline]
    pub fn position(&self) -> Point {
        self.detection.position()
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.detection.area
    }
}

/// Two simultaneous detections close enough to be a merge precursor.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseMeasurementPair {
    pub first: DetectionRef,
    pub second: DetectionRef,
    /// Distance between the two detections.
    pub separation: f64,
    pub circle: BoundingCircle,
}

impl CloseMeasurementPair {
    /// Frame index shared by both detections.
    #[inline]
    pub fn frame(&self) -> usize {
        self.first.id.frame
    }

    #[inline]
    pub fn timestamp(&self) -> f64 {
        self.first.timestamp
    }

    /// Sum of both detections' areas.
    #[inline]
    pub fn combined_area(&self) -> f64 {
        self.first.area() + self.second.area()
    }
}

/// Find every close measurement pair in the session.
///
/// For each frame, every unordered pair (i, j) with i < j is emitted when the
/// detections are closer than `max_distance` and both areas exceed
/// `min_area`. Pairs come out in frame order, then by i, then by j.
pub fn find_close_pairs(set: &MeasurementSet, config: &ClosePairConfig) -> Vec<CloseMeasurementPair> {
    let mut pairs = Vec::new();

    for (frame_index, frame) in set.frames().iter().enumerate() {
        let detections = &frame.detections;
        for i in 0..detections.len() {
            for j in (i + 1)..detections.len() {
                let (a, b) = (&detections[i], &detections[j]);
                let separation = distance(a.position(), b.position());
                if separation >= config.max_distance {
                    continue;
                }
                if a.area <= config.min_area || b.area <= config.min_area {
                    continue;
                }

                pairs.push(CloseMeasurementPair {
                    first: DetectionRef {
                        id: DetectionId { frame: frame_index, index: i },
                        timestamp: frame.timestamp,
                        detection: a.clone(),
                    },
                    second: DetectionRef {
                        id: DetectionId { frame: frame_index, index: j },
                        timestamp: frame.timestamp,
                        detection: b.clone(),
                    },
                    separation,
                    circle: BoundingCircle::enclosing(a.position(), b.position(), config.circle_scale),
                });
            }
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::Frame;

    fn single_frame(detections: Vec<Detection>) -> MeasurementSet {
        MeasurementSet::from_frames(vec![Frame::new(3.0, detections)]).unwrap()
    }

    #[test]
    fn test_pair_within_distance() {
        let set = single_frame(vec![Detection::new(0.0, 0.0, 6.0), Detection::new(19.0, 0.0, 7.0)]);
        let pairs = find_close_pairs(&set, &ClosePairConfig::default());

        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.first.id, DetectionId { frame: 0, index: 0 });
        assert_eq!(pair.second.id, DetectionId { frame: 0, index: 1 });
        assert_eq!(pair.timestamp(), 3.0);
        assert!((pair.separation - 19.0).abs() < 1e-12);
        assert_eq!(pair.circle.center, [9.5, 0.0]);
        assert!((pair.circle.radius - 7.6).abs() < 1e-12);
        assert_eq!(pair.combined_area(), 13.0);
    }

    #[test]
    fn test_pair_too_far() {
        let set = single_frame(vec![Detection::new(0.0, 0.0, 6.0), Detection::new(21.0, 0.0, 7.0)]);
        assert!(find_close_pairs(&set, &ClosePairConfig::default()).is_empty());
    }

    #[test]
    fn test_pair_small_area() {
        let set = single_frame(vec![Detection::new(0.0, 0.0, 4.0), Detection::new(19.0, 0.0, 7.0)]);
        assert!(find_close_pairs(&set, &ClosePairConfig::default()).is_empty());

        // area equal to the threshold is not enough either
        let set = single_frame(vec![Detection::new(0.0, 0.0, 5.0), Detection::new(19.0, 0.0, 7.0)]);
        assert!(find_close_pairs(&set, &ClosePairConfig::default()).is_empty());
    }

    #[test]
    fn test_pairs_are_unordered_and_distinct() {
        let set = single_frame(vec![
            Detection::new(0.0, 0.0, 6.0),
            Detection::new(5.0, 0.0, 6.0),
            Detection::new(10.0, 0.0, 6.0),
        ]);
        let pairs = find_close_pairs(&set, &ClosePairConfig::default());

        let ids: Vec<(usize, usize)> = pairs.iter().map(|p| (p.first.id.index, p.second.id.index)).collect();
        assert_eq!(ids, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_pairs_never_cross_frames() {
        let set = MeasurementSet::from_frames(vec![
            Frame::new(0.0, vec![Detection::new(0.0, 0.0, 6.0)]),
            Frame::new(1.0, vec![Detection::new(1.0, 0.0, 6.0)]),
        ])
        .unwrap();
        assert!(find_close_pairs(&set, &ClosePairConfig::default()).is_empty());
    }
}
