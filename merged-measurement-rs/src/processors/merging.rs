//! Merge prediction: does a close pair show up as one larger detection in the
//! next frame?

use crate::config::ClosePairConfig;
use crate::core::loaders::{DetectionId, MeasurementSet};
use crate::processors::close_pairs::{CloseMeasurementPair, DetectionRef};
use crate::processors::tracking::TrackId;

/// A close pair followed by a single larger detection inside its circle.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeMeasurement {
    pub pair: CloseMeasurementPair,
    /// The merged detection in the following frame.
    pub merged: DetectionRef,
    /// Owning tracks of (first, second, merged), set by the false-positive filter.
    pub track_ids: Option<[Option<TrackId>; 3]>,
}

impl MergeMeasurement {
    #[inline]
    pub fn previous_timestamp(&self) -> f64 {
        self.pair.timestamp()
    }

    #[inline]
    pub fn current_timestamp(&self) -> f64 {
        self.merged.timestamp
    }

    /// Detection ids of (first, second, merged).
    pub fn detection_ids(&self) -> [DetectionId; 3] {
        [self.pair.first.id, self.pair.second.id, self.merged.id]
    }
}

/// Result of checking one close pair against the following frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// No larger detection inside the circle, or no following frame.
    NoCandidate,
    /// A merge candidate exists but other detections are nearby too.
    Ambiguous {
        /// Detections within the extended search radius.
        nearby: usize,
    },
    Confirmed(MergeMeasurement),
}

/// Check the frame after `pair` for a merged detection.
///
/// A detection at distance `d` from the circle center is
/// - *nearby* when `d < nearby_factor * radius`,
/// - a *merge candidate* when `d < radius` and its area exceeds the pair's
///   combined area (the last one in source order is kept).
///
/// A merge candidate with more than one nearby detection is ambiguous.
pub fn predict_merge(
    pair: &CloseMeasurementPair,
    set: &MeasurementSet,
    config: &ClosePairConfig,
) -> Prediction {
    let Some(next) = set.next_frame(pair.frame()) else {
        return Prediction::NoCandidate;
    };

    let circle = &pair.circle;
    let combined_area = pair.combined_area();
    let mut nearby = 0usize;
    let mut candidate: Option<usize> = None;

    for (index, detection) in next.detections.iter().enumerate() {
        let d = circle.distance_to_center(detection.position());
        if d < circle.radius * config.nearby_factor {
            nearby += 1;
        }
        if d < circle.radius && detection.area > combined_area {
            candidate = Some(index);
        }
    }

    match candidate {
        None => Prediction::NoCandidate,
        Some(_) if nearby > 1 => Prediction::Ambiguous { nearby },
        Some(index) => Prediction::Confirmed(MergeMeasurement {
            pair: pair.clone(),
            merged: DetectionRef {
                id: DetectionId {
                    frame: pair.frame() + 1,
                    index,
                },
                timestamp: next.timestamp,
                detection: next.detections[index].clone(),
            },
            track_ids: None,
        }),
    }
}

/// Merge predictions for a batch of pairs.
#[derive(Debug, Clone, Default)]
pub struct PredictionSummary {
    /// Confirmed merges in pair order.
    pub merges: Vec<MergeMeasurement>,
    /// Pairs rejected as ambiguous.
    pub ambiguous: usize,
    /// Pairs with no merge candidate.
    pub no_candidate: usize,
}

/// Run [`predict_merge`] for every pair, keeping the confirmed merges.
pub fn predict_merges(
    pairs: &[CloseMeasurementPair],
    set: &MeasurementSet,
    config: &ClosePairConfig,
) -> PredictionSummary {
    let mut summary = PredictionSummary::default();

    for pair in pairs {
        match predict_merge(pair, set, config) {
            Prediction::Confirmed(merge) => {
                log::debug!(
                    "merge at t={:.2}: ({:.2}, {:.2}) + ({:.2}, {:.2}) -> ({:.2}, {:.2})",
                    merge.current_timestamp(),
                    pair.first.detection.x,
                    pair.first.detection.y,
                    pair.second.detection.x,
                    pair.second.detection.y,
                    merge.merged.detection.x,
                    merge.merged.detection.y,
                );
                summary.merges.push(merge);
            }
            Prediction::Ambiguous { nearby } => {
                log::info!(
                    "Maybe not merged measurement after all at t={:.2}: {} measurements close to the circle",
                    pair.timestamp(),
                    nearby
                );
                summary.ambiguous += 1;
            }
            Prediction::NoCandidate => summary.no_candidate += 1,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BoundingCircle;
    use crate::core::loaders::{Detection, Frame};

    /// Pair at (-10, 0) and (10, 0): center (0, 0), radius 8, areas 6 + 7.
    fn pair_and_set(next: Vec<Detection>) -> (CloseMeasurementPair, MeasurementSet) {
        let a = Detection::new(-10.0, 0.0, 6.0);
        let b = Detection::new(10.0, 0.0, 7.0);
        let set = MeasurementSet::from_frames(vec![
            Frame::new(1.0, vec![a.clone(), b.clone()]),
            Frame::new(2.0, next),
        ])
        .unwrap();

        let pair = CloseMeasurementPair {
            first: DetectionRef {
                id: DetectionId { frame: 0, index: 0 },
                timestamp: 1.0,
                detection: a,
            },
            second: DetectionRef {
                id: DetectionId { frame: 0, index: 1 },
                timestamp: 1.0,
                detection: b,
            },
            separation: 20.0,
            circle: BoundingCircle::enclosing([-10.0, 0.0], [10.0, 0.0], 0.8),
        };
        (pair, set)
    }

    #[test]
    fn test_single_merge_confirmed() {
        let (pair, set) = pair_and_set(vec![Detection::new(1.0, 1.0, 20.0)]);
        assert!((pair.circle.radius - 8.0).abs() < 1e-12);

        match predict_merge(&pair, &set, &ClosePairConfig::default()) {
            Prediction::Confirmed(merge) => {
                assert_eq!(merge.merged.id, DetectionId { frame: 1, index: 0 });
                assert_eq!(merge.current_timestamp(), 2.0);
                assert!(merge.current_timestamp() > merge.previous_timestamp());
                assert!(merge.track_ids.is_none());
            }
            other => panic!("Expected Confirmed, got {:?}", other),
        }
    }

    #[test]
    fn test_second_nearby_detection_is_ambiguous() {
        let (pair, set) = pair_and_set(vec![
            Detection::new(1.0, 1.0, 20.0),
            Detection::new(12.0, 0.0, 1.0),
        ]);

        assert_eq!(
            predict_merge(&pair, &set, &ClosePairConfig::default()),
            Prediction::Ambiguous { nearby: 2 }
        );
    }

    #[test]
    fn test_far_detection_does_not_block() {
        let (pair, set) = pair_and_set(vec![
            Detection::new(1.0, 1.0, 20.0),
            Detection::new(30.0, 0.0, 1.0),
        ]);

        assert!(matches!(
            predict_merge(&pair, &set, &ClosePairConfig::default()),
            Prediction::Confirmed(_)
        ));
    }

    #[test]
    fn test_small_area_is_not_a_merge() {
        // 13 is the combined area; it must be exceeded
        let (pair, set) = pair_and_set(vec![Detection::new(1.0, 1.0, 13.0)]);
        assert_eq!(
            predict_merge(&pair, &set, &ClosePairConfig::default()),
            Prediction::NoCandidate
        );
    }

    #[test]
    fn test_outside_circle_is_not_a_merge() {
        let (pair, set) = pair_and_set(vec![Detection::new(9.0, 0.0, 50.0)]);
        assert_eq!(
            predict_merge(&pair, &set, &ClosePairConfig::default()),
            Prediction::NoCandidate
        );
    }

    #[test]
    fn test_last_frame_has_no_candidate() {
        let (pair, set) = pair_and_set(vec![Detection::new(1.0, 1.0, 20.0)]);
        let mut late_pair = pair.clone();
        late_pair.first.id.frame = 1;
        late_pair.second.id.frame = 1;

        assert_eq!(
            predict_merge(&late_pair, &set, &ClosePairConfig::default()),
            Prediction::NoCandidate
        );
    }

    #[test]
    fn test_predict_merges_summary() {
        // Second pair sits 100 units above the first; its follow-up frame
        // has a merge candidate plus a small return just inside 2r.
        let (pair, set) = pair_and_set(vec![
            Detection::new(1.0, 1.0, 20.0),
            Detection::new(1.0, 101.0, 20.0),
            Detection::new(12.0, 100.0, 1.0),
        ]);
        let mut crowded_pair = pair.clone();
        crowded_pair.first.detection.y = 100.0;
        crowded_pair.second.detection.y = 100.0;
        crowded_pair.circle = BoundingCircle::enclosing([-10.0, 100.0], [10.0, 100.0], 0.8);
        let mut late_pair = pair.clone();
        late_pair.first.id.frame = 1;
        late_pair.second.id.frame = 1;

        let summary = predict_merges(&[pair, crowded_pair, late_pair], &set, &ClosePairConfig::default());
        assert_eq!(summary.merges.len(), 1);
        assert_eq!(summary.merges[0].merged.id, DetectionId { frame: 1, index: 0 });
        assert_eq!(summary.ambiguous, 1);
        assert_eq!(summary.no_candidate, 1);
    }
}
