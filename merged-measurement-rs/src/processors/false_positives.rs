//! False-positive suppression using track continuity.
//!
//! A single object passing close to another can look like a merge: two
//! nearby detections followed by one larger detection. If the merged
//! detection and both source detections all belong to the same track, the
//! event is one continuous object and is discarded.

use crate::processors::merging::MergeMeasurement;
use crate::processors::tracking::{Track, TrackId, TrackIndex};

/// Why a merge candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FalsePositiveReason {
    /// All three points belong to this track (`None` if none was found).
    SameTrack(Option<TrackId>),
}

/// Result of checking one merge candidate against the tracks.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterVerdict {
    /// Kept, with owner ids of (first, second, merged) attached.
    Confirmed(MergeMeasurement),
    FalsePositive(FalsePositiveReason),
}

/// Checks merge candidates against the owning tracks of their detections.
pub struct FalsePositiveFilter {
    index: TrackIndex,
}

impl FalsePositiveFilter {
    pub fn new(tracks: &[Track]) -> Self {
        Self {
            index: TrackIndex::new(tracks),
        }
    }

    /// Classify one candidate.
    ///
    /// Missing owners compare equal to each other, so a candidate whose
    /// three points are all untracked is also rejected.
    pub fn check(&self, merge: &MergeMeasurement) -> FilterVerdict {
        let [first, second, merged] = merge.detection_ids().map(|id| self.index.owner(id));

        if merged == first && merged == second {
            return FilterVerdict::FalsePositive(FalsePositiveReason::SameTrack(merged));
        }

        let mut kept = merge.clone();
        kept.track_ids = Some([first, second, merged]);
        FilterVerdict::Confirmed(kept)
    }

    /// Keep the candidates that are not false positives, in order.
    pub fn retain(&self, merges: &[MergeMeasurement]) -> Vec<MergeMeasurement> {
        merges
            .iter()
            .filter_map(|merge| match self.check(merge) {
                FilterVerdict::Confirmed(kept) => Some(kept),
                FilterVerdict::FalsePositive(reason) => {
                    log::debug!(
                        "discarding merge at t={:.2}: {:?}",
                        merge.current_timestamp(),
                        reason
                    );
                    None
                }
            })
            .collect()
    }
}
