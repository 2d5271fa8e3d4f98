//! Short-lived track building from per-timestamp detections.
//!
//! Tracks are only used as ground truth for the false-positive filter: a
//! "merge" whose points all belong to one track is a single object, not two.
//! Linking is a greedy nearest-neighbor heuristic. The decision rule lives
//! behind [`AssignmentPolicy`] so it can be swapped for a proper assignment
//! algorithm without touching the builder.

use std::collections::HashMap;

use crate::config::TrackingConfig;
use crate::core::geometry::{distance, Point};
use crate::core::loaders::{DetectionId, MeasurementSet};

/// Unique, monotonically assigned track identifier.
pub type TrackId = usize;

/// One position sample of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    /// Detection this sample was created from.
    pub detection: DetectionId,
}

impl TrackSample {
    #[inline]
    pub fn position(&self) -> Point {
        [self.x, self.y]
    }
}

/// Trajectory of one presumed object.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub samples: Vec<TrackSample>,
}

impl Track {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: TrackSample) {
        self.samples.push(sample);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&TrackSample> {
        self.samples.last()
    }

    /// Second-to-last sample, if the track has at least two.
    #[inline]
    pub fn second_to_last(&self) -> Option<&TrackSample> {
        self.samples.len().checked_sub(2).map(|i| &self.samples[i])
    }

    /// Straight-line distance from the first to the last sample.
    pub fn displacement(&self) -> f64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) if self.samples.len() > 1 => {
                distance(first.position(), last.position())
            }
            _ => 0.0,
        }
    }

    /// Sum of distances between consecutive samples.
    pub fn path_length(&self) -> f64 {
        self.samples
            .windows(2)
            .map(|w| distance(w[0].position(), w[1].position()))
            .sum()
    }
}

/// Outcome of matching one detection against the current tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Append to the track at this index.
    Extend(usize),
    /// Start a new track.
    Spawn,
}

/// Decides which track, if any, a new detection extends.
pub trait AssignmentPolicy {
    fn assign(&self, tracks: &[Track], position: Point, timestamp: f64) -> Assignment;
}

/// Greedy nearest-sample linking.
///
/// In priority order:
/// 1. nearest last sample within `link_distance`,
/// 2. nearest second-to-last sample within `link_distance`,
/// 3. otherwise a new track.
///
/// A matched track is only extended if its last sample is less than
/// `max_time_gap` old; a stale match spawns a new track instead. Ties go to
/// the lowest track index.
#[derive(Debug, Clone)]
pub struct GreedyNearestPolicy {
    pub link_distance: f64,
    pub max_time_gap: f64,
}

impl GreedyNearestPolicy {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            link_distance: config.link_distance,
            max_time_gap: config.max_time_gap,
        }
    }

    fn extend_if_recent(&self, tracks: &[Track], index: usize, timestamp: f64) -> Assignment {
        let recent = tracks[index]
            .last()
            .map(|last| timestamp - last.timestamp < self.max_time_gap)
            .unwrap_or(false);
        if recent {
            Assignment::Extend(index)
        } else {
            Assignment::Spawn
        }
    }
}

impl Default for GreedyNearestPolicy {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

/// Index and distance of the smallest value, first one wins on ties.
fn nearest(distances: impl Iterator<Item = f64>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, d) in distances.enumerate() {
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((i, d)),
        }
    }
    best
}

impl AssignmentPolicy for GreedyNearestPolicy {
    fn assign(&self, tracks: &[Track], position: Point, timestamp: f64) -> Assignment {
        let to_last = nearest(tracks.iter().map(|t| {
            t.last()
                .map(|s| distance(s.position(), position))
                .unwrap_or(f64::INFINITY)
        }));
        if let Some((index, d)) = to_last {
            if d < self.link_distance {
                return self.extend_if_recent(tracks, index, timestamp);
            }
        }

        let to_second_last = nearest(tracks.iter().map(|t| {
            t.second_to_last()
                .map(|s| distance(s.position(), position))
                .unwrap_or(f64::INFINITY)
        }));
        if let Some((index, d)) = to_second_last {
            if d < self.link_distance {
                return self.extend_if_recent(tracks, index, timestamp);
            }
        }

        Assignment::Spawn
    }
}

/// Builds tracks over a whole session with a given assignment policy.
pub struct TrackBuilder<P: AssignmentPolicy = GreedyNearestPolicy> {
    policy: P,
    tracks: Vec<Track>,
}

impl TrackBuilder<GreedyNearestPolicy> {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self::with_policy(GreedyNearestPolicy::from_config(config))
    }
}

impl<P: AssignmentPolicy> TrackBuilder<P> {
    pub fn with_policy(policy: P) -> Self {
        Self {
            policy,
            tracks: Vec::new(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    fn spawn(&mut self, sample: TrackSample) {
        let mut track = Track::new(self.tracks.len());
        track.push(sample);
        self.tracks.push(track);
    }

    /// Feed one frame of detections.
    ///
    /// While no track exists every detection seeds its own track. Tracks are
    /// updated immediately, so later detections of the same frame see
    /// earlier ones.
    pub fn observe_frame(&mut self, frame_index: usize, set: &MeasurementSet) {
        let Some(frame) = set.frame(frame_index) else {
            return;
        };

        if self.tracks.is_empty() {
            for (index, d) in frame.detections.iter().enumerate() {
                self.spawn(TrackSample {
                    timestamp: frame.timestamp,
                    x: d.x,
                    y: d.y,
                    detection: DetectionId { frame: frame_index, index },
                });
            }
            return;
        }

        for (index, d) in frame.detections.iter().enumerate() {
            let sample = TrackSample {
                timestamp: frame.timestamp,
                x: d.x,
                y: d.y,
                detection: DetectionId { frame: frame_index, index },
            };
            match self.policy.assign(&self.tracks, d.position(), frame.timestamp) {
                Assignment::Extend(i) => self.tracks[i].push(sample),
                Assignment::Spawn => self.spawn(sample),
            }
        }
    }

    /// Feed every frame of `set` in time order and return the tracks.
    pub fn build(mut self, set: &MeasurementSet) -> Vec<Track> {
        for frame_index in 0..set.len() {
            self.observe_frame(frame_index, set);
        }
        log::debug!(
            "built {} tracks from {} detections",
            self.tracks.len(),
            set.detection_count()
        );
        self.tracks
    }
}

/// Build tracks for a session with the default greedy policy.
pub fn build_tracks(set: &MeasurementSet, config: &TrackingConfig) -> Vec<Track> {
    TrackBuilder::from_config(config).build(set)
}

/// Lookup from detection identity to the track that owns it.
#[derive(Debug, Clone, Default)]
pub struct TrackIndex {
    owners: HashMap<DetectionId, TrackId>,
}

impl TrackIndex {
    pub fn new(tracks: &[Track]) -> Self {
        let owners = tracks
            .iter()
            .flat_map(|t| t.samples.iter().map(move |s| (s.detection, t.id)))
            .collect();
        Self { owners }
    }

    #[inline]
    pub fn owner(&self, detection: DetectionId) -> Option<TrackId> {
        self.owners.get(&detection).copied()
    }
}
