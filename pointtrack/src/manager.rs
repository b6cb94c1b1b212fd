//! Multi-object tracker orchestrating prediction, association and track lifecycle

use crate::association::Associator;
use crate::config::TrackerConfig;
use crate::error::{Result, TrackingError};
use crate::kalman::EstimatorParams;
use crate::observation::Observation;
use crate::track::{LifecycleState, MotionState, Track, TrackId};
use crate::trajectory::{TrajectoryPoint, TrajectoryPredictor};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable view of one track after a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub position: Point3<f64>,
    pub velocity: Vector3<f64>,
    pub confidence: f64,
    pub lifecycle_state: LifecycleState,
    /// frames stepped since creation
    pub age: u32,
    pub total_detections: u32,
    /// mean of the recent observation confidences
    pub average_confidence: f64,
    pub consecutive_misses: u32,
    /// per-axis standard deviation
    pub position_uncertainty: Vector3<f64>,
    pub motion: MotionState,
}

/// What happened during a single `step`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub observations: usize,
    pub matched: usize,
    pub created: usize,
    pub evicted: usize,
    /// observations with a non-finite position
    pub rejected_observations: usize,
    /// unmatched observations dropped because the tracker was full
    pub capacity_exceeded: usize,
}

/// Counters accumulated since construction or the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub frames: u64,
    pub tracks_created: u64,
    pub tracks_evicted: u64,
    pub observations_rejected: u64,
    pub capacity_exceeded: u64,
}

impl TrackerStats {
    fn record(&mut self, frame: &FrameMetrics) {
        self.frames += 1;
        self.tracks_created += frame.created as u64;
        self.tracks_evicted += frame.evicted as u64;
        self.observations_rejected += frame.rejected_observations as u64;
        self.capacity_exceeded += frame.capacity_exceeded as u64;
    }
}

/// Owns every live track and runs the per-frame tracking pipeline
///
/// Not internally synchronised: one owner drives `step`, queries must not
/// overlap with a `step` in flight.
#[derive(Debug, Clone)]
pub struct TrackManager {
    config: TrackerConfig,
    params: EstimatorParams,
    associator: Associator,
    tracks: BTreeMap<TrackId, Track>,
    occlusion_hints: BTreeSet<TrackId>,
    next_track_id: u32,
    last_timestamp: Option<f64>,
    last_frame: FrameMetrics,
    stats: TrackerStats,
}

impl TrackManager {
    /// Create a tracker, rejecting invalid configuration
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        log::info!(
            "Creating TrackManager: max_active_tracks={}, max_association_distance={:.3}, loss_threshold={}, association={}",
            config.max_active_tracks,
            config.max_association_distance,
            config.loss_threshold,
            config.association_algorithm
        );

        Ok(Self {
            params: EstimatorParams::from(&config),
            associator: Associator::new(
                config.association_algorithm,
                config.max_association_distance,
            ),
            config,
            tracks: BTreeMap::new(),
            occlusion_hints: BTreeSet::new(),
            next_track_id: 1,
            last_timestamp: None,
            last_frame: FrameMetrics::default(),
            stats: TrackerStats::default(),
        })
    }

    /// Process one frame of observations taken at `timestamp`
    ///
    /// Predicts every track, associates, updates the matched tracks, spawns
    /// tracks for unmatched observations while capacity allows, advances the
    /// lifecycle of the rest and evicts lost tracks. Returns the live tracks
    /// in ascending id order.
    pub fn step(&mut self, observations: &[Observation], timestamp: f64) -> Vec<TrackSnapshot> {
        let timestamp = self.clamp_timestamp(timestamp);
        let mut frame = FrameMetrics {
            observations: observations.len(),
            ..FrameMetrics::default()
        };

        // Step 1: Predict all tracks, in ascending id order
        let (track_ids, predictions): (Vec<TrackId>, Vec<Point3<f64>>) = self
            .tracks
            .iter_mut()
            .map(|(id, track)| (*id, track.predict(timestamp)))
            .unzip();

        // Step 2: Malformed observations count as nothing seen
        let valid: Vec<&Observation> = observations
            .iter()
            .filter(|observation| {
                if observation.is_valid() {
                    true
                } else {
                    log::warn!("Ignoring observation with non-finite position: {observation}");
                    false
                }
            })
            .collect();
        frame.rejected_observations = observations.len() - valid.len();

        // Step 3: Associate observations with predictions
        let positions: Vec<Point3<f64>> = valid.iter().map(|o| o.position).collect();
        let assignment = self.associator.associate(&predictions, &positions);

        // Step 4: Update matched tracks
        let mut matched = vec![false; track_ids.len()];
        let matches = assignment.by_track(track_ids.len());
        for (track_idx, observation_idx) in matches.into_iter().enumerate() {
            let Some(observation_idx) = observation_idx else {
                continue;
            };
            if let Some(track) = self.tracks.get_mut(&track_ids[track_idx]) {
                if track.register_hit(valid[observation_idx], timestamp) {
                    matched[track_idx] = true;
                    frame.matched += 1;
                }
            }
        }

        // Step 5: Create tracks from unmatched observations
        for &observation_idx in &assignment.unassigned_observations {
            if self.tracks.len() >= self.config.max_active_tracks {
                frame.capacity_exceeded += 1;
                continue;
            }
            let id = self.allocate_id();
            let track = Track::new(id, valid[observation_idx], timestamp, self.params);
            log::debug!("Created track {id} at {}", valid[observation_idx]);
            self.tracks.insert(id, track);
            frame.created += 1;
        }
        if frame.capacity_exceeded > 0 {
            log::debug!(
                "Capacity exceeded: dropped {} observations with {} live tracks",
                frame.capacity_exceeded,
                self.tracks.len()
            );
        }

        // Step 6: Advance the lifecycle of unmatched pre-existing tracks
        let hints = std::mem::take(&mut self.occlusion_hints);
        for (track_idx, id) in track_ids.iter().enumerate() {
            if matched[track_idx] {
                continue;
            }
            let Some(track) = self.tracks.get_mut(id) else {
                continue;
            };
            track.register_miss(
                self.config.loss_threshold,
                hints.contains(id),
                self.config.occlusion_policy,
            );
            track.check_confidence(self.config.min_track_confidence);
        }

        // Step 7: Evict lost tracks
        let before = self.tracks.len();
        self.tracks.retain(|id, track| {
            let lost = track.lifecycle_state().is_lost();
            if lost {
                log::debug!(
                    "Evicting track {id}: {} after {} detections",
                    track.lifecycle_state(),
                    track.total_detections()
                );
            }
            !lost
        });
        frame.evicted = before - self.tracks.len();

        self.last_timestamp = Some(timestamp);
        self.stats.record(&frame);
        self.last_frame = frame;
        log::trace!("Frame at t={timestamp:.3}: {frame:?}");

        self.snapshot()
    }

    /// Timestamps never move backwards; non-finite ones reuse the last frame time
    fn clamp_timestamp(&self, timestamp: f64) -> f64 {
        match self.last_timestamp {
            Some(last) if !timestamp.is_finite() || timestamp < last => {
                log::debug!("Clamping timestamp {timestamp} to last frame time {last}");
                last
            }
            None if !timestamp.is_finite() => 0.0,
            _ => timestamp,
        }
    }

    fn allocate_id(&mut self) -> TrackId {
        loop {
            let id = TrackId(self.next_track_id);
            self.next_track_id = self.next_track_id.wrapping_add(1).max(1);
            if !self.tracks.contains_key(&id) {
                return id;
            }
        }
    }

    /// Predicted positions of all live tracks at `timestamp`, without side effects
    pub fn predict_at(&self, timestamp: f64) -> Vec<(TrackId, Point3<f64>)> {
        self.tracks
            .par_iter()
            .map(|(id, track)| (*id, track.predicted_position(timestamp)))
            .collect()
    }

    /// Sample `resolution` future states of a track over the next `duration` seconds
    pub fn trajectory(
        &self,
        id: TrackId,
        duration: f64,
        resolution: usize,
    ) -> Result<Vec<TrajectoryPoint>> {
        let track = self.tracks.get(&id).ok_or(TrackingError::TrackNotFound(id))?;
        Ok(TrajectoryPredictor::sample(
            track,
            track.last_timestamp(),
            duration,
            resolution,
        ))
    }

    /// Hint that a track is hidden rather than gone
    ///
    /// Applies to the next `step`: if the track is not matched there it becomes
    /// occluded instead of predicted/jittering.
    pub fn mark_occluded(&mut self, id: TrackId) -> Result<()> {
        if !self.tracks.contains_key(&id) {
            return Err(TrackingError::TrackNotFound(id));
        }
        self.occlusion_hints.insert(id);
        Ok(())
    }

    /// Drop a track; returns whether it existed
    pub fn remove(&mut self, id: TrackId) -> bool {
        self.occlusion_hints.remove(&id);
        let removed = self.tracks.remove(&id).is_some();
        if removed {
            log::debug!("Removed track {id} on request");
        }
        removed
    }

    /// Clear all tracks and counters; ids restart from 1
    pub fn reset(&mut self) {
        log::info!("Resetting TrackManager ({} live tracks)", self.tracks.len());
        self.tracks.clear();
        self.occlusion_hints.clear();
        self.next_track_id = 1;
        self.last_timestamp = None;
        self.last_frame = FrameMetrics::default();
        self.stats = TrackerStats::default();
    }

    fn snapshot_of(&self, track: &Track) -> TrackSnapshot {
        TrackSnapshot {
            id: track.id(),
            position: track.predicted_position(track.last_timestamp()),
            velocity: track.velocity(),
            confidence: track.confidence(),
            lifecycle_state: track.lifecycle_state(),
            age: track.age(),
            total_detections: track.total_detections(),
            average_confidence: track.average_confidence(),
            consecutive_misses: track.consecutive_misses(),
            position_uncertainty: track.estimator().position_uncertainty(),
            motion: track.motion_state(self.config.stationary_speed),
        }
    }

    /// All live tracks in ascending id order
    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.tracks
            .values()
            .map(|track| self.snapshot_of(track))
            .collect()
    }

    pub fn track(&self, id: TrackId) -> Option<TrackSnapshot> {
        self.tracks.get(&id).map(|track| self.snapshot_of(track))
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Whether at least one track is live
    pub fn is_tracking(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// Timestamp of the most recent `step`
    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn last_frame(&self) -> FrameMetrics {
        self.last_frame
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
