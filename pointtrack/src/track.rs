//! Individual point track: state estimator plus lifecycle bookkeeping

use crate::config::OcclusionPolicy;
use crate::kalman::{sanitize_confidence, EstimatorParams, StateEstimator};
use crate::observation::Observation;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of recent observation confidences kept per track
pub const CONFIDENCE_HISTORY_CAPACITY: usize = 20;

/// Misses that are still reported as a plain prediction
const PREDICTED_MISS_LIMIT: u32 = 2;

/// Stable track identifier, unique among the live tracks of a manager
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a track was lost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LostReason {
    /// Consecutive misses reached the loss threshold
    MissedDetections,
    /// Estimator confidence dropped below the configured minimum
    LowConfidence,
}

/// Visibility classification derived from the consecutive miss counter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Matched in the most recent frame
    Active,
    /// Briefly unobserved, the prediction is trustworthy
    Predicted,
    /// Unobserved long enough to be unreliable
    Jittering { severity: f64 },
    /// Hidden behind something according to the caller
    Occluded,
    /// Terminal, removed on the frame it is reached
    Lost(LostReason),
}

impl LifecycleState {
    /// State for a track that has missed `misses` frames in a row
    pub fn from_misses(misses: u32, loss_threshold: u32) -> Self {
        match misses {
            0 => Self::Active,
            m if m >= loss_threshold => Self::Lost(LostReason::MissedDetections),
            m if m <= PREDICTED_MISS_LIMIT => Self::Predicted,
            m => Self::Jittering {
                severity: f64::from(m) / f64::from(loss_threshold),
            },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, Self::Lost(_))
    }

    pub fn is_occluded(&self) -> bool {
        matches!(self, Self::Occluded)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Predicted => write!(f, "predicted"),
            Self::Jittering { severity } => write!(f, "jittering({severity:.2})"),
            Self::Occluded => write!(f, "occluded"),
            Self::Lost(reason) => write!(f, "lost({reason:?})"),
        }
    }
}

/// Coarse motion classification of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Stationary,
    Moving,
}

/// Bounded FIFO of recent observation confidences
#[derive(Debug, Clone, Default)]
pub struct ConfidenceHistory {
    values: VecDeque<f64>,
}

impl ConfidenceHistory {
    pub fn new() -> Self {
        Self {
            values: VecDeque::with_capacity(CONFIDENCE_HISTORY_CAPACITY),
        }
    }

    /// Append a confidence, evicting the oldest entry when full
    pub fn push(&mut self, confidence: f64) {
        if self.values.len() == CONFIDENCE_HISTORY_CAPACITY {
            self.values.pop_front();
        }
        self.values.push_back(confidence);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Rolling mean, 0 when empty
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    /// Standard deviation of the window, 0 with fewer than two samples
    pub fn std_dev(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.average();
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        variance.sqrt()
    }
}

/// A persistent estimate of one object's motion
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    estimator: StateEstimator,
    /// time of the last predict/update
    last_timestamp: f64,
    consecutive_misses: u32,
    total_detections: u32,
    /// frames stepped since creation
    age: u32,
    confidence_history: ConfidenceHistory,
    lifecycle_state: LifecycleState,
}

impl Track {
    /// Start a track from an unmatched observation
    pub fn new(id: TrackId, observation: &Observation, at: f64, params: EstimatorParams) -> Self {
        let mut estimator = StateEstimator::new(observation.position, at, params);
        let confidence = sanitize_confidence(observation.confidence);
        estimator.update(&observation.position, at, confidence);

        let mut confidence_history = ConfidenceHistory::new();
        confidence_history.push(confidence);

        Self {
            id,
            estimator,
            last_timestamp: at,
            consecutive_misses: 0,
            total_detections: 1,
            age: 0,
            confidence_history,
            lifecycle_state: LifecycleState::Active,
        }
    }

    /// Advance the track to `at`, returning the position used for association
    ///
    /// Occluded tracks follow their occlusion policy and keep their confidence.
    pub fn predict(&mut self, at: f64) -> Point3<f64> {
        self.age = self.age.saturating_add(1);
        if at > self.last_timestamp {
            self.last_timestamp = at;
        }
        if self.lifecycle_state.is_occluded() {
            self.estimator.predicted_position(at)
        } else {
            self.estimator.predict(at)
        }
    }

    /// Position at `at` without mutating anything
    pub fn predicted_position(&self, at: f64) -> Point3<f64> {
        self.estimator.predicted_position(at)
    }

    /// Fuse a matched observation, returning `false` if it was rejected
    pub fn register_hit(&mut self, observation: &Observation, at: f64) -> bool {
        let confidence = sanitize_confidence(observation.confidence);
        if !self.estimator.update(&observation.position, at, confidence) {
            return false;
        }

        self.consecutive_misses = 0;
        self.total_detections = self.total_detections.saturating_add(1);
        self.confidence_history.push(confidence);
        self.lifecycle_state = LifecycleState::Active;
        if at > self.last_timestamp {
            self.last_timestamp = at;
        }
        true
    }

    /// Record a frame without a matching observation
    ///
    /// Once occluded, a track stays occluded until it is matched again or lost.
    pub fn register_miss(&mut self, loss_threshold: u32, occluded: bool, policy: OcclusionPolicy) {
        self.consecutive_misses = self.consecutive_misses.saturating_add(1);

        let next = LifecycleState::from_misses(self.consecutive_misses, loss_threshold);
        let occluded = occluded || self.lifecycle_state.is_occluded();

        self.lifecycle_state = if occluded && !next.is_lost() {
            if !self.lifecycle_state.is_occluded() && policy == OcclusionPolicy::Freeze {
                self.estimator.freeze(self.last_timestamp);
            }
            LifecycleState::Occluded
        } else {
            next
        };
    }

    /// Mark the track lost if its confidence fell below `min_confidence`
    pub fn check_confidence(&mut self, min_confidence: f64) {
        if !self.lifecycle_state.is_lost() && self.estimator.confidence() < min_confidence {
            self.lifecycle_state = LifecycleState::Lost(LostReason::LowConfidence);
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn estimator(&self) -> &StateEstimator {
        &self.estimator
    }

    pub fn position(&self) -> Point3<f64> {
        self.estimator.position()
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.estimator.velocity()
    }

    pub fn confidence(&self) -> f64 {
        self.estimator.confidence()
    }

    pub fn last_timestamp(&self) -> f64 {
        self.last_timestamp
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    pub fn total_detections(&self) -> u32 {
        self.total_detections
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle_state
    }

    pub fn confidence_history(&self) -> &ConfidenceHistory {
        &self.confidence_history
    }

    pub fn average_confidence(&self) -> f64 {
        self.confidence_history.average()
    }

    /// Spread of recent observation confidences (lower is steadier)
    pub fn confidence_stability(&self) -> f64 {
        self.confidence_history.std_dev()
    }

    /// Steady detections with a reasonable average confidence
    pub fn is_stable(&self, max_spread: f64, min_average: f64) -> bool {
        self.confidence_history.len() >= 3
            && self.confidence_stability() <= max_spread
            && self.average_confidence() >= min_average
    }

    pub fn motion_state(&self, stationary_speed: f64) -> MotionState {
        if self.velocity().norm() < stationary_speed {
            MotionState::Stationary
        } else {
            MotionState::Moving
        }
    }
}
