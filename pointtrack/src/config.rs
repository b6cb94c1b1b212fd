//! Tracker configuration
//!
//! All tunables are gathered in [`TrackerConfig`], which is handed to
//! [`TrackManager::new`](crate::TrackManager::new) and validated there.
//! Distances are in the caller's world units (metres for the pool table),
//! times are in seconds.

use crate::error::{Result, TrackingError};
use serde::{Deserialize, Serialize};

/// Data association strategy used to match observations to tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationAlgorithm {
    /// Tracks in ascending id order grab their nearest gated observation
    #[default]
    GreedyNearestNeighbor,
    /// Minimum total distance bipartite matching (Kuhn-Munkres)
    OptimalAssignment,
}

impl std::fmt::Display for AssociationAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreedyNearestNeighbor => write!(f, "greedy nearest neighbor"),
            Self::OptimalAssignment => write!(f, "optimal assignment"),
        }
    }
}

/// How the position of an occluded track evolves while it is hidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcclusionPolicy {
    /// Hold the last estimated position
    #[default]
    Freeze,
    /// Keep extrapolating with the last velocity estimate
    Coast,
}

/// Configuration for the multi-object tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum number of simultaneously live tracks
    pub max_active_tracks: usize,
    /// Gate: largest prediction-to-observation distance that may associate
    pub max_association_distance: f64,
    /// Consecutive misses after which a track is lost
    pub loss_threshold: u32,
    /// Process noise added to the variance per second of prediction
    pub process_noise: f64,
    /// Measurement noise variance of a full-confidence observation
    pub measurement_noise: f64,
    /// Per-frame multiplicative confidence decay while unobserved
    pub confidence_decay_factor: f64,
    pub association_algorithm: AssociationAlgorithm,
    /// Per-axis position variance of a freshly created track
    pub initial_variance: f64,
    pub min_variance: f64,
    pub max_variance: f64,
    /// Fraction of an observation's confidence added to the track confidence
    pub responsiveness: f64,
    /// Fraction of the position innovation fed into the velocity estimate
    pub velocity_gain: f64,
    /// Nominal detector frame period (seconds)
    pub nominal_frame_interval: f64,
    /// Confidence of a freshly reset estimator
    pub confidence_floor: f64,
    /// Tracks whose confidence drops below this are lost
    pub min_track_confidence: f64,
    pub occlusion_policy: OcclusionPolicy,
    /// Speed below which a track is reported as stationary
    pub stationary_speed: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_active_tracks: 16, // full rack of pool balls
            max_association_distance: 0.15,
            loss_threshold: 5,
            process_noise: 0.05,
            measurement_noise: 0.001,
            confidence_decay_factor: 0.95,
            association_algorithm: AssociationAlgorithm::default(),
            initial_variance: 0.01,
            min_variance: 1e-6,
            max_variance: 10.0,
            responsiveness: 0.3,
            velocity_gain: 0.3,
            nominal_frame_interval: 1.0 / 30.0,
            confidence_floor: 0.1,
            min_track_confidence: 0.05,
            occlusion_policy: OcclusionPolicy::default(),
            stationary_speed: 0.02,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TrackingError::invalid_config(
            field,
            format!("must be a finite value > 0, got {value}"),
        ))
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(TrackingError::invalid_config(
            field,
            format!("must lie in [0, 1], got {value}"),
        ))
    }
}

impl TrackerConfig {
    /// Check every field, reporting the first violation
    pub fn validate(&self) -> Result<()> {
        if self.max_active_tracks == 0 {
            return Err(TrackingError::invalid_config(
                "max_active_tracks",
                "must be greater than 0",
            ));
        }
        positive("max_association_distance", self.max_association_distance)?;
        if self.loss_threshold < 3 {
            return Err(TrackingError::invalid_config(
                "loss_threshold",
                format!("must be at least 3, got {}", self.loss_threshold),
            ));
        }
        positive("process_noise", self.process_noise)?;
        positive("measurement_noise", self.measurement_noise)?;
        if !(self.confidence_decay_factor > 0.0 && self.confidence_decay_factor < 1.0) {
            return Err(TrackingError::invalid_config(
                "confidence_decay_factor",
                format!(
                    "must lie strictly between 0 and 1, got {}",
                    self.confidence_decay_factor
                ),
            ));
        }
        positive("min_variance", self.min_variance)?;
        positive("max_variance", self.max_variance)?;
        if self.max_variance < self.min_variance {
            return Err(TrackingError::invalid_config(
                "max_variance",
                format!(
                    "must not be smaller than min_variance ({} < {})",
                    self.max_variance, self.min_variance
                ),
            ));
        }
        if !(self.min_variance..=self.max_variance).contains(&self.initial_variance) {
            return Err(TrackingError::invalid_config(
                "initial_variance",
                format!(
                    "must lie in [{}, {}], got {}",
                    self.min_variance, self.max_variance, self.initial_variance
                ),
            ));
        }
        unit_interval("responsiveness", self.responsiveness)?;
        unit_interval("velocity_gain", self.velocity_gain)?;
        positive("nominal_frame_interval", self.nominal_frame_interval)?;
        if !(0.0..1.0).contains(&self.confidence_floor) {
            return Err(TrackingError::invalid_config(
                "confidence_floor",
                format!("must lie in [0, 1), got {}", self.confidence_floor),
            ));
        }
        unit_interval("min_track_confidence", self.min_track_confidence)?;
        if !(self.stationary_speed.is_finite() && self.stationary_speed >= 0.0) {
            return Err(TrackingError::invalid_config(
                "stationary_speed",
                format!("must be a finite value >= 0, got {}", self.stationary_speed),
            ));
        }
        Ok(())
    }
}
