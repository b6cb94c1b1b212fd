//! Real-time 3D point tracking library
//!
//! Keeps persistent identities for objects reported as noisy 3D positions by an
//! external detector. Each track carries a constant-velocity estimator with a
//! per-axis diagonal covariance; observations are associated to tracks by a
//! gated greedy or optimal matcher, and tracks move through a lifecycle driven
//! by their consecutive misses.
//!
//! ```rust,ignore
//! use pointtrack::{Observation, TrackManager, TrackerConfig};
//!
//! let mut tracker = TrackManager::new(TrackerConfig::default())?;
//!
//! let tracks = tracker.step(&[Observation::at(0.0, 0.0, 1.0, 0.9, 0.0)], 0.0);
//! let predicted = tracker.predict_at(0.5);
//! let path = tracker.trajectory(tracks[0].id, 1.0, 10)?;
//! ```

pub mod association;
pub mod config;
pub mod error;
pub mod kalman;
pub mod manager;
pub mod observation;
pub mod operator;
pub mod track;
pub mod trajectory;

pub use association::{AssignmentResult, Associator};
pub use config::{AssociationAlgorithm, OcclusionPolicy, TrackerConfig};
pub use error::{Result, TrackingError};
pub use kalman::{EstimatorParams, StateEstimator};
pub use manager::{FrameMetrics, TrackManager, TrackSnapshot, TrackerStats};
pub use observation::Observation;
pub use operator::TrackingOperator;
pub use track::{LifecycleState, LostReason, MotionState, Track, TrackId};
pub use trajectory::{TrajectoryPoint, TrajectoryPredictor};
