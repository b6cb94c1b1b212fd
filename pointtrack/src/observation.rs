//! Observations produced by an external detector and distance helpers

use nalgebra::Point3;
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// One detector measurement of an object's position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub position: Point3<f64>,
    /// Detector confidence in `[0, 1]`
    pub confidence: f64,
    /// Capture time in seconds
    pub timestamp: f64,
}

impl Observation {
    pub fn new(position: Point3<f64>, confidence: f64, timestamp: f64) -> Self {
        Self {
            position,
            confidence,
            timestamp,
        }
    }

    pub fn at(x: f64, y: f64, z: f64, confidence: f64, timestamp: f64) -> Self {
        Self::new(Point3::new(x, y, z), confidence, timestamp)
    }

    /// Whether every coordinate is finite
    pub fn is_valid(&self) -> bool {
        self.position.coords.iter().all(|v| v.is_finite())
    }
}

impl std::fmt::Display for Observation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Observation(({:.3}, {:.3}, {:.3}), conf={:.2}, t={:.3})",
            self.position.x, self.position.y, self.position.z, self.confidence, self.timestamp
        )
    }
}

/// Euclidean distance matrix between predictions and observed positions
///
/// Returns: (n_predictions, n_observations) matrix
pub fn distance_matrix(predictions: &[Point3<f64>], observations: &[Point3<f64>]) -> Array2<f64> {
    let mut distances = Array2::zeros((predictions.len(), observations.len()));
    if distances.is_empty() {
        return distances;
    }

    Zip::indexed(&mut distances).par_for_each(|(i, j), distance| {
        *distance = nalgebra::distance(&predictions[i], &observations[j]);
    });

    distances
}
