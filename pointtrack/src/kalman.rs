//! Simplified Kalman filter for point tracking
//!
//! State is `[x, y, z, vx, vy, vz]` under a constant velocity model. Instead of
//! propagating a full 6x6 covariance, each axis keeps an independent position
//! and velocity variance (diagonal covariance), which keeps the update cheap and
//! free of matrix inversions.

use crate::config::TrackerConfig;
use nalgebra::{Point3, Vector3};

/// Lower bound on the confidence used to weight the measurement noise
const MIN_CONFIDENCE_WEIGHT: f64 = 1e-3;

/// Noise and decay parameters of a [`StateEstimator`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorParams {
    pub process_noise: f64,
    pub measurement_noise: f64,
    pub initial_variance: f64,
    pub min_variance: f64,
    pub max_variance: f64,
    pub confidence_decay_factor: f64,
    pub responsiveness: f64,
    pub velocity_gain: f64,
    pub nominal_frame_interval: f64,
    pub confidence_floor: f64,
}

impl From<&TrackerConfig> for EstimatorParams {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            process_noise: config.process_noise,
            measurement_noise: config.measurement_noise,
            initial_variance: config.initial_variance,
            min_variance: config.min_variance,
            max_variance: config.max_variance,
            confidence_decay_factor: config.confidence_decay_factor,
            responsiveness: config.responsiveness,
            velocity_gain: config.velocity_gain,
            nominal_frame_interval: config.nominal_frame_interval,
            confidence_floor: config.confidence_floor,
        }
    }
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl EstimatorParams {
    fn clamp_variance(&self, variance: Vector3<f64>) -> Vector3<f64> {
        variance.map(|v| {
            if v.is_nan() {
                self.max_variance
            } else {
                v.clamp(self.min_variance, self.max_variance)
            }
        })
    }

    /// Confidence multiplier for `elapsed` seconds without an observation
    ///
    /// Gaps up to one nominal frame decay by exactly one factor; longer gaps
    /// decay exponentially in the number of elapsed frame periods.
    fn decay_over(&self, elapsed: f64) -> f64 {
        let periods = (elapsed / self.nominal_frame_interval).max(1.0);
        self.confidence_decay_factor.powf(periods)
    }
}

/// Map any confidence value into `[0, 1]`, treating NaN as zero
pub fn sanitize_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

fn is_finite_point(point: &Point3<f64>) -> bool {
    point.coords.iter().all(|v| v.is_finite())
}

/// Position/velocity estimate of a single object
#[derive(Debug, Clone)]
pub struct StateEstimator {
    position: Vector3<f64>,
    velocity: Vector3<f64>,
    position_variance: Vector3<f64>,
    velocity_variance: Vector3<f64>,
    confidence: f64,
    /// time the position/velocity refer to
    timestamp: f64,
    /// time up to which confidence decay has been applied
    decayed_through: f64,
    params: EstimatorParams,
}

impl StateEstimator {
    /// Create an estimator at rest at `position`
    pub fn new(position: Point3<f64>, at: f64, params: EstimatorParams) -> Self {
        Self::with_state(position, Vector3::zeros(), at, params)
    }

    /// Create an estimator with a known velocity
    pub fn with_state(
        position: Point3<f64>,
        velocity: Vector3<f64>,
        at: f64,
        params: EstimatorParams,
    ) -> Self {
        let at = if at.is_finite() { at } else { 0.0 };
        let mut estimator = Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            position_variance: Vector3::zeros(),
            velocity_variance: Vector3::zeros(),
            confidence: 0.0,
            timestamp: at,
            decayed_through: at,
            params,
        };
        estimator.reset(position);
        if velocity.iter().all(|v| v.is_finite()) {
            estimator.velocity = velocity;
        }
        estimator
    }

    /// Reinitialize at `to` with zero velocity, default variance and floor confidence
    pub fn reset(&mut self, to: Point3<f64>) {
        if is_finite_point(&to) {
            self.position = to.coords;
        }
        self.velocity = Vector3::zeros();
        self.position_variance = self
            .params
            .clamp_variance(Vector3::repeat(self.params.initial_variance));
        // velocity is unobserved at birth, start it wide open
        self.velocity_variance = Vector3::repeat(self.params.max_variance);
        self.confidence = self.params.confidence_floor;
    }

    /// Seconds between the state timestamp and `at`, never negative
    pub fn elapsed(&self, at: f64) -> f64 {
        (at - self.timestamp).max(0.0)
    }

    /// Constant velocity extrapolation to `at` without touching any state
    pub fn predicted_position(&self, at: f64) -> Point3<f64> {
        Point3::from(self.position + self.velocity * self.elapsed(at))
    }

    /// Predict the position at `at`, decaying confidence for the unobserved time
    ///
    /// Position and velocity are not advanced, so repeated calls at the same
    /// timestamp return the same position.
    pub fn predict(&mut self, at: f64) -> Point3<f64> {
        self.decay_confidence(at);
        self.predicted_position(at)
    }

    /// Repeated calls at the same time decay only once
    fn decay_confidence(&mut self, at: f64) {
        let elapsed = at - self.decayed_through;
        if elapsed > 0.0 {
            self.confidence *= self.params.decay_over(elapsed);
            self.decayed_through = at;
        }
    }

    /// Constant velocity prediction step over `dt` seconds
    fn propagate(&mut self, dt: f64) {
        let params = self.params;
        self.position += self.velocity * dt;
        self.position_variance = params.clamp_variance(
            (self.position_variance + self.velocity_variance * (dt * dt))
                .add_scalar(params.process_noise * dt),
        );
        self.velocity_variance =
            params.clamp_variance(self.velocity_variance.add_scalar(params.process_noise * dt));
    }

    /// Confidence expected after `horizon` more seconds without observations
    pub fn decayed_confidence(&self, horizon: f64) -> f64 {
        if horizon > 0.0 {
            self.confidence * self.params.decay_over(horizon)
        } else {
            self.confidence
        }
    }

    /// Fuse an observation taken at `at`
    ///
    /// Returns `false` and leaves the state untouched when the observed
    /// position is not finite.
    pub fn update(&mut self, observation: &Point3<f64>, at: f64, confidence: f64) -> bool {
        if !is_finite_point(observation) {
            return false;
        }
        let confidence = sanitize_confidence(confidence);
        let params = self.params;
        let dt = self.elapsed(at);

        self.propagate(dt);

        // Correction step, each axis on its own
        let measurement_noise = params.measurement_noise / confidence.max(MIN_CONFIDENCE_WEIGHT);
        let innovation = observation.coords - self.position;
        // No velocity measurement exists, so the innovation is turned into a
        // velocity correction over the time it accumulated in.
        let interval = if dt > f64::EPSILON {
            dt
        } else {
            params.nominal_frame_interval
        };

        for axis in 0..3 {
            let prior = self.position_variance[axis];
            let gain = prior / (prior + measurement_noise);

            self.position[axis] += gain * innovation[axis];
            self.position_variance[axis] = (1.0 - gain) * prior;
            self.velocity[axis] += params.velocity_gain * innovation[axis] / interval;
            self.velocity_variance[axis] *= 1.0 - params.velocity_gain * gain;
        }
        self.position_variance = params.clamp_variance(self.position_variance);
        self.velocity_variance = params.clamp_variance(self.velocity_variance);

        self.confidence = (self.confidence + confidence * params.responsiveness).min(1.0);

        if at > self.timestamp {
            self.timestamp = at;
        }
        if at > self.decayed_through {
            self.decayed_through = at;
        }
        true
    }

    /// Advance to `at`, then drop the velocity so the object holds that position
    pub fn freeze(&mut self, at: f64) {
        let dt = self.elapsed(at);
        self.propagate(dt);
        if at > self.timestamp {
            self.timestamp = at;
        }
        self.velocity = Vector3::zeros();
    }

    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.position)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Per-axis standard deviation of the position estimate
    pub fn position_uncertainty(&self) -> Vector3<f64> {
        self.position_variance.map(f64::sqrt)
    }

    pub fn position_variance(&self) -> Vector3<f64> {
        self.position_variance
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }
}
