//! Short horizon trajectory sampling

use crate::track::Track;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One sampled future state of a track
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub position: Point3<f64>,
    pub velocity: Vector3<f64>,
    /// Seconds after the sampling start
    pub time_offset: f64,
    pub confidence: f64,
}

/// Samples a track's estimator forward in prediction-only mode
pub struct TrajectoryPredictor;

impl TrajectoryPredictor {
    /// `resolution` evenly spaced points over `[now, now + duration]`, both ends included
    ///
    /// A resolution of 1 yields only `now`. Negative or non-finite durations
    /// are treated as zero. The track is not modified.
    pub fn sample(track: &Track, now: f64, duration: f64, resolution: usize) -> Vec<TrajectoryPoint> {
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        let step = if resolution > 1 {
            duration / (resolution - 1) as f64
        } else {
            0.0
        };

        let estimator = track.estimator();
        let velocity = estimator.velocity();
        // confidence is held while occluded
        let decays = !track.lifecycle_state().is_occluded();

        (0..resolution)
            .map(|i| {
                let time_offset = step * i as f64;
                let confidence = if decays {
                    estimator.decayed_confidence(time_offset)
                } else {
                    estimator.confidence()
                };

                TrajectoryPoint {
                    position: track.predicted_position(now + time_offset),
                    velocity,
                    time_offset,
                    confidence,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcclusionPolicy;
    use crate::kalman::EstimatorParams;
    use crate::observation::Observation;
    use crate::track::TrackId;
    use approx::assert_abs_diff_eq;

    fn moving_track() -> Track {
        let mut track = Track::new(
            TrackId(1),
            &Observation::at(0.0, 0.0, 0.0, 0.9, 0.0),
            0.0,
            EstimatorParams::default(),
        );
        track.predict(0.1);
        track.register_hit(&Observation::at(0.1, 0.0, 0.0, 0.9, 0.1), 0.1);
        track
    }

    #[test]
    fn test_sample_spacing_and_motion() {
        let track = moving_track();
        let now = track.estimator().timestamp();
        let points = TrajectoryPredictor::sample(&track, now, 1.0, 5);

        assert_eq!(points.len(), 5);
        assert_abs_diff_eq!(points[0].time_offset, 0.0);
        assert_abs_diff_eq!(points[4].time_offset, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(points[1].time_offset, 0.25, epsilon = 1e-12);

        assert_eq!(points[0].position, track.position());
        let vx = track.velocity().x;
        assert!(vx > 0.0);
        assert_abs_diff_eq!(
            points[4].position.x,
            track.position().x + vx,
            epsilon = 1e-9
        );

        // confidence never increases along the horizon
        for pair in points.windows(2) {
            assert!(pair[1].confidence <= pair[0].confidence);
        }
    }

    #[test]
    fn test_sample_does_not_mutate() {
        let track = moving_track();
        let before = track.confidence();
        let first = TrajectoryPredictor::sample(&track, 0.1, 0.5, 4);
        let second = TrajectoryPredictor::sample(&track, 0.1, 0.5, 4);

        assert_eq!(first, second);
        assert_eq!(track.confidence(), before);
    }

    #[test]
    fn test_degenerate_requests() {
        let track = moving_track();
        assert!(TrajectoryPredictor::sample(&track, 0.1, 1.0, 0).is_empty());

        let single = TrajectoryPredictor::sample(&track, 0.1, 1.0, 1);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].time_offset, 0.0);

        for duration in [-1.0, f64::NAN, f64::INFINITY] {
            let points = TrajectoryPredictor::sample(&track, 0.1, duration, 3);
            assert!(points.iter().all(|p| p.time_offset == 0.0));
        }
    }

    #[test]
    fn test_occluded_track_keeps_confidence() {
        let mut track = moving_track();
        track.predict(0.133);
        track.register_miss(5, true, OcclusionPolicy::Freeze);

        let points = TrajectoryPredictor::sample(&track, 0.133, 1.0, 3);
        assert!(points.iter().all(|p| p.confidence == track.confidence()));
        assert!(points.iter().all(|p| p.position == track.position()));
    }
}
