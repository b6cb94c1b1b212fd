//! Data association between predicted track positions and observations
//!
//! Two strategies are available: a deterministic greedy nearest-neighbour pass
//! and an optimal minimum-total-distance assignment (Kuhn-Munkres). Both only
//! return pairs whose distance is within the gate.
use crate::config::AssociationAlgorithm;
use crate::observation::distance_matrix;
use nalgebra::Point3;
use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres_min, Matrix};

/// Distances closer than this are treated as ties
const TIE_TOLERANCE: f64 = 1e-9;

/// Integer resolution of a gate-normalised distance for the optimal solver
const COST_SCALE: f64 = 1_000_000.0;

/// Result of an association pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    /// Assignments as (track_idx, observation_idx) pairs
    pub assignments: Vec<(usize, usize)>,
    /// Indices of tracks without an observation
    pub unassigned_tracks: Vec<usize>,
    /// Indices of observations without a track
    pub unassigned_observations: Vec<usize>,
    /// Sum of the distances of all assignments
    pub total_distance: f64,
}

impl AssignmentResult {
    fn from_assignments(assignments: Vec<(usize, usize)>, distances: ArrayView2<f64>) -> Self {
        let (num_tracks, num_observations) = distances.dim();
        let mut track_taken = vec![false; num_tracks];
        let mut observation_taken = vec![false; num_observations];

        for &(track_idx, observation_idx) in &assignments {
            track_taken[track_idx] = true;
            observation_taken[observation_idx] = true;
        }

        let total_distance = assignments
            .iter()
            .map(|&(track_idx, observation_idx)| distances[[track_idx, observation_idx]])
            .sum();

        Self {
            assignments,
            unassigned_tracks: (0..num_tracks).filter(|&i| !track_taken[i]).collect(),
            unassigned_observations: (0..num_observations)
                .filter(|&i| !observation_taken[i])
                .collect(),
            total_distance,
        }
    }

    /// Observation matched to each track, indexed by track
    pub fn by_track(&self, num_tracks: usize) -> Vec<Option<usize>> {
        let mut matches = vec![None; num_tracks];
        for &(track_idx, observation_idx) in &self.assignments {
            matches[track_idx] = Some(observation_idx);
        }
        matches
    }
}

/// Gated one-to-one matcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Associator {
    pub algorithm: AssociationAlgorithm,
    /// Largest distance that may be associated (inclusive)
    pub max_distance: f64,
}

impl Associator {
    pub fn new(algorithm: AssociationAlgorithm, max_distance: f64) -> Self {
        Self {
            algorithm,
            max_distance,
        }
    }

    /// Match predicted track positions (in a stable order) to observed positions
    pub fn associate(
        &self,
        predictions: &[Point3<f64>],
        observations: &[Point3<f64>],
    ) -> AssignmentResult {
        let distances = distance_matrix(predictions, observations);
        self.solve(distances.view())
    }

    /// Solve on a precomputed (n_tracks, n_observations) distance matrix
    pub fn solve(&self, distances: ArrayView2<f64>) -> AssignmentResult {
        if distances.is_empty() {
            return AssignmentResult::from_assignments(Vec::new(), distances);
        }

        let assignments = match self.algorithm {
            AssociationAlgorithm::GreedyNearestNeighbor => self.solve_greedy(distances),
            AssociationAlgorithm::OptimalAssignment => self.solve_optimal(distances),
        };

        AssignmentResult::from_assignments(assignments, distances)
    }

    fn within_gate(&self, distance: f64) -> bool {
        // NaN never passes
        distance <= self.max_distance
    }

    /// Each track in turn takes its nearest free observation inside the gate
    ///
    /// Equidistant observations resolve to the lower index.
    fn solve_greedy(&self, distances: ArrayView2<f64>) -> Vec<(usize, usize)> {
        let (num_tracks, num_observations) = distances.dim();
        let mut observation_taken = vec![false; num_observations];
        let mut assignments = Vec::new();

        for track_idx in 0..num_tracks {
            let mut best: Option<(usize, f64)> = None;

            for observation_idx in 0..num_observations {
                if observation_taken[observation_idx] {
                    continue;
                }
                let distance = distances[[track_idx, observation_idx]];
                if !self.within_gate(distance) {
                    continue;
                }
                match best {
                    Some((_, best_distance)) if distance + TIE_TOLERANCE >= best_distance => {}
                    _ => best = Some((observation_idx, distance)),
                }
            }

            if let Some((observation_idx, _)) = best {
                observation_taken[observation_idx] = true;
                assignments.push((track_idx, observation_idx));
            }
        }

        assignments
    }

    /// Minimum total distance matching over the gated pairs
    fn solve_optimal(&self, distances: ArrayView2<f64>) -> Vec<(usize, usize)> {
        let (num_tracks, num_observations) = distances.dim();

        // Square matrix padded with dummy entries. Admissible pairs cost at
        // most COST_SCALE after normalising by the gate; the penalty exceeds
        // the cost of any set of admissible pairs.
        let size = num_tracks.max(num_observations);
        let gate_cost = COST_SCALE as i64;
        let penalty = (size as i64 + 1) * gate_cost + 1;
        let mut costs = Matrix::new(size, size, penalty);

        for track_idx in 0..num_tracks {
            for observation_idx in 0..num_observations {
                let distance = distances[[track_idx, observation_idx]];
                if self.within_gate(distance) {
                    let normalised = (distance / self.max_distance * COST_SCALE).round();
                    costs[(track_idx, observation_idx)] =
                        num::cast::<f64, i64>(normalised).unwrap_or(gate_cost);
                }
            }
        }

        let (_total_cost, columns) = kuhn_munkres_min(&costs);

        columns
            .into_iter()
            .enumerate()
            .filter(|&(track_idx, observation_idx)| {
                track_idx < num_tracks
                    && observation_idx < num_observations
                    && self.within_gate(distances[[track_idx, observation_idx]])
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::point;
    use ndarray::array;

    fn greedy(max_distance: f64) -> Associator {
        Associator::new(AssociationAlgorithm::GreedyNearestNeighbor, max_distance)
    }

    fn optimal(max_distance: f64) -> Associator {
        Associator::new(AssociationAlgorithm::OptimalAssignment, max_distance)
    }

    #[test]
    fn test_empty_inputs() {
        for associator in [greedy(1.0), optimal(1.0)] {
            let no_tracks = associator.associate(&[], &[point![0.0, 0.0, 0.0]]);
            assert!(no_tracks.assignments.is_empty());
            assert_eq!(no_tracks.unassigned_observations, vec![0]);

            let no_observations = associator.associate(&[point![0.0, 0.0, 0.0]], &[]);
            assert!(no_observations.assignments.is_empty());
            assert_eq!(no_observations.unassigned_tracks, vec![0]);
        }
    }

    #[test]
    fn test_gate_boundary_is_inclusive() {
        for associator in [greedy(0.5), optimal(0.5)] {
            let at_gate = associator.solve(array![[0.5]].view());
            assert_eq!(at_gate.assignments, vec![(0, 0)]);

            let beyond = associator.solve(array![[0.5000001]].view());
            assert!(beyond.assignments.is_empty());
        }

        let result = greedy(0.5).associate(&[point![0.0, 0.0, 0.0]], &[point![0.5, 0.0, 0.0]]);
        assert_eq!(result.assignments, vec![(0, 0)]);
    }

    #[test]
    fn test_greedy_picks_nearest() {
        let result = greedy(1.0).associate(
            &[point![0.0, 0.0, 0.0], point![2.0, 0.0, 0.0]],
            &[
                point![2.1, 0.0, 0.0],
                point![0.3, 0.0, 0.0],
                point![0.1, 0.0, 0.0],
            ],
        );

        assert_eq!(result.assignments, vec![(0, 2), (1, 0)]);
        assert_eq!(result.unassigned_observations, vec![1]);
        assert!(result.unassigned_tracks.is_empty());
    }

    #[test]
    fn test_greedy_tie_goes_to_lower_index() {
        let result = greedy(2.0).associate(
            &[point![0.0, 0.0, 0.0]],
            &[point![1.0, 0.0, 0.0], point![-1.0, 0.0, 0.0]],
        );
        assert_eq!(result.assignments, vec![(0, 0)]);

        let near_tie = greedy(2.0).solve(array![[1.0, 1.0 - 1e-12]].view());
        assert_eq!(near_tie.assignments, vec![(0, 0)]);
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let tracks = [
            point![0.0, 0.0, 0.0],
            point![0.2, 0.0, 0.0],
            point![0.4, 0.1, 0.0],
        ];
        let observations = [
            point![0.1, 0.0, 0.0],
            point![0.3, 0.0, 0.0],
            point![0.35, 0.05, 0.0],
        ];

        let first = greedy(0.3).associate(&tracks, &observations);
        for _ in 0..10 {
            assert_eq!(greedy(0.3).associate(&tracks, &observations), first);
        }
    }

    #[test]
    fn test_optimal_avoids_stranding() {
        // Greedy hands observation 0 to track 0 and strands track 1
        let tracks = [point![0.0, 0.0, 0.0], point![1.0, 0.0, 0.0]];
        let observations = [point![0.4, 0.0, 0.0], point![-0.6, 0.0, 0.0]];

        let greedy_result = greedy(0.7).associate(&tracks, &observations);
        assert_eq!(greedy_result.assignments, vec![(0, 0)]);
        assert_eq!(greedy_result.unassigned_tracks, vec![1]);

        let optimal_result = optimal(0.7).associate(&tracks, &observations);
        let mut assignments = optimal_result.assignments.clone();
        assignments.sort_unstable();
        assert_eq!(assignments, vec![(0, 1), (1, 0)]);
        assert!(optimal_result.unassigned_tracks.is_empty());
    }

    #[test]
    fn test_optimal_minimises_total_distance() {
        let distances = array![[1.0, 2.0], [1.1, 5.0]];

        // Greedy: (0,0) + (1,1) = 6.0, optimal: (0,1) + (1,0) = 3.1
        let greedy_result = greedy(10.0).solve(distances.view());
        assert!((greedy_result.total_distance - 6.0).abs() < 1e-9);

        let optimal_result = optimal(10.0).solve(distances.view());
        assert!((optimal_result.total_distance - 3.1).abs() < 1e-9);
    }

    #[test]
    fn test_optimal_rectangular() {
        let tracks = [
            point![0.0, 0.0, 0.0],
            point![5.0, 0.0, 0.0],
            point![10.0, 0.0, 0.0],
        ];
        let observations = [point![5.1, 0.0, 0.0]];

        let result = optimal(1.0).associate(&tracks, &observations);
        assert_eq!(result.assignments, vec![(1, 0)]);
        assert_eq!(result.unassigned_tracks, vec![0, 2]);

        let wide = optimal(1.0).associate(&observations, &tracks);
        assert_eq!(wide.assignments, vec![(0, 1)]);
        assert_eq!(wide.unassigned_observations, vec![0, 2]);
    }

    #[test]
    fn test_pairs_respect_gate() {
        let distances = array![[0.1, 3.0, 0.2], [4.0, 0.05, 9.0], [7.0, 8.0, 6.0]];
        for associator in [greedy(0.5), optimal(0.5)] {
            let result = associator.solve(distances.view());
            for &(t, o) in &result.assignments {
                assert!(distances[[t, o]] <= 0.5);
            }
            assert!(result.unassigned_tracks.contains(&2));
        }
    }

    #[test]
    fn test_by_track() {
        let result = greedy(1.0).solve(array![[5.0, 0.1], [0.2, 5.0]].view());
        assert_eq!(result.by_track(2), vec![Some(1), Some(0)]);
    }
}
