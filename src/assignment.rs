//! Point-to-point assignment: vehicles to mission slots.

use crate::cancel::CancelToken;
use crate::distances::{distance_matrix, Distance, Point};
use crate::matching::{solve_assignment_with_cancel, Assignment, MatchingOptions};
use crate::Result;

/// Match `sources` to `targets` using `distance` as the pairwise cost.
///
/// Builds a `len(sources) x len(targets)` cost matrix and hands it to
/// [`crate::matching::solve_assignment`]. The metric only decides how points
/// are interpreted; with [`crate::DistanceMetric::Geodetic`] the threshold is
/// in meters.
///
/// # Example
///
/// ```rust
/// use swarm_assign::{assign_points, DistanceMetric, MatchingOptions};
///
/// let vehicles = [[0.0, 0.0], [10.0, 0.0]];
/// let slots = [[9.0, 1.0], [1.0, 1.0]];
/// let assignment =
///     assign_points(&vehicles, &slots, &DistanceMetric::Euclidean, &MatchingOptions::greedy())
///         .unwrap();
/// assert_eq!(assignment.pairs(), &[(0, 1), (1, 0)]);
/// ```
pub fn assign_points<D>(
    sources: &[Point],
    targets: &[Point],
    distance: &D,
    options: &MatchingOptions,
) -> Result<Assignment>
where
    D: Distance + ?Sized,
{
    assign_points_with_cancel(sources, targets, distance, options, &CancelToken::new())
}

/// [`assign_points`] that polls `cancel` while matching.
pub fn assign_points_with_cancel<D>(
    sources: &[Point],
    targets: &[Point],
    distance: &D,
    options: &MatchingOptions,
    cancel: &CancelToken,
) -> Result<Assignment>
where
    D: Distance + ?Sized,
{
    let matrix = distance_matrix(sources, targets, distance);
    cancel.check()?;
    solve_assignment_with_cancel(&matrix, options, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::{distance_matrix, DistanceMetric};
    use crate::Error;

    #[test]
    fn test_assign_points_euclidean() {
        let sources = [[0.0, 0.0], [10.0, 0.0], [20.0, 0.0]];
        let targets = [[21.0, 0.0], [0.5, 0.0], [10.0, 2.0]];
        let assignment =
            assign_points(&sources, &targets, &DistanceMetric::Euclidean, &MatchingOptions::greedy())
                .unwrap();

        // Sorted candidates: s0-t1=0.5, s2-t0=1.0, s1-t2=2.0
        assert_eq!(assignment.pairs(), &[(0, 1), (2, 0), (1, 2)]);
    }

    #[test]
    fn test_assign_points_geodetic_threshold_in_meters() {
        // Two vehicles ~11 m and ~1.1 km away from their nearest slot
        let vehicles = [[19.0, 47.0], [19.0, 47.01]];
        let slots = [[19.0, 47.0001], [19.0, 47.02]];
        let options = MatchingOptions::greedy().with_threshold(50.0);
        let assignment =
            assign_points(&vehicles, &slots, &DistanceMetric::Geodetic, &options).unwrap();

        assert_eq!(assignment.pairs(), &[(0, 0)]);
        assert_eq!(assignment.unmatched_sources(2), vec![1]);
    }

    #[test]
    fn test_assign_points_empty_inputs() {
        let points = [[0.0, 0.0]];
        for options in [MatchingOptions::greedy(), MatchingOptions::hungarian()] {
            assert!(assign_points(&[], &points, &DistanceMetric::Euclidean, &options)
                .unwrap()
                .is_empty());
            assert!(assign_points(&points, &[], &DistanceMetric::Euclidean, &options)
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_assign_points_hungarian_avoids_long_leg() {
        // Greedy grabs the 1.0 pair and leaves a 5.0 leg; optimal pays 2 + 2
        let sources = [[0.0, 0.0], [3.0, 0.0]];
        let targets = [[1.0, 0.0], [-2.0, 0.0]];
        let matrix = distance_matrix(&sources, &targets, &DistanceMetric::Euclidean);
        let greedy =
            assign_points(&sources, &targets, &DistanceMetric::Euclidean, &MatchingOptions::greedy())
                .unwrap();
        let optimal = assign_points(
            &sources,
            &targets,
            &DistanceMetric::Euclidean,
            &MatchingOptions::hungarian(),
        )
        .unwrap();

        assert_eq!(greedy.total_cost(&matrix), 6.0);
        assert_eq!(optimal.total_cost(&matrix), 4.0);
    }

    #[test]
    fn test_assign_points_is_pure() {
        let sources: Vec<Point> = (0..12).map(|i| [i as f64 * 1.5, (i % 3) as f64]).collect();
        let targets: Vec<Point> = (0..10).map(|i| [i as f64 * 1.7, (i % 4) as f64]).collect();
        for options in [MatchingOptions::greedy(), MatchingOptions::hungarian()] {
            let a = assign_points(&sources, &targets, &DistanceMetric::Euclidean, &options).unwrap();
            let b = assign_points(&sources, &targets, &DistanceMetric::Euclidean, &options).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.len(), 10);
        }
    }

    #[test]
    fn test_assign_points_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let result = assign_points_with_cancel(
            &[[0.0, 0.0]],
            &[[1.0, 1.0]],
            &DistanceMetric::Euclidean,
            &MatchingOptions::greedy(),
            &token,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
