//! Distance trait definition.

use super::Point;
use crate::matching::CostMatrix;

/// Trait for distance functions used to build cost matrices.
///
/// Implementations must be pure: the same pair of points always yields the
/// same distance. Lower distances indicate better matches.
pub trait Distance: Send + Sync {
    /// Distance between two points.
    fn distance(&self, a: &Point, b: &Point) -> f64;

    /// Compute distances between every source and every target.
    ///
    /// # Returns
    /// Cost matrix of shape (n_sources, n_targets).
    /// Entry (i, j) is the distance between source i and target j.
    fn get_distances(&self, sources: &[Point], targets: &[Point]) -> CostMatrix {
        nalgebra::DMatrix::from_fn(sources.len(), targets.len(), |i, j| {
            self.distance(&sources[i], &targets[j])
        })
        .into()
    }
}

impl<F> Distance for F
where
    F: Fn(&Point, &Point) -> f64 + Send + Sync,
{
    #[inline]
    fn distance(&self, a: &Point, b: &Point) -> f64 {
        self(a, b)
    }
}
