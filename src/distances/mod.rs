//! Distance functions for building source-to-target cost matrices.
//!
//! This module provides:
//! - `Distance` trait for all distance implementations (closures included)
//! - `DistanceMetric` - enum of the built-in metrics, statically dispatched
//! - Built-in distance functions (euclidean, haversine)
//! - `distance_matrix` - cost matrix from two point sequences

mod traits;
mod functions;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use traits::Distance;
pub use functions::*;

use crate::matching::CostMatrix;
use crate::{Error, Result};

/// A 2D point: planar `[x, y]` or geodetic `[lon, lat]` in degrees.
///
/// Which interpretation applies depends only on the distance used.
pub type Point = [f64; 2];

/// Built-in distance metrics.
///
/// Enum dispatch avoids a vtable lookup per matrix cell and lets the metric
/// travel inside a worker task by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Planar Euclidean distance, in the caller's coordinate unit.
    Euclidean,
    /// Great-circle surface distance in meters; points are `[lon, lat]`.
    Geodetic,
}

impl DistanceMetric {
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Geodetic => "geodetic",
        }
    }
}

impl Distance for DistanceMetric {
    #[inline(always)]
    fn distance(&self, a: &Point, b: &Point) -> f64 {
        match self {
            DistanceMetric::Euclidean => euclidean(a, b),
            DistanceMetric::Geodetic => haversine(a, b),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        metric_by_name(s)
    }
}

/// Get a distance metric by name.
///
/// Supported names:
/// - "euclidean" - planar distance
/// - "geodetic" (alias "haversine") - great-circle distance in meters
pub fn metric_by_name(name: &str) -> Result<DistanceMetric> {
    match name {
        "euclidean" => Ok(DistanceMetric::Euclidean),
        "geodetic" | "haversine" => Ok(DistanceMetric::Geodetic),
        _ => Err(Error::UnknownMetric(name.to_string())),
    }
}

/// Build the `len(sources) x len(targets)` cost matrix `m[i][j] = d(sources[i], targets[j])`.
pub fn distance_matrix<D>(sources: &[Point], targets: &[Point], distance: &D) -> CostMatrix
where
    D: Distance + ?Sized,
{
    distance.get_distances(sources, targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_matrix_shape() {
        let sources = [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let targets = [[0.0, 1.0], [5.0, 0.0]];
        let matrix = distance_matrix(&sources, &targets, &DistanceMetric::Euclidean);

        assert_eq!(matrix.nrows(), 3);
        assert_eq!(matrix.ncols(), 2);
        assert_relative_eq!(matrix.get(0, 0).unwrap(), 1.0, epsilon = 1e-10);
        assert_relative_eq!(matrix.get(2, 1).unwrap(), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_distance_matrix_empty_sides() {
        let points = [[0.0, 0.0]];
        assert_eq!(distance_matrix(&[], &points, &DistanceMetric::Euclidean).nrows(), 0);
        assert_eq!(distance_matrix(&points, &[], &DistanceMetric::Euclidean).ncols(), 0);
    }

    #[test]
    fn test_geodetic_matrix_in_meters() {
        let sources = [[0.0, 0.0]];
        let targets = [[0.0, 0.001]];
        let matrix = distance_matrix(&sources, &targets, &DistanceMetric::Geodetic);
        // 0.001 degrees of latitude is roughly 111 m
        assert_relative_eq!(matrix.get(0, 0).unwrap(), 111.19, max_relative = 1e-3);
    }

    #[test]
    fn test_closure_as_distance() {
        let manhattan = |a: &Point, b: &Point| (a[0] - b[0]).abs() + (a[1] - b[1]).abs();
        let matrix = distance_matrix(&[[0.0, 0.0]], &[[1.0, 2.0]], &manhattan);
        assert_relative_eq!(matrix.get(0, 0).unwrap(), 3.0, epsilon = 1e-10);
    }

    #[test]
    fn test_metric_by_name() {
        assert_eq!(metric_by_name("euclidean").unwrap(), DistanceMetric::Euclidean);
        assert_eq!(metric_by_name("geodetic").unwrap(), DistanceMetric::Geodetic);
        assert_eq!("haversine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Geodetic);
    }

    #[test]
    fn test_metric_by_name_invalid() {
        let result = metric_by_name("invalid_distance");
        assert!(matches!(result, Err(Error::UnknownMetric(_))));
    }

    #[test]
    fn test_metric_serde() {
        let json = serde_json::to_string(&DistanceMetric::Geodetic).unwrap();
        assert_eq!(json, "\"geodetic\"");
        let back: DistanceMetric = serde_json::from_str("\"euclidean\"").unwrap();
        assert_eq!(back, DistanceMetric::Euclidean);
    }
}
