//! Local show frame <-> GPS coordinate transformations.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::distances::{Point, EARTH_RADIUS_M};

/// Trait for transforming between local (show) and world (GPS) coordinates.
///
/// Points can be interpreted in 2 references:
/// - Local: meters in the show frame, (0, 0) is the show origin
/// - World: `[lon, lat]` in degrees
pub trait CoordinateTransformation: Send + Sync + std::fmt::Debug {
    /// Transform a point from local to world coordinates.
    fn local_to_world(&self, point: &Point) -> Point;

    /// Transform a point from world to local coordinates.
    fn world_to_local(&self, point: &Point) -> Point;

    /// Transform many points from local to world coordinates.
    fn local_to_world_all(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| self.local_to_world(p)).collect()
    }

    /// Transform many points from world to local coordinates.
    fn world_to_local_all(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|p| self.world_to_local(p)).collect()
    }
}

/// Orientation of the local Y axis relative to the X axis, seen from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    /// Y axis points 90 degrees counter-clockwise from X (X north, Y west, Z up).
    #[default]
    Nwu,
    /// Y axis points 90 degrees clockwise from X (X north, Y east, Z up).
    Neu,
}

impl Handedness {
    /// Factor applied to local Y to turn the frame into a north/east one.
    #[inline]
    pub(crate) fn y_sign(self) -> f64 {
        match self {
            Handedness::Nwu => -1.0,
            Handedness::Neu => 1.0,
        }
    }
}

/// Placement of a show frame on the Earth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateFrame {
    /// `[lon, lat]` of the local (0, 0) point, in degrees.
    pub origin: Point,
    /// Compass bearing of the local X axis, degrees clockwise from north in [0, 360).
    pub orientation: f64,
    /// Direction of the local Y axis.
    pub handedness: Handedness,
}

impl CoordinateFrame {
    /// Create a frame; `orientation` is normalized into [0, 360).
    pub fn new(origin: Point, orientation: f64, handedness: Handedness) -> Self {
        Self {
            origin,
            orientation: normalize_degrees(orientation),
            handedness,
        }
    }

    /// Local point -> (north, east) offset from the origin, in meters.
    fn local_to_north_east(&self, point: &Point) -> Vector2<f64> {
        let q = Vector2::new(point[0], self.handedness.y_sign() * point[1]);
        Rotation2::new(self.orientation.to_radians()) * q
    }

    fn north_east_to_local(&self, ne: Vector2<f64>) -> Point {
        let q = Rotation2::new(-self.orientation.to_radians()) * ne;
        [q.x, self.handedness.y_sign() * q.y]
    }
}

impl CoordinateTransformation for CoordinateFrame {
    fn local_to_world(&self, point: &Point) -> Point {
        let ne = self.local_to_north_east(point);
        north_east_to_gps(&self.origin, ne)
    }

    fn world_to_local(&self, point: &Point) -> Point {
        let ne = gps_to_north_east(&self.origin, point);
        self.north_east_to_local(ne)
    }
}

/// Wrap an angle in degrees into [0, 360).
pub(crate) fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Equirectangular projection of `point` around `reference`: (north, east) in meters.
pub(crate) fn gps_to_north_east(reference: &Point, point: &Point) -> Vector2<f64> {
    let cos_lat = reference[1].to_radians().cos();
    let north = (point[1] - reference[1]).to_radians() * EARTH_RADIUS_M;
    let east = (point[0] - reference[0]).to_radians() * EARTH_RADIUS_M * cos_lat;
    Vector2::new(north, east)
}

/// Inverse of [`gps_to_north_east`].
pub(crate) fn north_east_to_gps(reference: &Point, ne: Vector2<f64>) -> Point {
    let cos_lat = reference[1].to_radians().cos();
    let lat = reference[1] + (ne.x / EARTH_RADIUS_M).to_degrees();
    let lon = reference[0] + (ne.y / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    [lon, lat]
}
