//! Built-in distance functions.

use super::Point;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Planar Euclidean distance, in the unit of the coordinates.
#[inline]
pub fn euclidean(a: &Point, b: &Point) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1])
}

/// Great-circle distance in meters between two `[lon, lat]` points in degrees.
///
/// Uses the haversine formula on a sphere of radius [`EARTH_RADIUS_M`].
pub fn haversine(a: &Point, b: &Point) -> f64 {
    let lat1 = a[1].to_radians();
    let lat2 = b[1].to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b[0] - a[0]).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards against rounding slightly above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
