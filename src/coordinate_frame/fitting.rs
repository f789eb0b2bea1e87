//! Estimation of a show frame from vehicle telemetry.

use nalgebra::{Rotation2, Vector2};

use super::transformations::{
    gps_to_north_east, normalize_degrees, north_east_to_gps, CoordinateFrame, Handedness,
};
use crate::distances::Point;

/// Spread (sum of squared distances to the centroid, m^2) below which the
/// takeoff points carry no orientation information.
const DEGENERATE_SPREAD: f64 = 1e-9;

/// Latitude (degrees) beyond which the local tangent plane projection collapses.
const POLAR_LATITUDE: f64 = 89.99;

/// Relative residual difference under which both handedness fits are a tie.
const TIE_TOLERANCE: f64 = 1e-9;

/// Estimate the show frame that best maps `local_takeoff_points` onto `gps_positions`.
///
/// # Arguments
/// * `gps_positions` - `[lon, lat]` of each vehicle, in degrees
/// * `headings` - compass heading of each vehicle in degrees; may be empty
/// * `local_takeoff_points` - planned takeoff `[x, y]` of each vehicle, in meters
///
/// Samples are paired by index; the caller drops unmatched or missing samples
/// beforehand.
///
/// GPS positions are projected onto a local tangent plane and a rigid
/// transform is fitted by least squares for both handedness conventions; the
/// better fit wins. Headings break ties and supply the orientation when the
/// takeoff points alone cannot (a single vehicle, or all at one spot).
///
/// # Returns
/// `None` when there are no samples, the inputs are not paired, a coordinate
/// is not finite, the orientation cannot be determined, or the show sits on a
/// pole where the projection is undefined.
pub fn fit_show_coordinate_frame(
    gps_positions: &[Point],
    headings: &[f64],
    local_takeoff_points: &[Point],
) -> Option<CoordinateFrame> {
    let n = gps_positions.len();
    if n == 0 || local_takeoff_points.len() != n {
        return None;
    }
    if !headings.is_empty() && headings.len() != n {
        return None;
    }
    let all_finite = gps_positions
        .iter()
        .chain(local_takeoff_points.iter())
        .all(|p| p[0].is_finite() && p[1].is_finite());
    if !all_finite {
        return None;
    }

    let mean_heading = circular_mean_degrees(headings);
    let spread: f64 = {
        let c = centroid(local_takeoff_points);
        local_takeoff_points
            .iter()
            .map(|p| (p[0] - c[0]).powi(2) + (p[1] - c[1]).powi(2))
            .sum()
    };
    let degenerate = spread < DEGENERATE_SPREAD;
    if degenerate && mean_heading.is_none() {
        return None;
    }

    let fit_around = |reference: &Point| -> RigidFit {
        let observed: Vec<Vector2<f64>> = gps_positions
            .iter()
            .map(|p| gps_to_north_east(reference, p))
            .collect();
        match mean_heading {
            Some(heading) if degenerate => rigid_fit_with_angle(
                &observed,
                local_takeoff_points,
                Handedness::default(),
                heading,
            ),
            _ => {
                let nwu = rigid_fit(&observed, local_takeoff_points, Handedness::Nwu);
                let neu = rigid_fit(&observed, local_takeoff_points, Handedness::Neu);
                choose(nwu, neu, mean_heading)
            }
        }
    };

    // The second pass projects around the estimated origin, which is where
    // CoordinateFrame anchors its own projection
    let mut reference = centroid(gps_positions);
    if !projectable(&reference) {
        return None;
    }
    let mut fit = fit_around(&reference);
    reference = north_east_to_gps(&reference, fit.translation);
    if !projectable(&reference) {
        return None;
    }
    fit = fit_around(&reference);
    let origin = north_east_to_gps(&reference, fit.translation);
    if !projectable(&origin) || !fit.orientation.is_finite() {
        return None;
    }

    Some(CoordinateFrame::new(origin, fit.orientation, fit.handedness))
}

fn projectable(p: &Point) -> bool {
    p[0].is_finite() && p[1].is_finite() && p[1].abs() < POLAR_LATITUDE
}

/// Least-squares rigid fit `observed ≈ R(θ) · q + t`.
#[derive(Debug, Clone, Copy)]
struct RigidFit {
    handedness: Handedness,
    /// θ in degrees.
    orientation: f64,
    /// Image of the local origin, (north, east) in meters.
    translation: Vector2<f64>,
    /// Sum of squared residuals.
    residual: f64,
}

/// 2D Procrustes: the rotation maximizing the correlation of centered point sets.
fn rigid_fit(observed: &[Vector2<f64>], local: &[Point], handedness: Handedness) -> RigidFit {
    let q = to_north_east_local(local, handedness);
    let p_mean = mean(observed);
    let q_mean = mean(&q);

    let (mut dot, mut cross) = (0.0, 0.0);
    for (p, q) in observed.iter().zip(q.iter()) {
        let p = p - p_mean;
        let q = q - q_mean;
        dot += q.x * p.x + q.y * p.y;
        cross += q.x * p.y - q.y * p.x;
    }

    let angle = cross.atan2(dot).to_degrees();
    rigid_fit_with_angle(observed, local, handedness, angle)
}

/// Rigid fit with a fixed rotation; only the translation is estimated.
fn rigid_fit_with_angle(
    observed: &[Vector2<f64>],
    local: &[Point],
    handedness: Handedness,
    angle_degrees: f64,
) -> RigidFit {
    let q = to_north_east_local(local, handedness);
    let rotation = Rotation2::new(angle_degrees.to_radians());
    let translation = mean(observed) - rotation * mean(&q);

    let residual = observed
        .iter()
        .zip(q.iter())
        .map(|(p, q)| (p - (rotation * q + translation)).norm_squared())
        .sum();

    RigidFit {
        handedness,
        orientation: angle_degrees,
        translation,
        residual,
    }
}

fn choose(nwu: RigidFit, neu: RigidFit, mean_heading: Option<f64>) -> RigidFit {
    let scale = 1.0 + nwu.residual.max(neu.residual);
    if (nwu.residual - neu.residual).abs() > TIE_TOLERANCE * scale {
        return if nwu.residual <= neu.residual { nwu } else { neu };
    }

    match mean_heading {
        Some(heading)
            if angle_between(neu.orientation, heading) < angle_between(nwu.orientation, heading) =>
        {
            neu
        }
        _ => nwu,
    }
}

/// Local points with Y flipped as needed so that `(x, y')` rotates onto (north, east).
fn to_north_east_local(local: &[Point], handedness: Handedness) -> Vec<Vector2<f64>> {
    let sign = handedness.y_sign();
    local.iter().map(|p| Vector2::new(p[0], sign * p[1])).collect()
}

fn mean(points: &[Vector2<f64>]) -> Vector2<f64> {
    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p);
    sum / points.len().max(1) as f64
}

fn centroid(points: &[Point]) -> Point {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    [sx / n, sy / n]
}

/// Mean direction of compass angles in degrees, ignoring non-finite values.
///
/// `None` when no finite angle is given or the angles cancel out.
fn circular_mean_degrees(angles: &[f64]) -> Option<f64> {
    let (mut s, mut c, mut count) = (0.0, 0.0, 0usize);
    for a in angles.iter().filter(|a| a.is_finite()) {
        s += a.to_radians().sin();
        c += a.to_radians().cos();
        count += 1;
    }
    if count == 0 || s.hypot(c) < 1e-9 * count as f64 {
        return None;
    }
    Some(normalize_degrees(s.atan2(c).to_degrees()))
}

/// Smallest absolute difference between two compass angles, in [0, 180].
fn angle_between(a: f64, b: f64) -> f64 {
    let d = normalize_degrees(a - b);
    d.min(360.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_frame::CoordinateTransformation;
    use approx::assert_relative_eq;

    const ORIGIN: Point = [19.0402, 47.4979];

    fn takeoff_grid() -> Vec<Point> {
        vec![[0.0, 0.0], [5.0, 0.0], [0.0, 3.0], [5.0, 3.0], [10.0, 6.0]]
    }

    fn assert_frame_close(fit: &CoordinateFrame, truth: &CoordinateFrame) {
        assert_eq!(fit.handedness, truth.handedness);
        assert!(angle_between(fit.orientation, truth.orientation) < 1e-6, "{:?}", fit);
        assert_relative_eq!(fit.origin[0], truth.origin[0], epsilon = 1e-9);
        assert_relative_eq!(fit.origin[1], truth.origin[1], epsilon = 1e-9);
    }

    #[test]
    fn test_recovers_known_frame() {
        for handedness in [Handedness::Nwu, Handedness::Neu] {
            for orientation in [0.0, 45.0, 137.5, 270.0, 359.0] {
                let truth = CoordinateFrame::new(ORIGIN, orientation, handedness);
                let local = takeoff_grid();
                let gps = truth.local_to_world_all(&local);

                let fit = fit_show_coordinate_frame(&gps, &[], &local).unwrap();
                assert_frame_close(&fit, &truth);
            }
        }
    }

    #[test]
    fn test_single_vehicle_uses_heading() {
        let truth = CoordinateFrame::new(ORIGIN, 30.0, Handedness::Nwu);
        let local = vec![[4.0, -2.0]];
        let gps = truth.local_to_world_all(&local);

        let fit = fit_show_coordinate_frame(&gps, &[30.0], &local).unwrap();
        assert_frame_close(&fit, &truth);
    }

    #[test]
    fn test_single_vehicle_without_heading() {
        let gps = vec![ORIGIN];
        assert!(fit_show_coordinate_frame(&gps, &[], &[[0.0, 0.0]]).is_none());
        assert!(fit_show_coordinate_frame(&gps, &[f64::NAN], &[[0.0, 0.0]]).is_none());
    }

    #[test]
    fn test_collinear_takeoff_uses_heading_to_pick_handedness() {
        // Points along local Y: both handedness fit exactly, 180 degrees apart
        let truth = CoordinateFrame::new(ORIGIN, 80.0, Handedness::Neu);
        let local = vec![[0.0, 0.0], [0.0, 4.0], [0.0, 8.0]];
        let gps = truth.local_to_world_all(&local);

        let fit = fit_show_coordinate_frame(&gps, &[79.0, 81.0, 80.0], &local).unwrap();
        assert_frame_close(&fit, &truth);
    }

    #[test]
    fn test_invalid_inputs() {
        let local = takeoff_grid();
        let gps = CoordinateFrame::new(ORIGIN, 0.0, Handedness::Nwu).local_to_world_all(&local);

        assert!(fit_show_coordinate_frame(&[], &[], &[]).is_none());
        assert!(fit_show_coordinate_frame(&gps, &[], &local[..2]).is_none());
        assert!(fit_show_coordinate_frame(&gps, &[0.0], &local).is_none());

        let mut broken = gps.clone();
        broken[1] = [f64::NAN, 47.0];
        assert!(fit_show_coordinate_frame(&broken, &[], &local).is_none());
    }

    #[test]
    fn test_pole_returns_none() {
        let local = [[0.0, 0.0], [5.0, 0.0], [0.0, 3.0]];
        let gps = [[10.0, 90.0], [20.0, 90.0], [30.0, 90.0]];
        assert!(fit_show_coordinate_frame(&gps, &[], &local).is_none());
        assert!(fit_show_coordinate_frame(&gps, &[0.0, 0.0, 0.0], &local).is_none());

        let south = [[10.0, -90.0], [20.0, -90.0], [30.0, -90.0]];
        assert!(fit_show_coordinate_frame(&south, &[], &local).is_none());
    }

    #[test]
    fn test_noisy_fit_stays_close() {
        let truth = CoordinateFrame::new(ORIGIN, 200.0, Handedness::Nwu);
        let local = takeoff_grid();
        let noise = [[0.2, -0.1], [-0.15, 0.1], [0.05, 0.2], [-0.1, -0.2], [0.1, 0.0]];
        let noisy: Vec<Point> = local
            .iter()
            .zip(noise.iter())
            .map(|(p, n)| [p[0] + n[0], p[1] + n[1]])
            .collect();
        let gps = truth.local_to_world_all(&noisy);

        let fit = fit_show_coordinate_frame(&gps, &[], &local).unwrap();
        assert_eq!(fit.handedness, Handedness::Nwu);
        assert!(angle_between(fit.orientation, 200.0) < 3.0);
    }

    #[test]
    fn test_circular_mean_wraps() {
        assert_relative_eq!(circular_mean_degrees(&[350.0, 10.0]).unwrap(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(circular_mean_degrees(&[80.0, 100.0]).unwrap(), 90.0, epsilon = 1e-9);
        assert!(circular_mean_degrees(&[0.0, 180.0]).is_none());
        assert!(circular_mean_degrees(&[]).is_none());
    }
}
