//! Show coordinate frames.
//!
//! A show is designed in a local XY frame (meters). Flying it requires knowing
//! where that frame sits on Earth: its origin, its orientation, and whether its
//! Y axis turns left or right of X. This module provides:
//!
//! - Conversions between local and GPS coordinates for a known frame
//! - Estimation of the frame from live vehicle telemetry

mod fitting;
mod transformations;

pub use fitting::fit_show_coordinate_frame;
pub use transformations::{CoordinateFrame, CoordinateTransformation, Handedness};
