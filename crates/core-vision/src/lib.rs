//! Vision-side data types and the model-runner seam.
//!
//! The neural models themselves are external collaborators; this crate owns
//! the immutable sample grids they produce (`DepthMap`, `SegmentationMap`),
//! the camera-side frame/pose/intrinsics types, and the capability traits the
//! pipeline drives them through. Mock and synthetic implementations of the
//! traits live here too so the pipeline can run headless in tests and demos.

pub mod depth;
pub mod frame;
pub mod model;
pub mod seg;

pub use depth::{DepthMap, PixelRect};
pub use frame::{CameraIntrinsics, ColorFrame, Pose};
pub use model::{
    DepthFrame, DepthModel, ModelError, SegFrame, SegModel, SyntheticDepthModel, SyntheticSegModel,
};
pub use seg::SegmentationMap;

use thiserror::Error;

/// A sample grid whose declared dimensions disagree with its buffer.
///
/// Raised at construction time for model outputs; the pipeline logs it and
/// skips the frame rather than propagating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("shape mismatch: {width}x{height} grid with {len} samples")]
pub struct ShapeError {
    pub width: usize,
    pub height: usize,
    pub len: usize,
}

/// Nearest-neighbor index mapping between two resolutions via integer
/// scaling. `i` must be a valid index of `from`; the result is a valid index
/// of `to` for any `from, to > 0`.
#[inline]
pub fn nearest_index(i: usize, from: usize, to: usize) -> usize {
    if from == 0 {
        return 0;
    }
    (i * to / from).min(to.saturating_sub(1))
}

/// Convert raw relative depth to meters: `depth_scale / (relative + 1e-6)`,
/// clamped to `[0, max_reliable]`. An infinite relative value means the model
/// saw no return there, which maps to "no obstacle" (`+∞`), not zero meters.
#[inline]
pub fn relative_to_meters(relative: f32, depth_scale: f32, max_reliable: f32) -> f32 {
    if !relative.is_finite() {
        return f32::INFINITY;
    }
    (depth_scale / (relative + 1e-6)).clamp(0.0, max_reliable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_index_maps_endpoints() {
        assert_eq!(nearest_index(0, 100, 50), 0);
        assert_eq!(nearest_index(99, 100, 50), 49);
        assert_eq!(nearest_index(50, 100, 200), 100);
        // Degenerate source dimension stays in range.
        assert_eq!(nearest_index(0, 0, 10), 0);
    }

    #[test]
    fn relative_to_meters_clamps_and_handles_infinity() {
        let m = relative_to_meters(5.0, 10.0, 30.0);
        assert!((m - 1.9996).abs() < 1e-3);
        assert_eq!(relative_to_meters(f32::INFINITY, 10.0, 30.0), f32::INFINITY);
        // Tiny relative depth clamps to the reliability ceiling.
        assert_eq!(relative_to_meters(1e-9, 10.0, 30.0), 30.0);
    }
}
