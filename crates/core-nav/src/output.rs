//! Per-frame planner output.

use core_scene::Discontinuity;

/// A discontinuity inside the forward cone, with its metric estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscontinuityAhead {
    pub discontinuity: Discontinuity,
    /// Estimated distance in meters.
    pub distance_m: f32,
}

/// The navigation decision for one frame. Flows by move from the planner to
/// the pipeline's publishers; never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOutput {
    /// Suggested heading as a bearing relative to the user's forward
    /// direction, already smoothed against the previous frame.
    pub suggested_heading: f32,
    /// Clearance of the best surviving ray; 0 when blocked.
    pub clearance: f32,
    /// Distance to the nearest blocking cell in the ±45° forward cone;
    /// `+∞` when the cone is clear.
    pub nearest_obstacle_distance: f32,
    /// Bearing of that nearest hazard, relative to forward.
    pub nearest_obstacle_bearing: f32,
    pub discontinuity_ahead: Option<DiscontinuityAhead>,
    /// Mean column traversability, `[0,1]`.
    pub ground_confidence: f32,
    /// No candidate ray survived the march.
    pub is_path_blocked: bool,
}

impl NavigationOutput {
    /// The output published when a vision stage failed: no scene evidence,
    /// nothing claimed about the world.
    pub fn degraded() -> Self {
        Self {
            suggested_heading: 0.0,
            clearance: 0.0,
            nearest_obstacle_distance: f32::INFINITY,
            nearest_obstacle_bearing: 0.0,
            discontinuity_ahead: None,
            ground_confidence: 0.0,
            is_path_blocked: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_output_claims_nothing() {
        let out = NavigationOutput::degraded();
        assert_eq!(out.ground_confidence, 0.0);
        assert!(!out.is_path_blocked);
        assert!(out.nearest_obstacle_distance.is_infinite());
        assert!(out.discontinuity_ahead.is_none());
    }
}
