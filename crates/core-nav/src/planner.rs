//! Scene projection and ray-marched heading search.

use core_config::PlannerConfig;
use core_grid::{CellState, OccupancyGrid};
use core_scene::SceneUnderstanding;
use core_vision::relative_to_meters;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use tracing::trace;

use crate::output::{DiscontinuityAhead, NavigationOutput};

/// Free-space walking starts past the user's own footprint.
const FREE_WALK_START_M: f32 = 0.5;
/// Free-space evidence is only trusted out to this range.
const FREE_WALK_MAX_M: f32 = 5.0;
/// Columns below this traversability contribute no free space.
const WALKABLE_COLUMN_MIN: f32 = 0.7;
/// Multiplicative score penalty for crossing a step cell.
const STEP_PENALTY: f32 = 0.7;
/// Epsilon of the discontinuity depth→meters estimate.
const DISCONTINUITY_EPS: f32 = 1e-3;
/// Discontinuity magnitude bands for cell states.
const DISC_STEP_MAX: f32 = 0.3;
const DISC_CURB_MAX: f32 = 0.6;

struct RayResult {
    clearance: f32,
    step_penalty: f32,
    /// The ray crossed at least one safe (`Free|Ramp|Step`) cell. Rays into
    /// wholly unknown space carry no evidence of walkable ground and are
    /// not candidates.
    supported: bool,
}

/// Selects a heading by casting rays over ±90° and scoring their clearance.
/// Holds only the previous smoothed heading between frames; the grid is
/// borrowed mutably per update and owned elsewhere.
#[derive(Debug, Clone)]
pub struct NavigationPlanner {
    params: PlannerConfig,
    previous_heading: f32,
}

impl NavigationPlanner {
    pub fn new(params: PlannerConfig) -> Self {
        Self {
            params,
            previous_heading: 0.0,
        }
    }

    pub fn previous_heading(&self) -> f32 {
        self.previous_heading
    }

    /// One planning step: project the scene into the grid, age it, then
    /// search for a heading. Ordering matters: projection happens before
    /// decay so fresh evidence is not aged, and the pose update (which may
    /// recenter the window) runs before any raycast.
    pub fn update(
        &mut self,
        scene: &SceneUnderstanding,
        user_pos: (f32, f32),
        user_heading: f32,
        dt: f32,
        grid: &mut OccupancyGrid,
    ) -> NavigationOutput {
        self.project(scene, user_pos, user_heading, grid);
        grid.classify();
        grid.apply_decay(dt);
        grid.update_user_pose(user_pos, user_heading);

        let (raw, clearance, blocked) = self.search_heading(grid, user_pos, user_heading);
        let smoothed = self.params.smoothing_factor * raw
            + (1.0 - self.params.smoothing_factor) * self.previous_heading;
        self.previous_heading = smoothed;

        let (nearest_distance, nearest_bearing) =
            self.forward_threat(grid, user_pos, user_heading);
        let discontinuity_ahead = self.discontinuity_ahead(scene);
        let ground_confidence = if scene.traversability.is_empty() {
            0.0
        } else {
            scene.traversability.iter().sum::<f32>() / scene.traversability.len() as f32
        };

        trace!(
            target: "nav.heading",
            raw,
            smoothed,
            clearance,
            blocked,
            nearest_distance,
            "planner_update"
        );

        NavigationOutput {
            suggested_heading: smoothed,
            clearance,
            nearest_obstacle_distance: nearest_distance,
            nearest_obstacle_bearing: nearest_bearing,
            discontinuity_ahead,
            ground_confidence,
            is_path_blocked: blocked,
        }
    }

    /// Project the column descriptor into world-aligned cells.
    fn project(
        &self,
        scene: &SceneUnderstanding,
        user_pos: (f32, f32),
        user_heading: f32,
        grid: &mut OccupancyGrid,
    ) {
        let cs = grid.cell_size();
        let columns = scene
            .columns
            .min(scene.column_bearings.len())
            .min(scene.traversability.len())
            .min(scene.obstacle_distance.len());
        for c in 0..columns {
            let world_bearing = scene.column_bearings[c] + user_heading;
            let (sin_b, cos_b) = world_bearing.sin_cos();
            let raw_obstacle = scene.obstacle_distance[c];
            let obstacle_m = raw_obstacle.is_finite().then(|| {
                relative_to_meters(
                    raw_obstacle,
                    self.params.depth_scale,
                    self.params.max_reliable_depth,
                )
            });

            if scene.traversability[c] > WALKABLE_COLUMN_MIN {
                // Walk free cells up to the obstacle (an infinite obstacle
                // distance bounds nothing) or the trust range.
                let far = obstacle_m.map_or(FREE_WALK_MAX_M, |m| m.min(FREE_WALK_MAX_M));
                let mut t = FREE_WALK_START_M;
                while t < far {
                    grid.observe_world(
                        user_pos.0 + sin_b * t,
                        user_pos.1 + cos_b * t,
                        CellState::Free,
                    );
                    t += cs;
                }
                if far > FREE_WALK_START_M {
                    // Ground height evidence at the middle of the free run.
                    grid.update_from_depth_sample(
                        world_bearing,
                        (FREE_WALK_START_M + far) / 2.0,
                        true,
                    );
                }
            }

            if let Some(m) = obstacle_m {
                grid.observe_world(
                    user_pos.0 + sin_b * m,
                    user_pos.1 + cos_b * m,
                    CellState::Occupied,
                );
                grid.update_from_depth_sample(world_bearing, m, false);
            }
        }

        for d in &scene.discontinuities {
            let m = self.params.depth_scale / (d.relative_depth + DISCONTINUITY_EPS);
            let world_bearing = d.bearing + user_heading;
            let state = if d.magnitude < DISC_STEP_MAX {
                CellState::Step
            } else if d.magnitude <= DISC_CURB_MAX {
                CellState::Curb
            } else {
                CellState::Dropoff
            };
            grid.observe_world(
                user_pos.0 + world_bearing.sin() * m,
                user_pos.1 + world_bearing.cos() * m,
                state,
            );
        }
    }

    /// March one candidate ray.
    fn march(&self, grid: &OccupancyGrid, from: (f32, f32), heading: f32) -> RayResult {
        let cs = grid.cell_size();
        let (sin_h, cos_h) = heading.sin_cos();
        let mut step_penalty = 1.0f32;
        let mut supported = false;
        let mut t = cs;
        while t <= self.params.max_march {
            let wx = from.0 + sin_h * t;
            let wz = from.1 + cos_h * t;
            if let Some((ix, iz)) = grid.world_to_grid(wx, wz) {
                let state = grid.cell(ix, iz).state;
                if state.is_blocking() {
                    return RayResult {
                        clearance: t,
                        step_penalty,
                        supported,
                    };
                }
                if state == CellState::Step {
                    step_penalty = step_penalty.min(STEP_PENALTY);
                }
                if state.is_safe() {
                    supported = true;
                }
            }
            t += cs;
        }
        RayResult {
            clearance: self.params.max_march,
            step_penalty,
            supported,
        }
    }

    /// Cast rays over ±90° around the user heading and blend the survivors.
    ///
    /// Each surviving ray (clear past the safety margin, supported by at
    /// least one safe cell) scores `clearance · angle weight · step penalty`.
    /// The raw suggestion is the score-weighted mean bearing, which steers
    /// away from one-sided walls even when dead-ahead itself is clear; the
    /// reported clearance belongs to the top-scoring ray.
    fn search_heading(
        &self,
        grid: &OccupancyGrid,
        user_pos: (f32, f32),
        user_heading: f32,
    ) -> (f32, f32, bool) {
        let rays = self.params.heading_rays.max(2);
        let mut weight_sum = 0.0f32;
        let mut weighted_bearing = 0.0f32;
        let mut best_weight = f32::NEG_INFINITY;
        let mut best_clearance = 0.0f32;

        for i in 0..rays {
            let offset = -FRAC_PI_2 + i as f32 * (PI / (rays - 1) as f32);
            let ray = self.march(grid, user_pos, user_heading + offset);
            if ray.clearance <= self.params.safety_margin || !ray.supported {
                continue;
            }
            let weight = ray.clearance * (1.0 - offset.abs() / PI * 0.5) * ray.step_penalty;
            weight_sum += weight;
            weighted_bearing += weight * offset;
            if weight > best_weight {
                best_weight = weight;
                best_clearance = ray.clearance;
            }
        }

        if weight_sum <= 0.0 {
            (0.0, 0.0, true)
        } else {
            (weighted_bearing / weight_sum, best_clearance, false)
        }
    }

    /// Nearest blocking cell in the ±45° forward cone.
    fn forward_threat(
        &self,
        grid: &OccupancyGrid,
        user_pos: (f32, f32),
        user_heading: f32,
    ) -> (f32, f32) {
        let rays = self.params.threat_rays.max(2);
        let mut nearest = f32::INFINITY;
        let mut bearing = 0.0f32;
        for i in 0..rays {
            let offset = -FRAC_PI_4 + i as f32 * (FRAC_PI_2 / (rays - 1) as f32);
            let d = grid.nearest_obstacle(user_pos, user_heading + offset, self.params.max_march);
            if d < nearest {
                nearest = d;
                bearing = offset;
            }
        }
        (nearest, bearing)
    }

    /// The closest discontinuity inside the forward ±45° cone.
    fn discontinuity_ahead(&self, scene: &SceneUnderstanding) -> Option<DiscontinuityAhead> {
        scene
            .discontinuities
            .iter()
            .filter(|d| d.bearing.abs() < FRAC_PI_4)
            .map(|d| DiscontinuityAhead {
                discontinuity: *d,
                distance_m: self.params.depth_scale / (d.relative_depth + DISCONTINUITY_EPS),
            })
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;

    fn planner() -> NavigationPlanner {
        NavigationPlanner::new(Config::default().planner)
    }

    fn grid() -> OccupancyGrid {
        OccupancyGrid::new(&Config::default())
    }

    #[test]
    fn march_stops_at_blocking_cell_and_tracks_support() {
        let mut g = grid();
        // Free carpet ahead, wall at 3 m.
        let mut t = 0.5f32;
        while t < 3.0 {
            g.observe_world(0.0, t, CellState::Free);
            t += g.cell_size();
        }
        let (ix, iz) = g.world_to_grid(0.0, 3.05).unwrap();
        g.set_state_for_test(ix, iz, CellState::Occupied);

        let p = planner();
        let ray = p.march(&g, (0.0, 0.0), 0.0);
        assert!(ray.supported);
        assert!((ray.clearance - 3.0).abs() < 0.15, "clearance {}", ray.clearance);
        assert_eq!(ray.step_penalty, 1.0);
    }

    #[test]
    fn march_through_step_applies_penalty_once() {
        let mut g = grid();
        let mut t = 0.5f32;
        while t < 4.0 {
            g.observe_world(0.0, t, CellState::Free);
            t += g.cell_size();
        }
        for &z in &[1.0f32, 1.05, 2.0] {
            let (ix, iz) = g.world_to_grid(0.0, z).unwrap();
            g.set_state_for_test(ix, iz, CellState::Step);
        }
        let p = planner();
        let ray = p.march(&g, (0.0, 0.0), 0.0);
        assert_eq!(ray.clearance, p.params.max_march);
        assert_eq!(ray.step_penalty, STEP_PENALTY);
        assert!(ray.supported);
    }

    #[test]
    fn unsupported_rays_are_not_candidates() {
        // Empty grid: every ray is unsupported, so the search blocks.
        let g = grid();
        let p = planner();
        let (raw, clearance, blocked) = p.search_heading(&g, (0.0, 0.0), 0.0);
        assert!(blocked);
        assert_eq!(raw, 0.0);
        assert_eq!(clearance, 0.0);
    }

    #[test]
    fn discontinuity_outside_cone_is_ignored() {
        use core_scene::{Discontinuity, DiscontinuityDirection};
        let mut scene = SceneUnderstanding::empty(12, 2.0);
        scene.discontinuities.push(Discontinuity {
            column: 0,
            bearing: -1.0,
            relative_depth: 5.0,
            magnitude: 0.5,
            direction: DiscontinuityDirection::DropAway,
        });
        let p = planner();
        assert!(p.discontinuity_ahead(&scene).is_none());

        scene.discontinuities.push(Discontinuity {
            column: 6,
            bearing: 0.0,
            relative_depth: 5.0,
            magnitude: 0.5,
            direction: DiscontinuityDirection::DropAway,
        });
        let ahead = p.discontinuity_ahead(&scene).unwrap();
        assert!((ahead.distance_m - 2.0).abs() < 1e-2);
    }
}
