//! The JSON snapshot payload.
//!
//! Field names are a wire contract shared with external viewers; rename with
//! care. The JSON snapshot stays world-aligned (row-major, z outer, x
//! inner); the heading-aligned view is the compact binary snapshot in
//! `core-grid`.

use core_grid::OccupancyGrid;
use core_nav::NavigationOutput;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSnapshot {
    pub timestamp: f64,
    pub user_position: [f32; 3],
    pub user_heading: f32,
    /// `None` encodes "no obstacle" (JSON `null`).
    pub nearest_obstacle: Option<f32>,
    pub floor_height: f32,
    pub grid_size: u32,
    pub cell_size: f32,
    /// Cell state codes, row-major (z outer, x inner).
    pub cell_states: Vec<u8>,
    /// Elevation in centimeters, saturating to ±127.
    pub cell_elevations: Vec<i8>,
    pub valid_cells: u32,
    pub obstacle_cells: u32,
    pub step_cells: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_heading: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obstacle_distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discontinuity_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_discontinuity_distance: Option<f32>,
}

fn elevation_cm(elevation: f32) -> i8 {
    (elevation * 100.0).round().clamp(-127.0, 127.0) as i8
}

fn finite(v: f32) -> Option<f32> {
    v.is_finite().then_some(v)
}

/// Snapshot the grid (and, when available, the frame's navigation decision)
/// by value.
pub fn build_snapshot(
    grid: &OccupancyGrid,
    nav: Option<&NavigationOutput>,
    discontinuity_count: u32,
    timestamp: f64,
    user_position: [f32; 3],
) -> GridSnapshot {
    let stats = grid.stats();
    let cells = grid.cells();
    GridSnapshot {
        timestamp,
        user_position,
        user_heading: grid.user_heading(),
        nearest_obstacle: nav.and_then(|n| finite(n.nearest_obstacle_distance)),
        floor_height: grid.floor_height(),
        grid_size: grid.grid_size() as u32,
        cell_size: grid.cell_size(),
        cell_states: cells.iter().map(|c| c.state.encode()).collect(),
        cell_elevations: cells.iter().map(|c| elevation_cm(c.elevation)).collect(),
        valid_cells: stats.valid_cells,
        obstacle_cells: stats.obstacle_cells,
        step_cells: stats.step_cells,
        navigation_heading: nav.map(|n| n.suggested_heading),
        ground_confidence: nav.map(|n| n.ground_confidence),
        obstacle_distance: nav.and_then(|n| finite(n.nearest_obstacle_distance)),
        discontinuity_count: Some(discontinuity_count),
        nearest_discontinuity_distance: nav
            .and_then(|n| n.discontinuity_ahead.as_ref().map(|d| d.distance_m)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::Config;
    use core_grid::CellState;

    fn grid_20() -> OccupancyGrid {
        let mut config = Config::default();
        config.grid.grid_size = 20;
        config.grid.cell_size = 0.1;
        OccupancyGrid::new(&config)
    }

    #[test]
    fn payload_uses_the_stable_wire_names() {
        let grid = grid_20();
        let snap = build_snapshot(&grid, None, 0, 12.5, [1.0, 1.6, -2.0]);
        let value = serde_json::to_value(&snap).unwrap();
        for key in [
            "timestamp",
            "userPosition",
            "userHeading",
            "nearestObstacle",
            "floorHeight",
            "gridSize",
            "cellSize",
            "cellStates",
            "cellElevations",
            "validCells",
            "obstacleCells",
            "stepCells",
        ] {
            assert!(value.get(key).is_some(), "missing field {key}");
        }
        assert_eq!(value["gridSize"], 20);
        assert_eq!(value["cellStates"].as_array().unwrap().len(), 400);
        // No navigation output: nearestObstacle is null, optionals absent.
        assert!(value["nearestObstacle"].is_null());
        assert!(value.get("navigationHeading").is_none());
    }

    #[test]
    fn infinite_nearest_obstacle_encodes_null() {
        let grid = grid_20();
        let nav = NavigationOutput::degraded();
        let snap = build_snapshot(&grid, Some(&nav), 0, 0.0, [0.0; 3]);
        let value = serde_json::to_value(&snap).unwrap();
        assert!(value["nearestObstacle"].is_null());
        assert_eq!(value["groundConfidence"], 0.0);
    }

    #[test]
    fn cell_states_follow_storage_order() {
        let mut grid = grid_20();
        grid.set_state_for_test(3, 5, CellState::Occupied);
        let snap = build_snapshot(&grid, None, 0, 0.0, [0.0; 3]);
        assert_eq!(snap.cell_states[5 * 20 + 3], CellState::Occupied.encode());
        assert_eq!(snap.cell_states.iter().filter(|&&s| s != 0).count(), 1);
    }

    #[test]
    fn elevation_saturates_to_i8_centimeters() {
        assert_eq!(elevation_cm(0.10), 10);
        assert_eq!(elevation_cm(-0.335), -34);
        assert_eq!(elevation_cm(5.0), 127);
        assert_eq!(elevation_cm(-5.0), -127);
    }
}
