//! World-aligned occupancy grid with temporal confidence decay and
//! automatic re-centering.

use crate::cell::{CellState, GridCell};
use core_config::{Config, ElevationConfig, GridConfig, ProcessingConfig, TemporalConfig};
use tracing::{debug, trace};

/// Derived cell counts, recomputed on classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridStats {
    pub valid_cells: u32,
    pub obstacle_cells: u32,
    pub step_cells: u32,
}

/// The persistent world model. Cells live in a single contiguous row-major
/// array (z outer, x inner); the 2D index is an implementation detail that
/// must not leak into the contract.
///
/// Single-writer: the pipeline thread owns the only mutable reference;
/// readers receive value snapshots.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    geometry: GridConfig,
    elevation: ElevationConfig,
    temporal: TemporalConfig,
    processing: ProcessingConfig,
    cells: Vec<GridCell>,
    origin_x: f32,
    origin_z: f32,
    user_heading: f32,
    floor_height: f32,
    stats: GridStats,
}

impl OccupancyGrid {
    /// Build an empty grid from an already-validated configuration.
    pub fn new(config: &Config) -> Self {
        let n = config.grid.grid_size * config.grid.grid_size;
        Self {
            geometry: config.grid.clone(),
            elevation: config.elevation.clone(),
            temporal: config.temporal.clone(),
            processing: config.processing.clone(),
            cells: vec![GridCell::UNKNOWN; n],
            origin_x: 0.0,
            origin_z: 0.0,
            user_heading: 0.0,
            floor_height: 0.0,
            stats: GridStats::default(),
        }
    }

    pub fn grid_size(&self) -> usize {
        self.geometry.grid_size
    }

    pub fn cell_size(&self) -> f32 {
        self.geometry.cell_size
    }

    pub fn origin(&self) -> (f32, f32) {
        (self.origin_x, self.origin_z)
    }

    pub fn user_heading(&self) -> f32 {
        self.user_heading
    }

    pub fn floor_height(&self) -> f32 {
        self.floor_height
    }

    pub fn stats(&self) -> GridStats {
        self.stats
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn min_hit_count(&self) -> u16 {
        self.processing.min_hit_count
    }

    #[inline]
    fn index(&self, ix: usize, iz: usize) -> usize {
        iz * self.geometry.grid_size + ix
    }

    pub fn cell(&self, ix: usize, iz: usize) -> &GridCell {
        &self.cells[self.index(ix, iz)]
    }

    fn cell_mut(&mut self, ix: usize, iz: usize) -> &mut GridCell {
        let idx = self.index(ix, iz);
        &mut self.cells[idx]
    }

    // ---------------------------------------------------------------------
    // Coordinate transforms
    // ---------------------------------------------------------------------

    /// World position → cell indices; `None` outside the grid window.
    pub fn world_to_grid(&self, wx: f32, wz: f32) -> Option<(usize, usize)> {
        let gs = self.geometry.grid_size as f32;
        let half = gs / 2.0;
        let fx = ((wx - self.origin_x) / self.geometry.cell_size + half).floor();
        let fz = ((wz - self.origin_z) / self.geometry.cell_size + half).floor();
        if fx < 0.0 || fz < 0.0 || fx >= gs || fz >= gs {
            return None;
        }
        Some((fx as usize, fz as usize))
    }

    /// Center of a cell in world coordinates.
    pub fn grid_to_world(&self, ix: usize, iz: usize) -> (f32, f32) {
        let half = self.geometry.grid_size as f32 / 2.0;
        let wx = self.origin_x + (ix as f32 - half + 0.5) * self.geometry.cell_size;
        let wz = self.origin_z + (iz as f32 - half + 0.5) * self.geometry.cell_size;
        (wx, wz)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Record the user pose; recenter if the user crossed into the border
    /// band (past `1 − recenter_edge_margin` of the half-extent).
    pub fn update_user_pose(&mut self, pos: (f32, f32), heading: f32) {
        self.user_heading = heading;
        let threshold = self.geometry.half_extent() * (1.0 - self.geometry.recenter_edge_margin);
        let dx = (pos.0 - self.origin_x).abs();
        let dz = (pos.1 - self.origin_z).abs();
        if dx.max(dz) > threshold {
            self.recenter(pos.0, pos.1);
        }
    }

    /// Shift the window by whole cells so the origin lands on the user. The
    /// per-frame step is bounded by walking speed, so the shift stays small
    /// and amortized O(1) per cell retained.
    fn recenter(&mut self, px: f32, pz: f32) {
        let cs = self.geometry.cell_size;
        let gs = self.geometry.grid_size as isize;
        let dx = ((px - self.origin_x) / cs).round() as isize;
        let dz = ((pz - self.origin_z) / cs).round() as isize;
        if dx == 0 && dz == 0 {
            return;
        }
        let mut next = vec![GridCell::UNKNOWN; self.cells.len()];
        for iz in 0..gs {
            let src_z = iz + dz;
            if !(0..gs).contains(&src_z) {
                continue;
            }
            for ix in 0..gs {
                let src_x = ix + dx;
                if !(0..gs).contains(&src_x) {
                    continue;
                }
                next[(iz * gs + ix) as usize] = self.cells[(src_z * gs + src_x) as usize];
            }
        }
        self.cells = next;
        self.origin_x += dx as f32 * cs;
        self.origin_z += dz as f32 * cs;
        self.recount();
        debug!(
            target: "grid.recenter",
            dx,
            dz,
            origin_x = self.origin_x,
            origin_z = self.origin_z,
            "grid_recentered"
        );
    }

    /// Exponential confidence decay scaled to a 60 Hz-equivalent frame.
    /// Cells falling below the confidence floor reset to `Unknown`.
    pub fn apply_decay(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let factor = self.temporal.confidence_decay.powf(dt * 60.0);
        let floor = self.temporal.min_confidence;
        let mut resets = 0usize;
        for cell in &mut self.cells {
            if cell.hit_count == 0 && cell.confidence == 0 {
                continue;
            }
            let decayed = (cell.confidence as f32 * factor) as u8;
            if decayed < floor {
                cell.reset();
                resets += 1;
            } else {
                cell.confidence = decayed;
            }
        }
        if resets > 0 {
            trace!(target: "grid.decay", resets, "cells_reset");
        }
    }

    // ---------------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------------

    /// Floor evidence at world height `y`.
    pub fn add_floor_point(&mut self, ix: usize, iz: usize, y: f32) {
        let boost = self.temporal.observation_boost;
        let max_conf = self.temporal.max_confidence;
        let cell = self.cell_mut(ix, iz);
        cell.min_height = cell.min_height.min(y);
        if cell.max_height == f32::NEG_INFINITY {
            cell.max_height = y;
        }
        cell.confidence = cell.confidence.saturating_add(boost).min(max_conf);
        cell.hit_count = cell.hit_count.saturating_add(1);
    }

    /// Obstacle evidence at world height `y`.
    pub fn add_obstacle_point(&mut self, ix: usize, iz: usize, y: f32) {
        let boost = self.temporal.observation_boost;
        let max_conf = self.temporal.max_confidence;
        let cell = self.cell_mut(ix, iz);
        cell.max_height = cell.max_height.max(y);
        cell.confidence = cell.confidence.saturating_add(boost).min(max_conf);
        cell.hit_count = cell.hit_count.saturating_add(1);
    }

    /// Fuse one polar depth sample measured from the grid origin. Heights
    /// are synthesized from the current floor estimate.
    pub fn update_from_depth_sample(&mut self, bearing: f32, distance: f32, is_ground: bool) {
        if !distance.is_finite() || distance > self.geometry.max_distance {
            return;
        }
        let wx = self.origin_x + bearing.sin() * distance;
        let wz = self.origin_z + bearing.cos() * distance;
        if let Some((ix, iz)) = self.world_to_grid(wx, wz) {
            if is_ground {
                let y = self.floor_height;
                self.add_floor_point(ix, iz, y);
            } else {
                let y = self.floor_height + self.elevation.obstacle_height;
                self.add_obstacle_point(ix, iz, y);
            }
        }
    }

    /// Fuse an external object detection: a small strip of `Occupied` cells
    /// perpendicular to the bearing, confidence boost proportional to the
    /// detector confidence. Never lowers confidence, never resets a cell.
    pub fn update_from_detection(
        &mut self,
        bearing: f32,
        distance: f32,
        width: f32,
        confidence: f32,
    ) {
        if !distance.is_finite() || distance > self.geometry.max_distance {
            return;
        }
        let cs = self.geometry.cell_size;
        let cx = self.origin_x + bearing.sin() * distance;
        let cz = self.origin_z + bearing.cos() * distance;
        // Perpendicular of the bearing direction in the ground plane.
        let (px, pz) = (bearing.cos(), -bearing.sin());
        let half_steps = (((width / 2.0) / cs).ceil() as isize).max(1);
        let boost = (self.temporal.observation_boost as f32 * confidence.clamp(0.0, 1.0))
            .round() as u8;
        for k in -half_steps..=half_steps {
            let wx = cx + px * (k as f32 * cs);
            let wz = cz + pz * (k as f32 * cs);
            if let Some((ix, iz)) = self.world_to_grid(wx, wz) {
                let max_conf = self.temporal.max_confidence;
                let cell = self.cell_mut(ix, iz);
                cell.state = CellState::Occupied;
                cell.confidence = cell.confidence.saturating_add(boost).min(max_conf);
                cell.hit_count = cell.hit_count.saturating_add(1);
            }
        }
    }

    /// Scene-projection state observation. `Occupied` always wins; other
    /// states never overwrite an `Occupied` cell.
    pub fn observe_world(&mut self, wx: f32, wz: f32, state: CellState) -> bool {
        let Some((ix, iz)) = self.world_to_grid(wx, wz) else {
            return false;
        };
        let boost = self.temporal.observation_boost;
        let max_conf = self.temporal.max_confidence;
        let cell = self.cell_mut(ix, iz);
        if state == CellState::Occupied || cell.state != CellState::Occupied {
            cell.state = state;
        }
        cell.confidence = cell.confidence.saturating_add(boost).min(max_conf);
        cell.hit_count = cell.hit_count.saturating_add(1);
        true
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// DDA ray march at `cell_size` steps: distance to the first blocking
    /// cell (`Occupied|Curb|Dropoff`), `+∞` if the ray stays clear.
    pub fn nearest_obstacle(&self, from: (f32, f32), heading: f32, max_distance: f32) -> f32 {
        let cs = self.geometry.cell_size;
        let (sin_h, cos_h) = heading.sin_cos();
        let mut t = cs;
        while t <= max_distance {
            let wx = from.0 + sin_h * t;
            let wz = from.1 + cos_h * t;
            if let Some((ix, iz)) = self.world_to_grid(wx, wz) {
                if self.cell(ix, iz).state.is_blocking() {
                    return t;
                }
            }
            t += cs;
        }
        f32::INFINITY
    }

    /// Can the user stand at this world position. Out-of-grid and `Unknown`
    /// are both unsafe.
    pub fn is_safe(&self, wx: f32, wz: f32) -> bool {
        self.world_to_grid(wx, wz)
            .map(|(ix, iz)| self.cell(ix, iz).state.is_safe())
            .unwrap_or(false)
    }

    // ---------------------------------------------------------------------
    // Classification
    // ---------------------------------------------------------------------

    /// Per-frame classification after point additions: refresh the floor
    /// estimate, derive `Free`/`Occupied` from height evidence, refine
    /// elevation bands, and recount stats.
    ///
    /// Only cells with enough hits and real floor evidence (finite
    /// `min_height`) are touched, so states projected from the scene
    /// (step/curb/dropoff marks without height data) survive untouched, and
    /// `Occupied` is never downgraded.
    pub fn classify(&mut self) {
        self.estimate_floor();
        let min_hits = self.processing.min_hit_count;
        for cell in &mut self.cells {
            if !cell.is_valid(min_hits) || !cell.min_height.is_finite() {
                continue;
            }
            cell.elevation = cell.min_height - self.floor_height;
            if cell.height_range() > self.elevation.obstacle_height {
                cell.state = CellState::Occupied;
            } else if cell.state != CellState::Occupied {
                cell.state = CellState::Free;
            }
        }
        self.refine_elevation_states();
        self.recount();
    }

    /// Median-of-valid-floor-cells estimate near the origin. Requires
    /// `min_floor_samples`; a candidate within `elevation_merge_threshold`
    /// blends in, a farther one replaces the estimate outright.
    fn estimate_floor(&mut self) {
        let min_hits = self.processing.min_hit_count;
        let radius = 2.0f32;
        let gs = self.geometry.grid_size;
        let mut samples: Vec<f32> = Vec::new();
        for iz in 0..gs {
            for ix in 0..gs {
                let cell = self.cell(ix, iz);
                if !cell.is_valid(min_hits) || !cell.min_height.is_finite() {
                    continue;
                }
                let (wx, wz) = self.grid_to_world(ix, iz);
                let dx = wx - self.origin_x;
                let dz = wz - self.origin_z;
                if dx * dx + dz * dz <= radius * radius {
                    samples.push(cell.min_height);
                }
            }
        }
        if samples.len() < self.processing.min_floor_samples {
            return;
        }
        samples.sort_by(f32::total_cmp);
        let median = samples[samples.len() / 2];
        if (median - self.floor_height).abs() > self.processing.elevation_merge_threshold {
            debug!(
                target: "grid.floor",
                old = self.floor_height,
                new = median,
                "floor_estimate_replaced"
            );
            self.floor_height = median;
        } else {
            self.floor_height = self.floor_height * 0.9 + median * 0.1;
        }
    }

    /// Map height-classified cells into elevation bands and detect ramps
    /// and stair runs among them. Never touches `Occupied`.
    fn refine_elevation_states(&mut self) {
        let gs = self.geometry.grid_size as isize;
        let min_hits = self.processing.min_hit_count;
        let cs = self.geometry.cell_size;
        let mut banded: Vec<(usize, CellState)> = Vec::new();

        for iz in 0..gs {
            for ix in 0..gs {
                let idx = (iz * gs + ix) as usize;
                let cell = &self.cells[idx];
                if !cell.is_valid(min_hits)
                    || !cell.min_height.is_finite()
                    || cell.state == CellState::Occupied
                {
                    continue;
                }
                let e = cell.elevation;
                let band = if e <= -self.elevation.dropoff {
                    CellState::Dropoff
                } else if e >= self.elevation.curb_min {
                    CellState::Curb
                } else if e >= self.elevation.step_min {
                    CellState::Step
                } else {
                    continue;
                };
                // A raised surface reached over a gentle gradient is a ramp,
                // not a step: check the steepest slope to classified
                // neighbors.
                let mut max_slope = 0.0f32;
                let mut sloped_neighbors = 0usize;
                for (nx, nz) in [(ix - 1, iz), (ix + 1, iz), (ix, iz - 1), (ix, iz + 1)] {
                    if !(0..gs).contains(&nx) || !(0..gs).contains(&nz) {
                        continue;
                    }
                    let n = &self.cells[(nz * gs + nx) as usize];
                    if !n.is_valid(min_hits) || !n.min_height.is_finite() {
                        continue;
                    }
                    max_slope = max_slope.max((e - n.elevation).abs() / cs);
                    sloped_neighbors += 1;
                }
                if band != CellState::Dropoff
                    && sloped_neighbors > 0
                    && max_slope <= self.elevation.ramp_max_slope
                {
                    banded.push((idx, CellState::Ramp));
                } else {
                    banded.push((idx, band));
                }
            }
        }
        for &(idx, state) in &banded {
            self.cells[idx].state = state;
        }

        // Stair runs: adjacent raised cells whose rise matches the tread
        // size. A run climbs out of the step band after one tread, so curb
        // cells participate too.
        let rise_lo = self.elevation.stair_step_size - self.elevation.stair_tolerance;
        let rise_hi = self.elevation.stair_step_size + self.elevation.stair_tolerance;
        let raised = |state: CellState| matches!(state, CellState::Step | CellState::Curb);
        let mut stairs: Vec<usize> = Vec::new();
        for iz in 0..gs {
            for ix in 0..gs {
                let idx = (iz * gs + ix) as usize;
                if !raised(self.cells[idx].state) {
                    continue;
                }
                let e = self.cells[idx].elevation;
                for (nx, nz) in [(ix + 1, iz), (ix, iz + 1)] {
                    if !(0..gs).contains(&nx) || !(0..gs).contains(&nz) {
                        continue;
                    }
                    let nidx = (nz * gs + nx) as usize;
                    if !raised(self.cells[nidx].state) {
                        continue;
                    }
                    let rise = (self.cells[nidx].elevation - e).abs();
                    if rise >= rise_lo && rise <= rise_hi {
                        stairs.push(idx);
                        stairs.push(nidx);
                    }
                }
            }
        }
        for idx in stairs {
            self.cells[idx].state = CellState::Stairs;
        }
    }

    fn recount(&mut self) {
        let min_hits = self.processing.min_hit_count;
        let mut stats = GridStats::default();
        for cell in &self.cells {
            if cell.is_valid(min_hits) {
                stats.valid_cells += 1;
            }
            match cell.state {
                CellState::Occupied => stats.obstacle_cells += 1,
                CellState::Step | CellState::Stairs => stats.step_cells += 1,
                _ => {}
            }
        }
        self.stats = stats;
    }

    /// Heading-aligned compact snapshot; see `compact`.
    pub fn to_compact_bytes(&self) -> Vec<u8> {
        crate::compact::to_compact_bytes(self)
    }

    /// Test/bench hook: place a state directly without observation counting.
    #[doc(hidden)]
    pub fn set_state_for_test(&mut self, ix: usize, iz: usize, state: CellState) {
        self.cell_mut(ix, iz).state = state;
    }
}
