//! Compact binary grid snapshot.
//!
//! `grid_size² × 2` bytes: for each output cell in row-major order (z outer,
//! x inner) a `(state: u8, elevation_cm: i8)` pair. Output cells are
//! enumerated in the heading-aligned frame: local coordinates rotate by the
//! user heading into world before the lookup, so "up" in the output is
//! always the direction the user faces. Out-of-grid output cells encode
//! `(0, 0)`. This is the only place heading touches stored cells.

use crate::cell::CellState;
use crate::grid::OccupancyGrid;

/// Elevation in centimeters, saturating to ±127 to fit an `i8`.
fn elevation_cm(elevation: f32) -> i8 {
    (elevation * 100.0).round().clamp(-127.0, 127.0) as i8
}

pub fn to_compact_bytes(grid: &OccupancyGrid) -> Vec<u8> {
    let gs = grid.grid_size();
    let cs = grid.cell_size();
    let half = gs as f32 / 2.0;
    let (ox, oz) = grid.origin();
    let (sin_h, cos_h) = grid.user_heading().sin_cos();
    let mut out = Vec::with_capacity(gs * gs * 2);
    for z_i in 0..gs {
        for x_i in 0..gs {
            let lx = (x_i as f32 - half + 0.5) * cs;
            let lz = (z_i as f32 - half + 0.5) * cs;
            // Local forward (+lz) points along the user heading in world.
            let wx = ox + lx * cos_h + lz * sin_h;
            let wz = oz - lx * sin_h + lz * cos_h;
            match grid.world_to_grid(wx, wz) {
                Some((ix, iz)) => {
                    let cell = grid.cell(ix, iz);
                    out.push(cell.state.encode());
                    out.push(elevation_cm(cell.elevation) as u8);
                }
                None => {
                    out.push(0);
                    out.push(0);
                }
            }
        }
    }
    out
}

/// Decode a compact snapshot back into `(state, elevation_m)` pairs in the
/// same row-major order. `None` on length mismatch or an unknown state byte.
pub fn from_compact_bytes(bytes: &[u8], grid_size: usize) -> Option<Vec<(CellState, f32)>> {
    if bytes.len() != grid_size * grid_size * 2 {
        return None;
    }
    bytes
        .chunks_exact(2)
        .map(|pair| {
            CellState::decode(pair[0]).map(|state| (state, (pair[1] as i8) as f32 / 100.0))
        })
        .collect()
}
