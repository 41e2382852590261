//! Persistent top-down occupancy grid.
//!
//! Storage is world-aligned: cell indices are a translated world frame and
//! no rotation is ever baked in, so temporal persistence stays correct while
//! the user turns. The user heading is applied only at output time (the
//! heading-aligned compact snapshot and raycast start vectors).
//!
//! Lifecycle: created once at startup, mutated by the navigation planner on
//! every frame, decayed over time, and recentered by integer cell shifts when
//! the user approaches the edge. Cells that scroll off the window or decay
//! below the confidence floor reset to `Unknown`.

pub mod cell;
pub mod compact;
pub mod grid;

pub use cell::{CellState, GridCell};
pub use compact::{from_compact_bytes, to_compact_bytes};
pub use grid::{GridStats, OccupancyGrid};
