//! Heading selection over the occupancy grid.
//!
//! The planner is the grid's sole per-frame mutator: it projects the scene
//! descriptor into the grid, runs classification and decay, then ray-marches
//! the result to pick a safe heading and the nearest forward hazard. The only
//! state it keeps between frames is the previously suggested heading.

pub mod output;
pub mod planner;

pub use output::{DiscontinuityAhead, NavigationOutput};
pub use planner::NavigationPlanner;
