//! Column-wise scene understanding.
//!
//! `SceneAnalyzer` reduces one paired depth + segmentation frame into a
//! `SceneUnderstanding`: per-column traversability, first obstacle depth,
//! walkable-surface discontinuities, and a global ground-plane ratio. The
//! analyzer is stateless; all temporal behavior lives in the occupancy grid.

pub mod analyzer;
pub mod types;

pub use analyzer::SceneAnalyzer;
pub use types::{Discontinuity, DiscontinuityDirection, SceneUnderstanding};
