//! Per-frame scene descriptor types.

/// Which way the walkable surface breaks at a discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscontinuityDirection {
    /// Depth decreases moving up the image: the surface rises toward the
    /// user (step up, curb face).
    RiseUp,
    /// Depth increases moving up the image: the surface falls away
    /// (step down, platform edge).
    DropAway,
}

/// A localized vertical break in one column's walkable depth profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discontinuity {
    /// Column index the break was found in.
    pub column: usize,
    /// Bearing of that column, radians from image center.
    pub bearing: f32,
    /// Raw (relative) depth of the profile at the break.
    pub relative_depth: f32,
    /// Gradient magnitude normalized by the column's maximum, in `[0,1]`.
    pub magnitude: f32,
    pub direction: DiscontinuityDirection,
}

/// The column-wise reduction of one frame. All vectors have `columns`
/// entries; degenerate inputs produce zeroed/∞ fields rather than an error.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneUnderstanding {
    pub columns: usize,
    /// Bearing of each column from image center, radians; column `c` maps to
    /// `(c/columns − 0.5) · camera_hfov`.
    pub column_bearings: Vec<f32>,
    /// Fraction of walkable pixels per column over the whole image, `[0,1]`.
    pub traversability: Vec<f32>,
    /// Raw depth of the first non-walkable, non-sky pixel scanning
    /// bottom→top at the column center; `+∞` if none.
    pub obstacle_distance: Vec<f32>,
    pub discontinuities: Vec<Discontinuity>,
    /// Walkable / non-sky pixel ratio over the full image, `[0,1]`.
    pub ground_plane_ratio: f32,
    /// Non-finite samples encountered and skipped this frame.
    pub skipped_samples: usize,
}

impl SceneUnderstanding {
    /// Bearing for column `c` of `columns` across `hfov` radians.
    pub fn bearing_for(c: usize, columns: usize, hfov: f32) -> f32 {
        (c as f32 / columns as f32 - 0.5) * hfov
    }

    /// A scene with no evidence: zero traversability, infinite obstacle
    /// distances, no discontinuities. Used when a vision stage fails.
    pub fn empty(columns: usize, hfov: f32) -> Self {
        Self {
            columns,
            column_bearings: (0..columns)
                .map(|c| Self::bearing_for(c, columns, hfov))
                .collect(),
            traversability: vec![0.0; columns],
            obstacle_distance: vec![f32::INFINITY; columns],
            discontinuities: Vec::new(),
            ground_plane_ratio: 0.0,
            skipped_samples: 0,
        }
    }
}
