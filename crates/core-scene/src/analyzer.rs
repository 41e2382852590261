//! Depth + segmentation → column-wise scene descriptor.

use crate::types::{Discontinuity, DiscontinuityDirection, SceneUnderstanding};
use core_config::AnalyzerConfig;
use core_vision::{nearest_index, DepthMap, SegmentationMap};
use std::collections::HashSet;

/// Stateless reduction of paired vision frames. Depth and segmentation may
/// have different resolutions; the mapping between them is nearest-neighbor
/// via integer scaling.
#[derive(Debug, Clone)]
pub struct SceneAnalyzer {
    params: AnalyzerConfig,
    walkable: HashSet<u8>,
}

impl SceneAnalyzer {
    pub fn new(params: AnalyzerConfig, walkable: HashSet<u8>) -> Self {
        Self { params, walkable }
    }

    pub fn params(&self) -> &AnalyzerConfig {
        &self.params
    }

    /// Reduce one frame pair. Never fails: degenerate inputs (no walkable
    /// pixels, empty slabs) leave the zeroed/∞ defaults in place.
    pub fn analyze(
        &self,
        depth: &DepthMap,
        seg: &SegmentationMap,
        camera_hfov: f32,
    ) -> SceneUnderstanding {
        let columns = self.params.columns;
        let mut scene = SceneUnderstanding::empty(columns, camera_hfov);
        let (dw, dh) = (depth.width(), depth.height());
        let (sw, sh) = (seg.width(), seg.height());

        // Traversability: contiguous horizontal slabs of the seg image,
        // counted over all rows. No horizon assumption; a chest-mount camera
        // pitches arbitrarily.
        for c in 0..columns {
            let start = c * sw / columns;
            let end = (((c + 1) * sw) / columns).min(sw);
            if start >= end {
                continue;
            }
            let total = (end - start) * sh;
            let mut walk = 0usize;
            for y in 0..sh {
                for x in start..end {
                    if self.walkable_at(seg, x, y) {
                        walk += 1;
                    }
                }
            }
            scene.traversability[c] = walk as f32 / total as f32;
        }

        // Obstacle distance + discontinuity share one bottom→top scan at the
        // column's depth-space midpoint.
        for c in 0..columns {
            let start = c * dw / columns;
            let end = (((c + 1) * dw) / columns).min(dw);
            if start >= end {
                continue;
            }
            let x = (start + end - 1) / 2;
            let mut profile: Vec<f32> = Vec::new();
            let mut obstacle = f32::INFINITY;
            for y in (0..dh).rev() {
                let d = depth.depth_at_pixel(x, y);
                if !d.is_finite() {
                    continue;
                }
                // Sky test on raw model output, before any metric conversion.
                if d > self.params.sky_depth_threshold {
                    continue;
                }
                let sx = nearest_index(x, dw, sw);
                let sy = nearest_index(y, dh, sh);
                if self.walkable_at(seg, sx, sy) {
                    profile.push(d);
                } else if obstacle.is_infinite() {
                    obstacle = d;
                }
            }
            scene.obstacle_distance[c] = obstacle;
            if let Some(found) =
                self.detect_discontinuity(c, scene.column_bearings[c], &profile)
            {
                scene.discontinuities.push(found);
            }
        }

        // Ground plane ratio over the full image, in seg resolution.
        let mut non_sky = 0usize;
        let mut walkable = 0usize;
        let mut skipped = 0usize;
        for sy in 0..sh {
            for sx in 0..sw {
                let dx = nearest_index(sx, sw, dw);
                let dy = nearest_index(sy, sh, dh);
                let d = depth.depth_at_pixel(dx, dy);
                if !d.is_finite() {
                    skipped += 1;
                    continue;
                }
                if d > self.params.sky_depth_threshold {
                    continue;
                }
                non_sky += 1;
                if self.walkable_at(seg, sx, sy) {
                    walkable += 1;
                }
            }
        }
        scene.ground_plane_ratio = if non_sky == 0 {
            0.0
        } else {
            walkable as f32 / non_sky as f32
        };
        scene.skipped_samples = skipped;

        tracing::trace!(
            target: "scene.analyze",
            ground_ratio = scene.ground_plane_ratio,
            discontinuities = scene.discontinuities.len(),
            skipped,
            "frame_reduced"
        );
        scene
    }

    #[inline]
    fn walkable_at(&self, seg: &SegmentationMap, x: usize, y: usize) -> bool {
        seg.label_at(x, y)
            .is_some_and(|label| self.walkable.contains(&label))
    }

    /// Find the dominant vertical break in one column's walkable depth
    /// profile (ordered bottom→top, nearest first).
    ///
    /// A gradient is a candidate when it clears the absolute floor and, when
    /// the column has a nonzero median gradient, stands out from it as an
    /// outlier. That second test keeps smooth ramps quiet: a perfectly
    /// uniform gradient has ratio 1 everywhere and never fires.
    fn detect_discontinuity(
        &self,
        column: usize,
        bearing: f32,
        profile: &[f32],
    ) -> Option<Discontinuity> {
        if profile.len() < 2 {
            return None;
        }
        let grads: Vec<f32> = profile.windows(2).map(|w| w[1] - w[0]).collect();
        let max_abs = grads.iter().map(|g| g.abs()).fold(0.0f32, f32::max);
        if max_abs <= 0.0 {
            return None;
        }
        let mut sorted: Vec<f32> = grads.iter().map(|g| g.abs()).collect();
        sorted.sort_by(f32::total_cmp);
        let median = if sorted.len() % 2 == 1 {
            sorted[sorted.len() / 2]
        } else {
            (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.0
        };

        let mut best: Option<(usize, f32)> = None;
        for (i, &g) in grads.iter().enumerate() {
            let a = g.abs();
            if a < self.params.discontinuity_min_abs_gradient {
                continue;
            }
            if median > 0.0 && a / median <= self.params.discontinuity_outlier_ratio {
                continue;
            }
            let normalized = a / max_abs;
            // Strictly greater keeps the earliest (nearest) index on ties.
            if best.map_or(true, |(_, b)| normalized > b) {
                best = Some((i, normalized));
            }
        }
        let (idx, magnitude) = best?;
        if magnitude < self.params.discontinuity_threshold {
            return None;
        }
        let direction = if grads[idx] > 0.0 {
            DiscontinuityDirection::DropAway
        } else {
            DiscontinuityDirection::RiseUp
        };
        Some(Discontinuity {
            column,
            bearing,
            relative_depth: profile[idx],
            magnitude,
            direction,
        })
    }
}
