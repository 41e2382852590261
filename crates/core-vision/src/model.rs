//! The model-runner seam: capability traits plus synthetic implementations.
//!
//! The pipeline only ever talks to `DepthModel` / `SegModel`, so tests and
//! the demo feed can substitute deterministic models for the real neural
//! runners. The capability set is the contract; there is no deeper hierarchy.

use crate::{ColorFrame, DepthMap, SegmentationMap, ShapeError};
use thiserror::Error;

/// Model-runner failures. `Load` is fatal at startup (exit code 3);
/// `Inference` degrades the single frame it occurred on.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model load failed: {0}")]
    Load(String),
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Raw depth output exactly as the model produced it (relative units).
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DepthFrame {
    /// Validate dimensions and freeze into a sampleable map.
    pub fn into_depth_map(self) -> Result<DepthMap, ShapeError> {
        DepthMap::new(self.width, self.height, self.data)
    }
}

/// Raw segmentation output (COCO-panoptic-compatible class ids).
#[derive(Debug, Clone)]
pub struct SegFrame {
    pub width: usize,
    pub height: usize,
    pub labels: Vec<u8>,
}

impl SegFrame {
    pub fn into_seg_map(self) -> Result<SegmentationMap, ShapeError> {
        SegmentationMap::new(self.width, self.height, self.labels)
    }
}

pub trait DepthModel: Send + Sync {
    fn run_depth(&self, frame: &ColorFrame) -> Result<DepthFrame, ModelError>;
}

pub trait SegModel: Send + Sync {
    fn run_seg(&self, frame: &ColorFrame) -> Result<SegFrame, ModelError>;
}

/// Deterministic depth model for tests and the `--demo` feed: a vertical
/// gradient, near at the image bottom and far at the top, constant along
/// each row. Monotone per column, so it produces no discontinuities.
#[derive(Debug, Clone)]
pub struct SyntheticDepthModel {
    pub width: usize,
    pub height: usize,
}

impl SyntheticDepthModel {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }
}

impl DepthModel for SyntheticDepthModel {
    fn run_depth(&self, _frame: &ColorFrame) -> Result<DepthFrame, ModelError> {
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            // Bottom row 0.9 (close ground), top row 0.1 (far), all below the
            // sky threshold so the whole frame reads as surface.
            let t = if self.height > 1 {
                y as f32 / (self.height - 1) as f32
            } else {
                0.0
            };
            let v = 0.1 + 0.8 * t;
            data.extend(std::iter::repeat(v).take(self.width));
        }
        Ok(DepthFrame {
            width: self.width,
            height: self.height,
            data,
        })
    }
}

/// Deterministic segmentation model: a single class over the whole frame.
#[derive(Debug, Clone)]
pub struct SyntheticSegModel {
    pub width: usize,
    pub height: usize,
    pub label: u8,
}

impl SyntheticSegModel {
    pub fn new(width: usize, height: usize, label: u8) -> Self {
        Self {
            width,
            height,
            label,
        }
    }
}

impl SegModel for SyntheticSegModel {
    fn run_seg(&self, _frame: &ColorFrame) -> Result<SegFrame, ModelError> {
        Ok(SegFrame {
            width: self.width,
            height: self.height,
            labels: vec![self.label; self.width * self.height],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_depth_is_monotone_per_column() {
        let model = SyntheticDepthModel::new(4, 8);
        let frame = ColorFrame::new(4, 8, vec![0; 4 * 8 * 4]);
        let map = model.run_depth(&frame).unwrap().into_depth_map().unwrap();
        for x in 0..4 {
            for y in 1..8 {
                assert!(map.depth_at_pixel(x, y) > map.depth_at_pixel(x, y - 1));
            }
        }
        assert!(map.max_depth() <= 0.9 + 1e-6);
    }

    #[test]
    fn synthetic_seg_is_uniform() {
        let model = SyntheticSegModel::new(3, 3, 149);
        let frame = ColorFrame::new(3, 3, vec![0; 36]);
        let map = model.run_seg(&frame).unwrap().into_seg_map().unwrap();
        assert!(map.labels().iter().all(|&l| l == 149));
    }

    #[test]
    fn bad_model_output_surfaces_shape_error() {
        let frame = DepthFrame {
            width: 3,
            height: 3,
            data: vec![0.0; 8],
        };
        assert!(frame.into_depth_map().is_err());
    }
}
