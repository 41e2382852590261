//! Semantic segmentation label grid.

use crate::ShapeError;

/// Row-major 8-bit class labels. Labels are uninterpreted here; which ids
/// count as walkable ground is the configuration's business.
#[derive(Debug, Clone)]
pub struct SegmentationMap {
    width: usize,
    height: usize,
    labels: Vec<u8>,
}

impl SegmentationMap {
    pub fn new(width: usize, height: usize, labels: Vec<u8>) -> Result<Self, ShapeError> {
        if width == 0 || height == 0 || labels.len() != width * height {
            return Err(ShapeError {
                width,
                height,
                len: labels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Bounds-checked label read.
    #[inline]
    pub fn label_at(&self, px: usize, py: usize) -> Option<u8> {
        if px >= self.width || py >= self.height {
            return None;
        }
        Some(self.labels[py * self.width + px])
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_rejects_bad_shapes() {
        assert!(SegmentationMap::new(3, 2, vec![0; 5]).is_err());
        assert!(SegmentationMap::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn label_reads_are_bounds_checked() {
        let m = SegmentationMap::new(2, 1, vec![7, 9]).unwrap();
        assert_eq!(m.label_at(1, 0), Some(9));
        assert_eq!(m.label_at(2, 0), None);
        assert_eq!(m.label_at(0, 1), None);
    }
}
