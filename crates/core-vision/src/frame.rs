//! Camera-side input types: color frames, intrinsics, and poses.

use std::sync::Arc;

/// A color frame as delivered by the camera source. The pixel buffer is
/// shared so the two vision workers can run on the same frame without a
/// copy; this crate never interprets the pixel format.
#[derive(Debug, Clone)]
pub struct ColorFrame {
    pub width: usize,
    pub height: usize,
    pub data: Arc<[u8]>,
}

impl ColorFrame {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }
}

/// Pinhole intrinsics of the frame the pose refers to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

/// Camera-to-world transform as a row-major 4×4 matrix.
///
/// Convention: the rotation columns are the camera basis vectors expressed in
/// world coordinates, the camera looks along its +z axis, and the world
/// vertical is +y. `yaw` is measured about +y with 0 along world +z,
/// positive toward +x (the user's right), matching grid bearings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub matrix: [[f32; 4]; 4],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        matrix: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub const fn new(matrix: [[f32; 4]; 4]) -> Self {
        Self { matrix }
    }

    /// Pose at a world position with a yaw about the vertical axis.
    pub fn from_position_yaw(x: f32, y: f32, z: f32, yaw: f32) -> Self {
        let (s, c) = yaw.sin_cos();
        Self {
            matrix: [
                [c, 0.0, s, x],
                [0.0, 1.0, 0.0, y],
                [-s, 0.0, c, z],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// World-space camera position.
    pub fn translation(&self) -> [f32; 3] {
        [self.matrix[0][3], self.matrix[1][3], self.matrix[2][3]]
    }

    /// Heading about the vertical axis, extracted from the forward (+z)
    /// basis column projected onto the ground plane.
    pub fn yaw(&self) -> f32 {
        let fx = self.matrix[0][2];
        let fz = self.matrix[2][2];
        fx.atan2(fz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_pose_faces_forward() {
        assert_eq!(Pose::IDENTITY.yaw(), 0.0);
        assert_eq!(Pose::IDENTITY.translation(), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn yaw_round_trips_through_matrix() {
        for &yaw in &[-1.2f32, -0.3, 0.0, 0.7, 1.5] {
            let pose = Pose::from_position_yaw(1.0, 1.6, -2.0, yaw);
            assert!((pose.yaw() - yaw).abs() < 1e-5, "yaw {yaw}");
            assert_eq!(pose.translation(), [1.0, 1.6, -2.0]);
        }
    }
}
