// SPDX-License-Identifier: MPL-2.0

//! Rotation and sampling transforms for the full-screen quad
//!
//! Matrices are column-major, matching the WGSL `mat4x4<f32>` uniform layout.
//! The quad spans normalized device coordinates [-1, 1]; its texture
//! coordinates are (x + 1) / 2, (y + 1) / 2 before the sampling transform.

/// Normalize any angle in degrees into [0, 360)
pub fn normalize_degrees(degrees: i32) -> i32 {
    degrees.rem_euclid(360)
}

/// Column-major 4x4 matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat4(pub [f32; 16]);

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Counter-clockwise rotation about the z axis
    pub fn rotate_z(degrees: i32) -> Mat4 {
        let (sin, cos) = match normalize_degrees(degrees) {
            0 => (0.0, 1.0),
            90 => (1.0, 0.0),
            180 => (0.0, -1.0),
            270 => (-1.0, 0.0),
            other => (other as f32).to_radians().sin_cos(),
        };
        let mut m = Mat4::IDENTITY;
        m.0[0] = cos;
        m.0[1] = sin;
        m.0[4] = -sin;
        m.0[5] = cos;
        m
    }

    /// Maps t to 1 - t, leaving s unchanged
    pub fn flip_y() -> Mat4 {
        let mut m = Mat4::IDENTITY;
        m.0[5] = -1.0;
        m.0[13] = 1.0;
        m
    }

    pub fn is_identity(&self) -> bool {
        *self == Mat4::IDENTITY
    }

    /// Transform a point in the z = 0 plane
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0] * x + m[4] * y + m[12], m[1] * x + m[5] * y + m[13])
    }

    /// Inverse of the 2D affine part; `None` if singular
    pub fn inverse_2d(&self) -> Option<Mat4> {
        let m = &self.0;
        let (a, b, c, d) = (m[0], m[4], m[1], m[5]);
        let det = a * d - b * c;
        if det.abs() < f32::EPSILON {
            return None;
        }
        let (ia, ib, ic, id) = (d / det, -b / det, -c / det, a / det);
        let (tx, ty) = (m[12], m[13]);
        let mut inv = Mat4::IDENTITY;
        inv.0[0] = ia;
        inv.0[4] = ib;
        inv.0[1] = ic;
        inv.0[5] = id;
        inv.0[12] = -(ia * tx + ib * ty);
        inv.0[13] = -(ic * tx + id * ty);
        Some(inv)
    }
}

/// Quad transform for a clockwise rotation of the picture
///
/// Visually clockwise degrees become a counter-clockwise texture-space
/// rotation, so the quad is rotated by the negated angle.
pub fn rotation_matrix(degrees: i32) -> Mat4 {
    Mat4::rotate_z(-normalize_degrees(degrees))
}

/// Pixel rectangle the quad is drawn into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0), 0);
        assert_eq!(normalize_degrees(360), 0);
        assert_eq!(normalize_degrees(-90), 270);
        assert_eq!(normalize_degrees(450), 90);
        assert_eq!(normalize_degrees(-720), 0);
        assert_eq!(normalize_degrees(i32::MIN), i32::MIN.rem_euclid(360));
    }

    #[test]
    fn test_identity_iff_zero() {
        for degrees in [-360, -270, -180, -90, 0, 45, 90, 180, 270, 360, 720, 1000] {
            let m = rotation_matrix(degrees);
            assert_eq!(
                m.is_identity(),
                normalize_degrees(degrees) == 0,
                "rotation {} gave {:?}",
                degrees,
                m
            );
        }
    }

    #[test]
    fn test_clockwise_quarter_turn() {
        // A clockwise picture rotation moves the quad's top edge to the right
        let (x, y) = rotation_matrix(90).apply(0.0, 1.0);
        assert!((x - 1.0).abs() < 1e-6 && y.abs() < 1e-6);
    }

    #[test]
    fn test_flip_y() {
        assert_eq!(Mat4::flip_y().apply(0.25, 0.0), (0.25, 1.0));
        assert_eq!(Mat4::flip_y().apply(0.25, 1.0), (0.25, 0.0));
    }

    #[test]
    fn test_inverse_round_trip() {
        let m = rotation_matrix(270);
        let inv = m.inverse_2d().unwrap();
        let (x, y) = m.apply(0.3, -0.7);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 0.3).abs() < 1e-5 && (by + 0.7).abs() < 1e-5);
    }
}
