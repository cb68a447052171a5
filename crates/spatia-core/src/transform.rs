//! Per-sample spatial transforms.
//!
//! Matrices are 4x4, column-major, stored as `[f32; 16]` (translation in
//! elements 12..15). A [`TransformBuffer`] holds one matrix per sample of a
//! block so moving sources can be rendered with sub-block resolution.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

/// Column-major 4x4 matrix.
pub type Matrix4 = [f32; 16];

/// The identity matrix.
pub const IDENTITY: Matrix4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Returns `a * b`.
pub fn multiply(a: &Matrix4, b: &Matrix4) -> Matrix4 {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[k * 4 + row] * b[col * 4 + k];
            }
            out[col * 4 + row] = sum;
        }
    }
    out
}

/// Translation matrix.
pub fn translation(x: f32, y: f32, z: f32) -> Matrix4 {
    let mut m = IDENTITY;
    m[12] = x;
    m[13] = y;
    m[14] = z;
    m
}

/// Rotation about the z axis by `radians` (counter-clockwise).
pub fn rotation_z(radians: f32) -> Matrix4 {
    let (s, c) = (libm::sinf(radians), libm::cosf(radians));
    let mut m = IDENTITY;
    m[0] = c;
    m[1] = s;
    m[4] = -s;
    m[5] = c;
    m
}

/// Post-multiplies `m` by a translation (moves in `m`'s local frame).
pub fn translate(m: &mut Matrix4, x: f32, y: f32, z: f32) {
    *m = multiply(m, &translation(x, y, z));
}

/// Post-multiplies `m` by a z rotation.
pub fn rotate_z(m: &mut Matrix4, radians: f32) {
    *m = multiply(m, &rotation_z(radians));
}

/// Translation part of `m`.
#[inline]
pub fn position(m: &Matrix4) -> [f32; 3] {
    [m[12], m[13], m[14]]
}

/// One matrix per sample of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformBuffer {
    matrices: Vec<Matrix4>,
}

impl TransformBuffer {
    /// Creates a buffer of `block_size` identity matrices.
    pub fn new(block_size: usize) -> Self {
        Self {
            matrices: vec![IDENTITY; block_size],
        }
    }

    /// Number of matrices (the block size).
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    /// Returns `true` for a zero-sized block.
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Matrix for sample `i`. Out-of-range indices yield the identity.
    pub fn get(&self, i: usize) -> &Matrix4 {
        self.matrices.get(i).unwrap_or(&IDENTITY)
    }

    /// Overwrites the matrix for sample `i`. Out-of-range indices are ignored.
    pub fn set(&mut self, i: usize, m: Matrix4) {
        if let Some(slot) = self.matrices.get_mut(i) {
            *slot = m;
        }
    }

    /// Copies every matrix from `other` (sizes must match to copy fully).
    pub fn copy_from(&mut self, other: &Self) {
        let n = self.matrices.len().min(other.matrices.len());
        self.matrices[..n].copy_from_slice(&other.matrices[..n]);
    }

    /// Resets every matrix to the identity.
    pub fn reset_identity(&mut self) {
        self.matrices.fill(IDENTITY);
    }

    /// All matrices.
    pub fn as_slice(&self) -> &[Matrix4] {
        &self.matrices
    }

    /// All matrices, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [Matrix4] {
        &mut self.matrices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Matrix4, b: &Matrix4) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-5, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn test_identity_is_neutral() {
        let t = translation(1.0, 2.0, 3.0);
        assert_eq!(multiply(&IDENTITY, &t), t);
        assert_eq!(multiply(&t, &IDENTITY), t);
    }

    #[test]
    fn test_translations_compose() {
        let mut m = translation(1.0, 0.0, 0.0);
        translate(&mut m, 0.0, 2.0, -1.0);
        assert_eq!(position(&m), [1.0, 2.0, -1.0]);
    }

    #[test]
    fn test_rotate_then_translate_moves_in_rotated_frame() {
        let mut m = IDENTITY;
        rotate_z(&mut m, core::f32::consts::FRAC_PI_2);
        translate(&mut m, 1.0, 0.0, 0.0);
        let [x, y, z] = position(&m);
        assert!(x.abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);
        assert_eq!(z, 0.0);
    }

    #[test]
    fn test_full_turn_is_identity() {
        assert_close(&rotation_z(core::f32::consts::TAU), &IDENTITY);
    }

    #[test]
    fn test_buffer_copy_and_reset() {
        let mut a = TransformBuffer::new(4);
        a.set(2, translation(5.0, 0.0, 0.0));
        let mut b = TransformBuffer::new(4);
        b.copy_from(&a);
        assert_eq!(position(b.get(2)), [5.0, 0.0, 0.0]);
        assert_eq!(b.get(99), &IDENTITY);
        b.reset_identity();
        assert_eq!(b.get(2), &IDENTITY);
        assert_eq!(b.len(), 4);
    }
}
