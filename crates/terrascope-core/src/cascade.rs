//! Frustum cascades.
//!
//! A single `f32` depth range cannot cover one meter to one billion meters, so
//! the camera's visible range is cut into slices that are drawn one after the
//! other, farthest first, each with its own projection and a cleared depth
//! buffer.

use glam::{DMat4, Mat4};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrascopeError};

/// Near/far pair of one cascade, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeRange {
    pub near: f64,
    pub far: f64,
}

impl CascadeRange {
    pub const fn new(near: f64, far: f64) -> Self {
        Self { near, far }
    }
}

/// Cascade layout for a camera orbiting a planet. Neighbouring ranges overlap
/// slightly so geometry on a boundary is never clipped by both.
pub const DEFAULT_CASCADES: [CascadeRange; 4] = [
    CascadeRange::new(1.0, 100.075),
    CascadeRange::new(100.0, 1_000.075),
    CascadeRange::new(1_000.0, 1.0e6 + 10_000.0),
    CascadeRange::new(1.0e6, 1.0e9),
];

/// Checks that the list is non-empty and every range is positive and ordered.
pub fn validate_ranges(ranges: &[CascadeRange]) -> Result<()> {
    if ranges.is_empty() {
        return Err(TerrascopeError::InvalidOptions(
            "at least one cascade is required".to_string(),
        ));
    }
    if ranges.len() > usize::from(u8::MAX - 1) {
        return Err(TerrascopeError::InvalidOptions(format!(
            "{} cascades exceed the cascade code range",
            ranges.len()
        )));
    }
    for (index, range) in ranges.iter().enumerate() {
        if !(range.near > 0.0 && range.far > range.near) {
            return Err(TerrascopeError::InvalidCascade {
                index,
                near: range.near,
                far: range.far,
            });
        }
    }
    Ok(())
}

/// One frustum slice of the camera.
///
/// `view` is rotation-only: positions reach the GPU already relative to the
/// eye, so the translation is folded into the RTE encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub index: usize,
    pub near: f64,
    pub far: f64,
    pub view: DMat4,
    pub projection: DMat4,
    pub inverse_projection: DMat4,
}

impl Cascade {
    pub fn view_projection(&self) -> DMat4 {
        self.projection * self.view
    }

    /// Value written into the cascade channel of the depth target.
    pub fn code(&self) -> u8 {
        crate::depth::encode_cascade(self.index)
    }

    /// Single-precision matrices for shaders.
    #[allow(clippy::cast_possible_truncation)]
    pub fn uniforms(&self) -> CascadeUniforms {
        let view = self.view.as_mat4();
        let projection = self.projection.as_mat4();
        CascadeUniforms {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            view_projection: (projection * view).to_cols_array_2d(),
            inverse_projection: self.inverse_projection.as_mat4().to_cols_array_2d(),
            near: self.near as f32,
            far: self.far as f32,
            code: f32::from(self.code()) / 255.0,
            _padding: 0.0,
        }
    }
}

/// GPU representation of a cascade.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[allow(clippy::pub_underscore_fields)]
pub struct CascadeUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub inverse_projection: [[f32; 4]; 4],
    pub near: f32,
    pub far: f32,
    /// Cascade code normalized to `[0, 1]`, for `Rgba8Unorm` targets.
    pub code: f32,
    pub _padding: f32,
}

impl Default for CascadeUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY.to_cols_array_2d(),
            projection: Mat4::IDENTITY.to_cols_array_2d(),
            view_projection: Mat4::IDENTITY.to_cols_array_2d(),
            inverse_projection: Mat4::IDENTITY.to_cols_array_2d(),
            near: 0.0,
            far: 1.0,
            code: 0.0,
            _padding: 0.0,
        }
    }
}

/// A cascade as seen by the frame loop.
#[derive(Debug, Clone, Copy)]
pub struct CascadePass<'a> {
    pub cascade: &'a Cascade,
    /// First cascade drawn this frame (the farthest one).
    pub is_first_pass: bool,
    /// Last cascade drawn this frame (the nearest one).
    pub is_last_pass: bool,
}

/// Iterates cascades farthest first.
pub struct CascadeIter<'a> {
    inner: std::iter::Rev<std::slice::Iter<'a, Cascade>>,
    total: usize,
    yielded: usize,
}

impl<'a> Iterator for CascadeIter<'a> {
    type Item = CascadePass<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let cascade = self.inner.next()?;
        let pass = CascadePass {
            cascade,
            is_first_pass: self.yielded == 0,
            is_last_pass: self.yielded + 1 == self.total,
        };
        self.yielded += 1;
        Some(pass)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for CascadeIter<'_> {}

/// Back-to-front iteration over a cascade list ordered near to far.
pub fn back_to_front(cascades: &[Cascade]) -> CascadeIter<'_> {
    CascadeIter {
        inner: cascades.iter().rev(),
        total: cascades.len(),
        yielded: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy(index: usize) -> Cascade {
        Cascade {
            index,
            near: 1.0,
            far: 2.0,
            view: DMat4::IDENTITY,
            projection: DMat4::IDENTITY,
            inverse_projection: DMat4::IDENTITY,
        }
    }

    #[test]
    fn test_back_to_front_order() {
        let cascades: Vec<_> = (0..4).map(dummy).collect();
        let passes: Vec<_> = back_to_front(&cascades).collect();
        let order: Vec<_> = passes.iter().map(|p| p.cascade.index).collect();
        assert_eq!(order, vec![3, 2, 1, 0]);
        assert!(passes[0].is_first_pass);
        assert!(passes.iter().skip(1).all(|p| !p.is_first_pass));
        assert!(passes[3].is_last_pass);
    }

    #[test]
    fn test_single_cascade_is_first_and_last() {
        let cascades = vec![dummy(0)];
        let pass = back_to_front(&cascades).next().unwrap();
        assert!(pass.is_first_pass && pass.is_last_pass);
    }

    #[test]
    fn test_default_cascades_are_valid() {
        assert!(validate_ranges(&DEFAULT_CASCADES).is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(validate_ranges(&[]).is_err());
        let inverted = [CascadeRange::new(10.0, 5.0)];
        assert!(matches!(
            validate_ranges(&inverted),
            Err(TerrascopeError::InvalidCascade { index: 0, .. })
        ));
        assert!(validate_ranges(&[CascadeRange::new(0.0, 5.0)]).is_err());
    }

    #[test]
    fn test_uniform_code() {
        let uniforms = dummy(2).uniforms();
        assert!((uniforms.code - 3.0 / 255.0).abs() < 1e-7);
    }
}
