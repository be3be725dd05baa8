//! Depth capture decoding and unprojection.
//!
//! The depth target carries two channels per pixel: the code of the cascade
//! that drew the nearest surface (red byte of an `Rgba8Unorm` attachment) and
//! the linear distance of that surface along the camera's forward axis
//! (`R32Float` attachment).

use glam::{DVec2, DVec3};

use crate::camera::{view_ray, PlanetCamera};
use crate::pixels::PixelBuffer;

/// Cascade code meaning "nothing was drawn here".
pub const NO_GEOMETRY: u8 = 0;

/// Cascade code written for `index`.
#[allow(clippy::cast_possible_truncation)]
pub fn encode_cascade(index: usize) -> u8 {
    (index.min(usize::from(u8::MAX) - 1) + 1) as u8
}

/// Cascade index for a code, `None` for [`NO_GEOMETRY`].
pub fn decode_cascade(code: u8) -> Option<usize> {
    code.checked_sub(1).map(usize::from)
}

/// One decoded depth texel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthSample {
    pub cascade: usize,
    /// Linear eye-space depth along the forward axis, in meters.
    pub depth: f32,
}

/// Read-only view over a completed depth readback.
#[derive(Debug, Clone, Copy)]
pub struct DepthImage<'a> {
    codes: &'a PixelBuffer,
    distances: &'a PixelBuffer,
}

impl<'a> DepthImage<'a> {
    pub fn new(codes: &'a PixelBuffer, distances: &'a PixelBuffer) -> Self {
        Self { codes, distances }
    }

    /// Decodes the texel under a normalized screen position.
    pub fn sample(&self, normalized: DVec2) -> Option<DepthSample> {
        let (x, y) = self.codes.texel_at(normalized)?;
        let cascade = decode_cascade(self.codes.texel(x, y)?[0])?;
        let (dx, dy) = self.distances.texel_at(normalized)?;
        let depth = self.distances.f32_at(dx, dy)?;
        if !depth.is_finite() || depth <= 0.0 {
            return None;
        }
        Some(DepthSample { cascade, depth })
    }
}

/// Distance from the eye to the surface along the pixel's view ray.
///
/// The view ray comes from the inverse projection of the cascade that drew the
/// pixel. Perspective depth is divided by the cosine between the ray and the
/// forward axis; orthographic depth is used as is.
pub fn ray_distance(camera: &PlanetCamera, sample: DepthSample, normalized: DVec2) -> Option<f64> {
    let cascade = camera.cascades().get(sample.cascade)?;
    let depth = f64::from(sample.depth);
    if camera.is_orthographic() {
        return Some(depth);
    }
    let (_, direction) = view_ray(camera, &cascade.inverse_projection, normalized);
    let cosine = -direction.z;
    if cosine <= f64::EPSILON {
        return None;
    }
    Some(depth / cosine)
}

/// World position of the surface under the pixel.
pub fn world_position(
    camera: &PlanetCamera,
    sample: DepthSample,
    normalized: DVec2,
) -> Option<DVec3> {
    let distance = ray_distance(camera, sample, normalized)?;
    let cascade = camera.cascades().get(sample.cascade)?;
    let (origin, direction) = view_ray(camera, &cascade.inverse_projection, normalized);
    let view_point = origin + direction * distance;
    Some(camera.eye() + camera.view_to_world(view_point))
}

/// Convenience wrapper: decode and unproject in one step.
pub fn sample_distance(
    camera: &PlanetCamera,
    image: &DepthImage<'_>,
    normalized: DVec2,
) -> Option<f64> {
    let sample = image.sample(normalized)?;
    ray_distance(camera, sample, normalized)
}

/// Convenience wrapper: decode and compute the world position in one step.
pub fn sample_world_position(
    camera: &PlanetCamera,
    image: &DepthImage<'_>,
    normalized: DVec2,
) -> Option<DVec3> {
    let sample = image.sample(normalized)?;
    world_position(camera, sample, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ProjectionMode;
    use crate::pixels::PixelFormat;

    fn images(width: u32, height: u32) -> (PixelBuffer, PixelBuffer) {
        (
            PixelBuffer::new(PixelFormat::Rgba8, width, height),
            PixelBuffer::new(PixelFormat::R32Float, width, height),
        )
    }

    #[test]
    fn test_cascade_codes() {
        assert_eq!(encode_cascade(0), 1);
        assert_eq!(decode_cascade(encode_cascade(3)), Some(3));
        assert_eq!(decode_cascade(NO_GEOMETRY), None);
    }

    #[test]
    fn test_empty_sky_is_none() {
        let camera = PlanetCamera::default();
        let (codes, mut distances) = images(4, 4);
        // A stale distance without a cascade code must not leak through.
        distances.set_f32(1, 1, 42.0);
        let image = DepthImage::new(&codes, &distances);
        assert_eq!(sample_distance(&camera, &image, DVec2::new(0.3, 0.3)), None);
    }

    #[test]
    fn test_out_of_bounds_is_none() {
        let camera = PlanetCamera::default();
        let (mut codes, mut distances) = images(2, 2);
        codes.fill([1, 0, 0, 255]);
        distances.fill(10.0f32.to_le_bytes());
        let image = DepthImage::new(&codes, &distances);
        assert_eq!(sample_distance(&camera, &image, DVec2::new(1.5, 0.5)), None);
        assert!(sample_distance(&camera, &image, DVec2::new(0.5, 0.5)).is_some());
    }

    #[test]
    fn test_perspective_distance_corrects_for_angle() {
        let mut camera = PlanetCamera::default();
        camera.set_viewport(800, 600);
        camera.look_at(DVec3::new(0.0, 0.0, 50.0), DVec3::ZERO, DVec3::Y);
        let target = DVec3::new(8.0, 5.0, 0.0);
        let (screen, depth) = camera.project(target).unwrap();

        #[allow(clippy::cast_possible_truncation)]
        let sample = DepthSample {
            cascade: 0,
            depth: depth as f32,
        };
        let distance = ray_distance(&camera, sample, screen).unwrap();
        assert!((distance - (target - camera.eye()).length()).abs() < 1e-4);
        let world = world_position(&camera, sample, screen).unwrap();
        assert!(world.abs_diff_eq(target, 1e-4));
    }

    #[test]
    fn test_orthographic_uses_linear_depth() {
        let mut camera = PlanetCamera::default();
        camera.set_projection_mode(ProjectionMode::Orthographic);
        camera.look_at(DVec3::new(0.0, 0.0, 100.0), DVec3::ZERO, DVec3::Y);
        let sample = DepthSample {
            cascade: 1,
            depth: 100.0,
        };
        let screen = DVec2::new(0.25, 0.75);
        assert_eq!(ray_distance(&camera, sample, screen), Some(100.0));
        let world = world_position(&camera, sample, screen).unwrap();
        assert!((world.z - 0.0).abs() < 1e-9);
        assert!(world.x < 0.0 && world.y < 0.0);
    }

    #[test]
    fn test_unknown_cascade_is_none() {
        let camera = PlanetCamera::default();
        let sample = DepthSample {
            cascade: 9,
            depth: 1.0,
        };
        assert_eq!(ray_distance(&camera, sample, DVec2::splat(0.5)), None);
    }
}
