//! Planet camera: double-precision eye, orthonormal basis and cascade list.

use glam::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::cascade::{back_to_front, Cascade, CascadeIter, CascadeRange, DEFAULT_CASCADES};

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProjectionMode {
    /// Perspective projection (default).
    #[default]
    Perspective,
    /// Orthographic projection.
    Orthographic,
}

/// Camera for planet-scale scenes.
///
/// The eye lives in double precision. Cascade view matrices are rotation-only
/// because all geometry reaches the GPU relative to the eye.
#[derive(Debug, Clone)]
pub struct PlanetCamera {
    eye: DVec3,
    forward: DVec3,
    up: DVec3,
    right: DVec3,
    /// Vertical field of view in radians.
    fov_y: f64,
    /// Width over height.
    aspect_ratio: f64,
    /// Visible height of the orthographic frustum, in meters.
    ortho_height: f64,
    projection_mode: ProjectionMode,
    ranges: Vec<CascadeRange>,
    cascades: Vec<Cascade>,
}

impl Default for PlanetCamera {
    fn default() -> Self {
        Self::new(DEFAULT_CASCADES.to_vec())
    }
}

impl PlanetCamera {
    /// Creates a camera at the origin looking down -Z with the given cascades.
    pub fn new(ranges: Vec<CascadeRange>) -> Self {
        let mut camera = Self {
            eye: DVec3::ZERO,
            forward: DVec3::NEG_Z,
            up: DVec3::Y,
            right: DVec3::X,
            fov_y: 45.0_f64.to_radians(),
            aspect_ratio: 1.0,
            ortho_height: 1_000.0,
            projection_mode: ProjectionMode::Perspective,
            ranges,
            cascades: Vec::new(),
        };
        camera.update();
        camera
    }

    pub fn eye(&self) -> DVec3 {
        self.eye
    }

    pub fn forward(&self) -> DVec3 {
        self.forward
    }

    pub fn up(&self) -> DVec3 {
        self.up
    }

    pub fn right(&self) -> DVec3 {
        self.right
    }

    pub fn fov_y(&self) -> f64 {
        self.fov_y
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.aspect_ratio
    }

    pub fn projection_mode(&self) -> ProjectionMode {
        self.projection_mode
    }

    pub fn is_orthographic(&self) -> bool {
        self.projection_mode == ProjectionMode::Orthographic
    }

    pub fn ranges(&self) -> &[CascadeRange] {
        &self.ranges
    }

    /// Cascades ordered near to far.
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    /// Index of the cascade drawn first.
    pub fn farthest_index(&self) -> usize {
        self.cascades.len().saturating_sub(1)
    }

    /// Cascades in draw order.
    pub fn iter_cascades(&self) -> CascadeIter<'_> {
        back_to_front(&self.cascades)
    }

    /// Places the eye and orients the camera towards `target`.
    pub fn look_at(&mut self, eye: DVec3, target: DVec3, up: DVec3) {
        self.look_to(eye, target - eye, up);
    }

    /// Places the eye and orients the camera along `direction`.
    ///
    /// A degenerate direction or an up vector parallel to it keeps the
    /// previous orientation.
    pub fn look_to(&mut self, eye: DVec3, direction: DVec3, up: DVec3) {
        self.eye = eye;
        let forward = direction.normalize_or_zero();
        let right = forward.cross(up).normalize_or_zero();
        if forward != DVec3::ZERO && right != DVec3::ZERO {
            self.forward = forward;
            self.right = right;
            self.up = right.cross(forward);
        }
        self.update();
    }

    /// Sets the aspect ratio from a viewport size.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = f64::from(width) / f64::from(height);
            self.update();
        }
    }

    pub fn set_fov_y(&mut self, fov_y: f64) {
        self.fov_y = fov_y.clamp(1e-4, std::f64::consts::PI - 1e-4);
        self.update();
    }

    pub fn set_ortho_height(&mut self, height: f64) {
        self.ortho_height = height.max(1e-6);
        self.update();
    }

    pub fn set_projection_mode(&mut self, mode: ProjectionMode) {
        self.projection_mode = mode;
        self.update();
    }

    /// Replaces the cascade ranges.
    pub fn set_ranges(&mut self, ranges: Vec<CascadeRange>) {
        self.ranges = ranges;
        self.update();
    }

    /// Rotation-only view matrix.
    pub fn view_rotation(&self) -> DMat4 {
        DMat4::look_to_rh(DVec3::ZERO, self.forward, self.up)
    }

    fn projection(&self, near: f64, far: f64) -> DMat4 {
        match self.projection_mode {
            ProjectionMode::Perspective => {
                DMat4::perspective_rh(self.fov_y, self.aspect_ratio, near, far)
            }
            ProjectionMode::Orthographic => {
                let half_h = self.ortho_height * 0.5;
                let half_w = half_h * self.aspect_ratio;
                DMat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        }
    }

    /// Rebuilds the cascade list from the current pose and projection.
    pub fn update(&mut self) {
        let view = self.view_rotation();
        self.cascades = self
            .ranges
            .iter()
            .enumerate()
            .map(|(index, range)| {
                let projection = self.projection(range.near, range.far);
                Cascade {
                    index,
                    near: range.near,
                    far: range.far,
                    view,
                    projection,
                    inverse_projection: projection.inverse(),
                }
            })
            .collect();
    }

    /// Converts a view-space vector to world space (rotation only).
    pub fn view_to_world(&self, v: DVec3) -> DVec3 {
        self.right * v.x + self.up * v.y - self.forward * v.z
    }

    /// Ray through a normalized screen position (`[0, 1]`, y down), in world
    /// space. The direction is unit length.
    pub fn ray(&self, normalized: DVec2) -> Option<(DVec3, DVec3)> {
        let cascade = self.cascades.first()?;
        let (origin, direction) = view_ray(self, &cascade.inverse_projection, normalized);
        Some((
            self.eye + self.view_to_world(origin),
            self.view_to_world(direction),
        ))
    }

    /// Projects a world position to a normalized screen position and its
    /// linear depth along the forward axis. `None` behind the camera.
    pub fn project(&self, world: DVec3) -> Option<(DVec2, f64)> {
        let rel = world - self.eye;
        let view = DVec3::new(rel.dot(self.right), rel.dot(self.up), -rel.dot(self.forward));
        let depth = -view.z;
        if depth <= 0.0 {
            return None;
        }
        let projection = self.projection(1.0, 2.0);
        let ndc = projection.project_point3(view);
        Some((ndc_to_normalized(DVec2::new(ndc.x, ndc.y)), depth))
    }
}

/// Maps a normalized screen position (`[0, 1]`, y down) to NDC.
pub fn normalized_to_ndc(normalized: DVec2) -> DVec2 {
    DVec2::new(normalized.x * 2.0 - 1.0, 1.0 - normalized.y * 2.0)
}

/// Maps NDC to a normalized screen position (`[0, 1]`, y down).
pub fn ndc_to_normalized(ndc: DVec2) -> DVec2 {
    DVec2::new((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5)
}

/// View-space ray for a normalized screen position.
///
/// Perspective rays start at the eye. Orthographic rays start on the image
/// plane and point along -Z.
pub(crate) fn view_ray(
    camera: &PlanetCamera,
    inverse_projection: &DMat4,
    normalized: DVec2,
) -> (DVec3, DVec3) {
    let ndc = normalized_to_ndc(normalized);
    let on_near = inverse_projection.project_point3(DVec3::new(ndc.x, ndc.y, 0.0));
    match camera.projection_mode {
        ProjectionMode::Perspective => (DVec3::ZERO, on_near.normalize()),
        ProjectionMode::Orthographic => (DVec3::new(on_near.x, on_near.y, 0.0), DVec3::NEG_Z),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_defaults() {
        let camera = PlanetCamera::default();
        assert_eq!(camera.projection_mode(), ProjectionMode::Perspective);
        assert_eq!(camera.cascades().len(), 4);
        assert_eq!(camera.farthest_index(), 3);
        assert_eq!(camera.forward(), DVec3::NEG_Z);
    }

    #[test]
    fn test_cascades_follow_ranges() {
        let camera = PlanetCamera::default();
        for (cascade, range) in camera.cascades().iter().zip(DEFAULT_CASCADES.iter()) {
            assert_eq!(cascade.near, range.near);
            assert_eq!(cascade.far, range.far);
            let identity = cascade.projection * cascade.inverse_projection;
            assert!(identity.abs_diff_eq(DMat4::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn test_center_ray_is_forward() {
        let mut camera = PlanetCamera::default();
        camera.look_at(
            DVec3::new(1.0e7, 0.0, 0.0),
            DVec3::ZERO,
            DVec3::Z,
        );
        let (origin, dir) = camera.ray(DVec2::new(0.5, 0.5)).unwrap();
        assert!(origin.abs_diff_eq(camera.eye(), 1e-6));
        assert!(dir.abs_diff_eq(DVec3::NEG_X, 1e-9));
    }

    #[test]
    fn test_project_matches_ray() {
        let mut camera = PlanetCamera::default();
        camera.set_viewport(800, 600);
        camera.look_at(DVec3::new(0.0, 0.0, 100.0), DVec3::ZERO, DVec3::Y);
        let point = DVec3::new(3.0, -2.0, 10.0);
        let (screen, depth) = camera.project(point).unwrap();
        assert!((depth - 90.0).abs() < 1e-9);
        let (origin, dir) = camera.ray(screen).unwrap();
        let along = (point - origin).dot(dir);
        assert!((origin + dir * along).abs_diff_eq(point, 1e-6));
    }

    #[test]
    fn test_project_behind_is_none() {
        let camera = PlanetCamera::default();
        assert!(camera.project(DVec3::new(0.0, 0.0, 5.0)).is_none());
    }

    #[test]
    fn test_degenerate_look_keeps_orientation() {
        let mut camera = PlanetCamera::default();
        camera.look_to(DVec3::ONE, DVec3::ZERO, DVec3::Y);
        assert_eq!(camera.forward(), DVec3::NEG_Z);
        assert_eq!(camera.eye(), DVec3::ONE);
    }

    #[test]
    fn test_orthographic_ray_is_parallel() {
        let mut camera = PlanetCamera::default();
        camera.set_projection_mode(ProjectionMode::Orthographic);
        let (_, a) = camera.ray(DVec2::new(0.1, 0.2)).unwrap();
        let (_, b) = camera.ray(DVec2::new(0.9, 0.7)).unwrap();
        assert_eq!(a, b);
        assert!(camera.is_orthographic());
    }
}
