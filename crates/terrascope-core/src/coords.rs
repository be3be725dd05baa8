//! Relative-to-eye (RTE) coordinate encoding.
//!
//! GPU pipelines work in single precision, which cannot represent planet-scale
//! world coordinates (~6.4e6 m) with sub-meter accuracy. Every position that is
//! uploaded to the GPU is therefore expressed relative to a reference origin
//! close to the camera and split into a high and a low `f32` part. Shaders add
//! `(high - eye.high) + (low - eye.low)` to recover the eye-relative offset.

use glam::{DVec3, Vec3};

/// Block size of the absolute split encoding.
pub const SPLIT_BLOCK: f64 = 65_536.0;

/// Default distance the eye may travel before the reference origin is rebased.
pub const DEFAULT_REBASE_DISTANCE: f64 = 10_000.0;

/// A double-precision vector stored as two single-precision parts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SplitVec3 {
    pub high: Vec3,
    pub low: Vec3,
}

impl SplitVec3 {
    /// Adds both parts back together in double precision.
    pub fn reconstruct(&self) -> DVec3 {
        self.high.as_dvec3() + self.low.as_dvec3()
    }

    /// Computes `self - other` the way a shader does, in single precision.
    pub fn difference_f32(&self, other: &SplitVec3) -> Vec3 {
        (self.high - other.high) + (self.low - other.low)
    }
}

/// Splits a scalar into `(high, low)` so that `high + low == value` to within
/// single-precision rounding of `low`.
#[allow(clippy::cast_possible_truncation)]
pub fn split_f64(value: f64) -> (f32, f32) {
    let high = value as f32;
    let low = (value - f64::from(high)) as f32;
    (high, low)
}

/// Splits `world - origin` into high and low single-precision parts.
///
/// The subtraction happens in double precision before narrowing, so magnitudes
/// stay small when the origin is near the camera.
pub fn split(world: DVec3, origin: DVec3) -> SplitVec3 {
    let d = world - origin;
    let (hx, lx) = split_f64(d.x);
    let (hy, ly) = split_f64(d.y);
    let (hz, lz) = split_f64(d.z);
    SplitVec3 {
        high: Vec3::new(hx, hy, hz),
        low: Vec3::new(lx, ly, lz),
    }
}

/// Block encoding of an absolute coordinate.
///
/// `high` is a multiple of [`SPLIT_BLOCK`] and `low` the remainder. Used by
/// shaders that subtract the eye entirely on the GPU without a reference origin.
#[allow(clippy::cast_possible_truncation)]
pub fn split_absolute(value: DVec3) -> SplitVec3 {
    let encode = |v: f64| {
        let high = (v / SPLIT_BLOCK).floor() * SPLIT_BLOCK;
        (high as f32, (v - high) as f32)
    };
    let (hx, lx) = encode(value.x);
    let (hy, ly) = encode(value.y);
    let (hz, lz) = encode(value.z);
    SplitVec3 {
        high: Vec3::new(hx, hy, hz),
        low: Vec3::new(lx, ly, lz),
    }
}

/// GPU representation of the per-frame eye split.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[allow(clippy::pub_underscore_fields)]
pub struct RteUniforms {
    pub eye_high: [f32; 3],
    pub _pad0: f32,
    pub eye_low: [f32; 3],
    pub _pad1: f32,
}

impl From<SplitVec3> for RteUniforms {
    fn from(eye: SplitVec3) -> Self {
        Self {
            eye_high: eye.high.to_array(),
            _pad0: 0.0,
            eye_low: eye.low.to_array(),
            _pad1: 0.0,
        }
    }
}

/// Owns the reference origin and the cached eye split.
///
/// The origin only moves when the eye has travelled further than the rebase
/// distance, or when a collaborator asked for it. Each rebase bumps
/// [`generation`](Self::generation) so static geometry knows to re-split.
#[derive(Debug, Clone)]
pub struct RteEncoder {
    origin: DVec3,
    rebase_distance: f64,
    generation: u64,
    rebase_requested: bool,
    eye: DVec3,
    eye_split: SplitVec3,
}

impl Default for RteEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_REBASE_DISTANCE)
    }
}

impl RteEncoder {
    /// Creates an encoder with the origin at the world origin.
    pub fn new(rebase_distance: f64) -> Self {
        Self {
            origin: DVec3::ZERO,
            rebase_distance,
            generation: 0,
            rebase_requested: true,
            eye: DVec3::ZERO,
            eye_split: SplitVec3::default(),
        }
    }

    /// Current reference origin.
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    /// Incremented every time the origin moves.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rebase_distance(&self) -> f64 {
        self.rebase_distance
    }

    /// Asks for the origin to be moved to the eye on the next frame.
    pub fn request_rebase(&mut self) {
        self.rebase_requested = true;
    }

    /// Splits a world position against the current origin.
    pub fn split(&self, world: DVec3) -> SplitVec3 {
        split(world, self.origin)
    }

    /// Eye split for the frame in progress.
    pub fn eye(&self) -> SplitVec3 {
        self.eye_split
    }

    /// Eye position in world space for the frame in progress.
    pub fn eye_world(&self) -> DVec3 {
        self.eye
    }

    /// Re-splits the eye for a new frame. Called once, on the first cascade.
    ///
    /// Returns `true` when the origin was rebased.
    pub fn begin_frame(&mut self, eye: DVec3) -> bool {
        let rebased = self.rebase_requested || eye.distance(self.origin) > self.rebase_distance;
        if rebased {
            self.origin = eye;
            self.generation += 1;
            self.rebase_requested = false;
            log::debug!(
                "RTE origin rebased to ({:.3}, {:.3}, {:.3}), generation {}",
                eye.x,
                eye.y,
                eye.z,
                self.generation
            );
        }
        self.eye = eye;
        self.eye_split = split(eye, self.origin);
        rebased
    }
}
