//! Framebuffer identities and sizing rules.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrascopeError};
use crate::options::Options;

/// Width and height of a surface or target, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either side is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Scales both sides, keeping at least one pixel per side.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn scaled(self, factor: f32) -> Self {
        let scale = |v: u32| ((v as f32 * factor).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }
}

/// The offscreen framebuffers owned by the frame targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetId {
    /// HDR scene color and depth, possibly multisampled.
    Scene,
    /// Single-sample copy of the scene when MSAA is on.
    Resolve,
    /// Tone-mapped scene, ready for presentation.
    ToneMapped,
    /// Low-resolution picking colors with their own depth buffer.
    Picking,
    /// Cascade codes, linear distances and a depth buffer.
    Depth,
    /// Visualization of the depth target.
    Debug,
}

/// Which target is shown on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputKind {
    /// The tone-mapped scene.
    #[default]
    #[serde(rename = "screen")]
    Scene,
    /// The picking colors.
    #[serde(rename = "picking")]
    Picking,
    /// Linear distance as grayscale.
    #[serde(rename = "depth")]
    Depth,
    /// One color per cascade.
    #[serde(rename = "frustum")]
    Cascade,
}

impl OutputKind {
    pub const ALL: [OutputKind; 4] = [
        OutputKind::Scene,
        OutputKind::Picking,
        OutputKind::Depth,
        OutputKind::Cascade,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Scene => "screen",
            Self::Picking => "picking",
            Self::Depth => "depth",
            Self::Cascade => "frustum",
        }
    }

    /// Parses an output name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| TerrascopeError::UnknownOutput(name.to_string()))
    }

    /// Whether presenting this output needs the debug visualization pass.
    pub fn needs_debug_pass(self) -> bool {
        matches!(self, Self::Depth | Self::Cascade)
    }
}

/// Whether the surface is still being dragged to a new size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePhase {
    #[default]
    Settled,
    InProgress,
}

/// Sizes of every target for one surface size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetSizes {
    pub surface: Extent,
    /// Scene, resolve, tone-mapped and debug targets.
    pub scene: Extent,
    pub picking: Extent,
    pub depth: Extent,
}

impl TargetSizes {
    /// Derives target sizes from the surface size and options.
    pub fn for_surface(surface: Extent, phase: ResizePhase, options: &Options) -> Self {
        let scene = match phase {
            ResizePhase::Settled => surface,
            ResizePhase::InProgress => surface.scaled(options.resize_scale),
        };
        Self {
            surface,
            scene,
            picking: surface.scaled(options.picking_scale),
            depth: surface.scaled(options.depth_scale),
        }
    }

    pub fn get(&self, target: TargetId) -> Extent {
        match target {
            TargetId::Scene | TargetId::Resolve | TargetId::ToneMapped | TargetId::Debug => {
                self.scene
            }
            TargetId::Picking => self.picking,
            TargetId::Depth => self.depth,
        }
    }
}

/// Turns a stream of resize events into a gesture with a settled end.
///
/// Every resize restarts the settle timer. Once no resize arrived for the
/// settle delay, [`poll`](Self::poll) reports the final size exactly once.
#[derive(Debug, Clone)]
pub struct ResizeDebounce {
    settle_delay: Duration,
    pending: Option<(Extent, Instant)>,
}

impl ResizeDebounce {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            pending: None,
        }
    }

    /// Records a resize event.
    pub fn on_resize(&mut self, size: Extent, now: Instant) -> ResizePhase {
        self.pending = Some((size, now));
        ResizePhase::InProgress
    }

    pub fn is_resizing(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns the settled size once the delay has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Extent> {
        let (size, last) = self.pending?;
        if now.saturating_duration_since(last) >= self.settle_delay {
            self.pending = None;
            Some(size)
        } else {
            None
        }
    }
}
