//! Configuration options for terrascope.

use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::cascade::{validate_ranges, CascadeRange, DEFAULT_CASCADES};
use crate::coords::DEFAULT_REBASE_DISTANCE;
use crate::error::{Result, TerrascopeError};
use crate::targets::OutputKind;
use crate::tone_mapping::ToneMappingConfig;

/// Renderer configuration. Every field has a default, so partial JSON works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// MSAA sample count for the scene target (1 = off). Clamped to what the
    /// adapter supports.
    pub msaa_samples: u32,

    /// Tone mapping applied when compositing the scene.
    pub tone_mapping: ToneMappingConfig,

    /// Picking target size relative to the surface.
    pub picking_scale: f32,

    /// Depth target size relative to the surface.
    pub depth_scale: f32,

    /// Scene target size relative to the surface while a resize is in progress.
    pub resize_scale: f32,

    /// Time without resize events after which a resize counts as settled.
    pub resize_settle_ms: u64,

    /// Cascade ranges, near to far.
    pub cascades: Vec<CascadeRange>,

    /// Eye travel after which the RTE origin is rebased, in meters.
    pub rte_rebase_distance: f64,

    /// Scene clear color.
    pub background_color: Vec3,

    /// Output presented on startup.
    pub initial_output: OutputKind,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            msaa_samples: 4,
            tone_mapping: ToneMappingConfig::default(),
            picking_scale: 0.5,
            depth_scale: 0.5,
            resize_scale: 0.5,
            resize_settle_ms: 320,
            cascades: DEFAULT_CASCADES.to_vec(),
            rte_rebase_distance: DEFAULT_REBASE_DISTANCE,
            background_color: Vec3::ZERO,
            initial_output: OutputKind::Scene,
        }
    }
}

impl Options {
    /// Parses options from JSON and validates them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serializes the options as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks ranges and scale factors.
    pub fn validate(&self) -> Result<()> {
        validate_ranges(&self.cascades)?;
        self.tone_mapping.validate()?;
        for (name, scale) in [
            ("picking_scale", self.picking_scale),
            ("depth_scale", self.depth_scale),
            ("resize_scale", self.resize_scale),
        ] {
            if !(scale > 0.0 && scale <= 1.0) {
                return Err(TerrascopeError::InvalidOptions(format!(
                    "{name} must be in (0, 1], got {scale}"
                )));
            }
        }
        if self.msaa_samples == 0 {
            return Err(TerrascopeError::InvalidOptions(
                "msaa_samples must be at least 1".to_string(),
            ));
        }
        if !(self.rte_rebase_distance > 0.0) {
            return Err(TerrascopeError::InvalidOptions(
                "rte_rebase_distance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
