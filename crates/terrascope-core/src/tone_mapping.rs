//! Tone mapping of the HDR scene target.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TerrascopeError};

/// Exposure, extended-Reinhard white point and display gamma.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMappingConfig {
    pub exposure: f32,
    /// Scene luminance (after exposure) that maps to full white.
    pub white_level: f32,
    pub gamma: f32,
}

impl Default for ToneMappingConfig {
    fn default() -> Self {
        Self {
            exposure: 3.01,
            white_level: 1.0,
            gamma: 2.2,
        }
    }
}

impl ToneMappingConfig {
    pub fn new(exposure: f32, white_level: f32, gamma: f32) -> Self {
        Self {
            exposure,
            white_level,
            gamma,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("exposure", self.exposure),
            ("white_level", self.white_level),
            ("gamma", self.gamma),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(TerrascopeError::InvalidOptions(format!(
                    "tone_mapping.{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// CPU version of the curve the tone-mapping shader applies to one
    /// channel.
    pub fn map_channel(&self, hdr: f32) -> f32 {
        let c = hdr * self.exposure;
        let white_sq = (self.white_level * self.white_level).max(1e-6);
        let mapped = c * (1.0 + c / white_sq) / (1.0 + c);
        mapped.max(0.0).powf(1.0 / self.gamma)
    }
}
