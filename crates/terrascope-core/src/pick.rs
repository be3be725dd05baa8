//! Picking color registry.
//!
//! Every pickable object is drawn into the picking target with a flat, unique
//! RGB color. Reading a pixel back and looking its color up here answers
//! "which object is under the pointer".

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Identifier of a pickable object, handed out by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// An RGB picking color. Black means "nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PickColor(pub [u8; 3]);

impl PickColor {
    /// The background color of the picking target.
    pub const NONE: PickColor = PickColor([0, 0, 0]);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    /// Reads the first three bytes of an RGBA texel.
    pub fn from_rgba(texel: [u8; 4]) -> Self {
        Self([texel[0], texel[1], texel[2]])
    }

    /// Color as normalized floats, for shader uniforms.
    pub fn to_unorm(self) -> [f32; 3] {
        let [r, g, b] = self.0;
        [
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
        ]
    }

    /// Color as a normalized RGBA quadruple with opaque alpha.
    pub fn to_unorm_rgba(self) -> [f32; 4] {
        let [r, g, b] = self.to_unorm();
        [r, g, b, 1.0]
    }
}

/// Bidirectional map between objects and their picking colors.
///
/// Owned by a single orchestrator; two renderers never share colors.
pub struct PickingRegistry<K> {
    forward: HashMap<K, PickColor>,
    backward: HashMap<PickColor, K>,
    rng: StdRng,
}

impl<K: Copy + Eq + Hash> Default for PickingRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash> PickingRegistry<K> {
    /// Creates an empty registry seeded from system entropy.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Creates an empty registry with a deterministic color sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            forward: HashMap::new(),
            backward: HashMap::new(),
            rng,
        }
    }

    /// Returns the color of `key`, assigning a fresh one if needed.
    ///
    /// Fresh colors are rejection-sampled until they are non-black and unused.
    pub fn assign(&mut self, key: K) -> PickColor {
        if let Some(&color) = self.forward.get(&key) {
            if !color.is_none() {
                return color;
            }
        }
        let color = loop {
            let candidate = PickColor(self.rng.gen());
            if !candidate.is_none() && !self.backward.contains_key(&candidate) {
                break candidate;
            }
        };
        self.forward.insert(key, color);
        self.backward.insert(color, key);
        color
    }

    /// Releases the color of `key`. Returns the released color, if any.
    pub fn release(&mut self, key: K) -> Option<PickColor> {
        let color = self.forward.remove(&key)?;
        self.backward.remove(&color);
        Some(color)
    }

    /// Finds the object drawn with `color`.
    pub fn lookup(&self, color: PickColor) -> Option<K> {
        if color.is_none() {
            return None;
        }
        self.backward.get(&color).copied()
    }

    /// Current color of `key`, without assigning.
    pub fn color_of(&self, key: K) -> Option<PickColor> {
        self.forward.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Drops every registration. Called on scene teardown.
    pub fn clear(&mut self) {
        self.forward.clear();
        self.backward.clear();
    }
}
