//! Dense per-instance attribute arrays with dirty tracking.
//!
//! Instanced draws read attribute `i` of every buffer for instance `i`, so the
//! arrays must stay congruent and hole-free. Removal splices every array and
//! re-indexes the instances behind the removed one; handles stay valid.

use std::collections::HashMap;

use glam::{DVec3, Quat, Vec3};

use crate::coords::{RteEncoder, SplitVec3};

/// Stable handle of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

/// Per-instance attribute, one GPU buffer each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceAttribute {
    Position,
    Rotation,
    Scale,
    Color,
    Visibility,
}

impl InstanceAttribute {
    pub const ALL: [InstanceAttribute; 5] = [
        InstanceAttribute::Position,
        InstanceAttribute::Rotation,
        InstanceAttribute::Scale,
        InstanceAttribute::Color,
        InstanceAttribute::Visibility,
    ];

    fn bit(self) -> u8 {
        match self {
            Self::Position => 1,
            Self::Rotation => 1 << 1,
            Self::Scale => 1 << 2,
            Self::Color => 1 << 3,
            Self::Visibility => 1 << 4,
        }
    }

    /// Bytes per instance in the attribute's buffer.
    pub fn stride(self) -> usize {
        match self {
            Self::Position => std::mem::size_of::<RtePosition>(),
            Self::Rotation | Self::Color => std::mem::size_of::<[f32; 4]>(),
            Self::Scale => std::mem::size_of::<[f32; 3]>(),
            Self::Visibility => std::mem::size_of::<f32>(),
        }
    }
}

/// RTE-split position as stored in the position buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RtePosition {
    pub high: [f32; 3],
    pub low: [f32; 3],
}

impl From<SplitVec3> for RtePosition {
    fn from(split: SplitVec3) -> Self {
        Self {
            high: split.high.to_array(),
            low: split.low.to_array(),
        }
    }
}

/// Initial attributes of a new instance.
#[derive(Debug, Clone, Copy)]
pub struct Instance {
    pub position: DVec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub color: [f32; 4],
    pub visible: bool,
}

impl Default for Instance {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            color: [1.0; 4],
            visible: true,
        }
    }
}

/// Arena of instances drawn with one instanced draw call.
#[derive(Debug, Clone, Default)]
pub struct InstanceBatch {
    world_positions: Vec<DVec3>,
    positions: Vec<RtePosition>,
    rotations: Vec<[f32; 4]>,
    scales: Vec<[f32; 3]>,
    colors: Vec<[f32; 4]>,
    visibility: Vec<f32>,
    handles: Vec<InstanceHandle>,
    index_of: HashMap<InstanceHandle, usize>,
    next_handle: u64,
    dirty: u8,
    rte_generation: u64,
}

impl InstanceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Dense index of an instance.
    pub fn index_of(&self, handle: InstanceHandle) -> Option<usize> {
        self.index_of.get(&handle).copied()
    }

    /// Handle stored at a dense index.
    pub fn handle_at(&self, index: usize) -> Option<InstanceHandle> {
        self.handles.get(index).copied()
    }

    pub fn world_position(&self, handle: InstanceHandle) -> Option<DVec3> {
        self.index_of(handle).map(|i| self.world_positions[i])
    }

    /// Marks an attribute dirty. Returns `true` when the batch was clean
    /// before, i.e. when the caller should enqueue it for upload.
    fn mark(&mut self, attribute: InstanceAttribute) -> bool {
        let was_clean = self.dirty == 0;
        self.dirty |= attribute.bit();
        was_clean
    }

    fn mark_all(&mut self) -> bool {
        let was_clean = self.dirty == 0;
        for attribute in InstanceAttribute::ALL {
            self.dirty |= attribute.bit();
        }
        was_clean
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty != 0
    }

    pub fn is_attribute_dirty(&self, attribute: InstanceAttribute) -> bool {
        self.dirty & attribute.bit() != 0
    }

    /// Appends an instance. Every buffer grows, so every attribute is dirty.
    ///
    /// Existing positions are re-split first when the origin moved, so the
    /// whole batch shares the origin of `rte`.
    pub fn add(&mut self, instance: Instance, rte: &RteEncoder) -> InstanceHandle {
        self.rebase(rte);
        let handle = InstanceHandle(self.next_handle);
        self.next_handle += 1;
        self.index_of.insert(handle, self.handles.len());
        self.handles.push(handle);
        self.world_positions.push(instance.position);
        self.positions.push(rte.split(instance.position).into());
        self.rotations.push(instance.rotation.to_array());
        self.scales.push(instance.scale.to_array());
        self.colors.push(instance.color);
        self.visibility.push(if instance.visible { 1.0 } else { 0.0 });
        self.mark_all();
        handle
    }

    /// Removes an instance, compacting every array and re-indexing the
    /// instances that followed it.
    pub fn remove(&mut self, handle: InstanceHandle) -> bool {
        let Some(index) = self.index_of.remove(&handle) else {
            return false;
        };
        self.handles.remove(index);
        self.world_positions.remove(index);
        self.positions.remove(index);
        self.rotations.remove(index);
        self.scales.remove(index);
        self.colors.remove(index);
        self.visibility.remove(index);
        for (i, moved) in self.handles.iter().enumerate().skip(index) {
            self.index_of.insert(*moved, i);
        }
        self.mark_all();
        true
    }

    /// Moves an instance. Returns `Some(true)` when the batch needs enqueueing.
    pub fn set_position(
        &mut self,
        handle: InstanceHandle,
        position: DVec3,
        rte: &RteEncoder,
    ) -> Option<bool> {
        let i = self.index_of(handle)?;
        self.world_positions[i] = position;
        self.positions[i] = rte.split(position).into();
        Some(self.mark(InstanceAttribute::Position))
    }

    pub fn set_rotation(&mut self, handle: InstanceHandle, rotation: Quat) -> Option<bool> {
        let i = self.index_of(handle)?;
        self.rotations[i] = rotation.to_array();
        Some(self.mark(InstanceAttribute::Rotation))
    }

    pub fn set_scale(&mut self, handle: InstanceHandle, scale: Vec3) -> Option<bool> {
        let i = self.index_of(handle)?;
        self.scales[i] = scale.to_array();
        Some(self.mark(InstanceAttribute::Scale))
    }

    pub fn set_color(&mut self, handle: InstanceHandle, color: [f32; 4]) -> Option<bool> {
        let i = self.index_of(handle)?;
        self.colors[i] = color;
        Some(self.mark(InstanceAttribute::Color))
    }

    pub fn set_visible(&mut self, handle: InstanceHandle, visible: bool) -> Option<bool> {
        let i = self.index_of(handle)?;
        self.visibility[i] = if visible { 1.0 } else { 0.0 };
        Some(self.mark(InstanceAttribute::Visibility))
    }

    /// Re-splits every position if the RTE origin moved since the last split.
    pub fn rebase(&mut self, rte: &RteEncoder) -> bool {
        if self.rte_generation == rte.generation() {
            return false;
        }
        self.rte_generation = rte.generation();
        for (split, world) in self.positions.iter_mut().zip(&self.world_positions) {
            *split = rte.split(*world).into();
        }
        if !self.positions.is_empty() {
            self.mark(InstanceAttribute::Position);
        }
        true
    }

    /// Raw bytes of one attribute buffer.
    pub fn attribute_bytes(&self, attribute: InstanceAttribute) -> &[u8] {
        match attribute {
            InstanceAttribute::Position => bytemuck::cast_slice(&self.positions),
            InstanceAttribute::Rotation => bytemuck::cast_slice(&self.rotations),
            InstanceAttribute::Scale => bytemuck::cast_slice(&self.scales),
            InstanceAttribute::Color => bytemuck::cast_slice(&self.colors),
            InstanceAttribute::Visibility => bytemuck::cast_slice(&self.visibility),
        }
    }

    /// Takes the dirty set. Each returned attribute needs exactly one upload,
    /// however many mutations happened since the last call.
    pub fn take_dirty(&mut self) -> Vec<InstanceAttribute> {
        let dirty = std::mem::take(&mut self.dirty);
        InstanceAttribute::ALL
            .into_iter()
            .filter(|a| dirty & a.bit() != 0)
            .collect()
    }
}
