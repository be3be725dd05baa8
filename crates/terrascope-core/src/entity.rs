//! Entity categories and the per-cascade batch queue.

use serde::{Deserialize, Serialize};

/// Kind of geometry an entity batch draws.
///
/// Categories are drawn one after the other across every queued batch, so
/// blending order does not depend on how many batches are queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    PointCloud,
    MeshInstance,
    Billboard,
    Label,
    /// Rays, polylines and strips.
    Stroke,
}

impl EntityCategory {
    /// Scene draw order within a cascade.
    pub const DRAW_ORDER: [EntityCategory; 5] = [
        EntityCategory::PointCloud,
        EntityCategory::MeshInstance,
        EntityCategory::Billboard,
        EntityCategory::Label,
        EntityCategory::Stroke,
    ];

    /// Point clouds and mesh instances are drawn without blending.
    pub fn is_opaque(self) -> bool {
        matches!(self, Self::PointCloud | Self::MeshInstance)
    }
}

/// Which pass a draw call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Shaded color into the HDR scene target.
    Scene,
    /// Flat picking colors into the picking target.
    Picking,
    /// Cascade code and linear distance into the depth target.
    Depth,
}

/// Handle of a registered entity batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub usize);

/// Batches queued for drawing in the current cascade. Each batch is queued at
/// most once.
#[derive(Debug, Clone, Default)]
pub struct BatchQueue {
    queued: Vec<BatchId>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch. Returns `false` if it was already queued.
    pub fn enqueue(&mut self, id: BatchId) -> bool {
        if self.queued.contains(&id) {
            return false;
        }
        self.queued.push(id);
        true
    }

    pub fn as_slice(&self) -> &[BatchId] {
        &self.queued
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn remove(&mut self, id: BatchId) {
        self.queued.retain(|&q| q != id);
    }

    pub fn clear(&mut self) {
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_order() {
        assert_eq!(EntityCategory::DRAW_ORDER[0], EntityCategory::PointCloud);
        assert_eq!(EntityCategory::DRAW_ORDER[4], EntityCategory::Stroke);
        assert!(EntityCategory::MeshInstance.is_opaque());
        assert!(!EntityCategory::Label.is_opaque());
    }

    #[test]
    fn test_queue_dedups() {
        let mut queue = BatchQueue::new();
        assert!(queue.enqueue(BatchId(2)));
        assert!(queue.enqueue(BatchId(1)));
        assert!(!queue.enqueue(BatchId(2)));
        assert_eq!(queue.as_slice(), &[BatchId(2), BatchId(1)]);
        queue.remove(BatchId(2));
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }
}
