//! Interfaces between the frame orchestrator and the things it draws.
//!
//! Scene-graph nodes implement [`RenderNode`], per-object-type draw handlers
//! implement [`EntityBatch`], and one-off picking or depth draws register a
//! [`PassHook`]. All of them are generic over the [`FrameBackend`] so the same
//! collaborator can only be registered with an orchestrator whose GPU it
//! understands.

use std::any::Any;

use glam::DVec3;
use terrascope_core::{
    BatchId, BatchQueue, Cascade, EntityCategory, ObjectId, PassKind, PickColor, PickingRegistry,
    PlanetCamera, RefreshRequest, RteEncoder, SplitVec3,
};

use crate::backend::FrameBackend;
use crate::error::RenderResult;
use crate::uniforms::FrameUniforms;

/// Per-pass information handed to every draw call.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Monotonic frame counter.
    pub frame_index: u64,
    pub kind: PassKind,
    pub cascade: Cascade,
    /// The farthest cascade, drawn first.
    pub is_first_pass: bool,
    /// The nearest cascade, drawn last.
    pub is_last_pass: bool,
    /// Eye split against the current RTE origin.
    pub eye: SplitVec3,
    pub rte_origin: DVec3,
    /// Dynamic offset of this cascade in the frame uniform buffer.
    pub uniform_offset: u32,
    pub orthographic: bool,
}

impl FrameInfo {
    /// Value written into the cascade channel of the depth target.
    pub fn cascade_code(&self) -> u8 {
        self.cascade.code()
    }

    /// Same frame and cascade, different pass.
    pub fn with_kind(&self, kind: PassKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    pub(crate) fn new(
        frame_index: u64,
        cascade: &Cascade,
        is_first_pass: bool,
        is_last_pass: bool,
        rte: &RteEncoder,
        orthographic: bool,
    ) -> Self {
        Self {
            frame_index,
            kind: PassKind::Scene,
            cascade: cascade.clone(),
            is_first_pass,
            is_last_pass,
            eye: rte.eye(),
            rte_origin: rte.origin(),
            uniform_offset: FrameUniforms::offset(cascade.index),
            orthographic,
        }
    }
}

/// Orchestrator-owned state lent to collaborators.
pub struct SceneContext<'a> {
    pub camera: &'a PlanetCamera,
    pub picking: &'a mut PickingRegistry<ObjectId>,
    pub rte: &'a mut RteEncoder,
    pub refresh: &'a mut RefreshRequest,
    pub(crate) next_object_id: &'a mut u64,
}

impl SceneContext<'_> {
    /// Hands out an id no other object of this orchestrator uses.
    pub fn allocate_object_id(&mut self) -> ObjectId {
        let id = ObjectId(*self.next_object_id);
        *self.next_object_id += 1;
        id
    }

    /// Allocates an id and assigns it a picking color in one step.
    pub fn register_pickable(&mut self) -> (ObjectId, PickColor) {
        let id = self.allocate_object_id();
        (id, self.picking.assign(id))
    }

    /// Forces picking and depth passes on the next frame.
    pub fn request_refresh(&mut self) {
        self.refresh.mark();
    }
}

/// A scene-graph node.
///
/// Lifecycle: [`assign`](Self::assign) when added, [`initialize`](Self::initialize)
/// once GPU resources may be created, then per cascade
/// [`pre_draw_node`](Self::pre_draw_node) followed by
/// [`draw_node`](Self::draw_node), and [`remove`](Self::remove) when taken out.
pub trait RenderNode<B: FrameBackend> {
    /// Unique name within one orchestrator.
    fn name(&self) -> &str;

    /// Claims picking colors and object ids.
    fn assign(&mut self, _ctx: &mut SceneContext<'_>) {}

    /// Creates GPU resources.
    fn initialize(&mut self, _backend: &B, _ctx: &mut SceneContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Runs before any node draws in a cascade. Nodes queue the entity
    /// batches they want drawn in this cascade.
    fn pre_draw_node(
        &mut self,
        _backend: &B,
        _frame: &FrameInfo,
        _ctx: &mut SceneContext<'_>,
        _queue: &mut BatchQueue,
    ) {
    }

    /// Draws into the scene pass of one cascade.
    fn draw_node(&mut self, pass: &mut B::Pass<'_>, frame: &FrameInfo);

    /// Releases picking colors and anything else claimed in `assign`.
    fn remove(&mut self, _ctx: &mut SceneContext<'_>) {}
}

/// Draw handler for many entities of the same kind.
pub trait EntityBatch<B: FrameBackend>: Any {
    /// Categories this batch draws, in any order.
    fn categories(&self) -> &[EntityCategory];

    fn is_visible(&self) -> bool {
        true
    }

    /// Uploads whatever changed since the last frame. Runs at most once per
    /// frame, before the batch's first draw.
    fn prepare(&mut self, backend: &B, rte: &RteEncoder);

    /// Draws one category into the scene pass.
    fn draw(&self, category: EntityCategory, pass: &mut B::Pass<'_>, frame: &FrameInfo);

    /// Draws one category into the picking pass.
    fn draw_picking(&self, _category: EntityCategory, _pass: &mut B::Pass<'_>, _frame: &FrameInfo) {
    }

    /// Draws one category into the depth pass.
    fn draw_depth(&self, _category: EntityCategory, _pass: &mut B::Pass<'_>, _frame: &FrameInfo) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An extra draw into the picking or depth pass.
pub trait PassHook<B: FrameBackend> {
    fn draw(&mut self, pass: &mut B::Pass<'_>, frame: &FrameInfo);
}

/// Handle of a registered pass hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

pub(crate) struct HookEntry<B: FrameBackend> {
    pub id: CallbackId,
    pub owner: String,
    pub hook: Box<dyn PassHook<B>>,
}

pub(crate) struct BatchEntry<B: FrameBackend> {
    pub batch: Box<dyn EntityBatch<B>>,
    pub prepared_frame: Option<u64>,
}

/// Arena of entity batches addressed by [`BatchId`]. Slots of removed
/// batches are reused.
pub(crate) struct BatchArena<B: FrameBackend> {
    slots: Vec<Option<BatchEntry<B>>>,
}

impl<B: FrameBackend> Default for BatchArena<B> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<B: FrameBackend> BatchArena<B> {
    pub fn insert(&mut self, batch: Box<dyn EntityBatch<B>>) -> BatchId {
        let entry = BatchEntry {
            batch,
            prepared_frame: None,
        };
        if let Some(free) = self.slots.iter().position(Option::is_none) {
            self.slots[free] = Some(entry);
            BatchId(free)
        } else {
            self.slots.push(Some(entry));
            BatchId(self.slots.len() - 1)
        }
    }

    pub fn remove(&mut self, id: BatchId) -> Option<Box<dyn EntityBatch<B>>> {
        self.slots.get_mut(id.0)?.take().map(|entry| entry.batch)
    }

    pub fn get(&self, id: BatchId) -> Option<&BatchEntry<B>> {
        self.slots.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: BatchId) -> Option<&mut BatchEntry<B>> {
        self.slots.get_mut(id.0)?.as_mut()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
