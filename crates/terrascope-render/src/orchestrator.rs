//! The per-frame multi-pass driver.
//!
//! One call to [`FrameOrchestrator::draw`] walks the camera's cascades from
//! the farthest to the nearest. In every cascade it lets nodes queue entity
//! batches, draws nodes and batches into the scene target, and, when the
//! pointer hovered or a refresh was requested, draws the picking and depth
//! targets as well. After the last cascade the scene is resolved, tone mapped
//! and presented, and the picking and depth targets are copied into transfer
//! buffers whose mapping is polled on later frames.

use glam::{DVec2, DVec3};
use terrascope_core::depth::{sample_distance, sample_world_position};
use terrascope_core::{
    BatchId, BatchQueue, EntityCategory, Extent, InputState, ObjectId, Options, OutputKind,
    PassKind, PickColor, PickingRegistry, PixelBuffer, PixelFormat, PlanetCamera, ReadbackSlot,
    ReadbackStats, RefreshRequest, ResizePhase, RteEncoder, TargetId, TargetSizes,
    TerrascopeError, ToneMappingConfig,
};

use crate::backend::{FrameBackend, PassLoad};
use crate::error::RenderResult;
use crate::scene::{
    BatchArena, CallbackId, EntityBatch, FrameInfo, HookEntry, PassHook, RenderNode, SceneContext,
};
use crate::uniforms::FrameUniforms;

/// What a call to [`FrameOrchestrator::draw`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was recorded and submitted.
    Drawn {
        /// Whether picking and depth passes ran.
        refreshed: bool,
    },
    /// The surface has zero area; nothing was drawn.
    Suspended,
    /// Targets could not be created; waiting for a successful resize.
    Halted,
}

/// Drives frames over a [`FrameBackend`].
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    options: Options,
    camera: PlanetCamera,
    rte: RteEncoder,
    picking: PickingRegistry<ObjectId>,
    next_object_id: u64,
    input: InputState,
    refresh: RefreshRequest,
    nodes: Vec<Box<dyn RenderNode<B>>>,
    running: bool,
    batches: BatchArena<B>,
    queue: BatchQueue,
    picking_hooks: Vec<HookEntry<B>>,
    depth_hooks: Vec<HookEntry<B>>,
    next_callback_id: u64,
    picking_slot: ReadbackSlot<()>,
    depth_slot: ReadbackSlot<PlanetCamera>,
    output: OutputKind,
    surface: Extent,
    phase: ResizePhase,
    sizes: TargetSizes,
    halted: bool,
    frame_index: u64,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    /// Creates an orchestrator and sizes its targets for `surface`.
    ///
    /// A zero-sized surface is accepted; frames stay suspended until
    /// [`resize`](Self::resize) reports a real size.
    pub fn new(backend: B, options: Options, surface: Extent) -> RenderResult<Self> {
        options.validate()?;
        let mut camera = PlanetCamera::new(options.cascades.clone());
        camera.set_viewport(surface.width, surface.height);
        let mut orchestrator = Self {
            backend,
            rte: RteEncoder::new(options.rte_rebase_distance),
            output: options.initial_output,
            options,
            camera,
            picking: PickingRegistry::new(),
            next_object_id: 1,
            input: InputState::new(),
            refresh: RefreshRequest::default(),
            nodes: Vec::new(),
            running: false,
            batches: BatchArena::default(),
            queue: BatchQueue::new(),
            picking_hooks: Vec::new(),
            depth_hooks: Vec::new(),
            next_callback_id: 0,
            picking_slot: ReadbackSlot::new("picking", &[PixelFormat::Rgba8]),
            depth_slot: ReadbackSlot::new("depth", &[PixelFormat::Rgba8, PixelFormat::R32Float]),
            surface: Extent::default(),
            phase: ResizePhase::Settled,
            sizes: TargetSizes::default(),
            halted: false,
            frame_index: 0,
        };
        orchestrator.apply_size(surface, ResizePhase::Settled)?;
        log::info!(
            "frame orchestrator ready: {}x{}, {} cascades, {}x MSAA",
            surface.width,
            surface.height,
            orchestrator.camera.cascades().len(),
            orchestrator.backend.msaa_samples()
        );
        Ok(orchestrator)
    }

    // ========== Sizing ==========

    /// Resizes every target to full resolution.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.apply_size(Extent::new(width, height), ResizePhase::Settled)
    }

    /// Resizes while the user is still dragging the window edge. The scene
    /// target drops to the resize scale until [`resize`](Self::resize) is
    /// called with the settled size.
    pub fn resize_in_progress(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.apply_size(Extent::new(width, height), ResizePhase::InProgress)
    }

    fn apply_size(&mut self, surface: Extent, phase: ResizePhase) -> RenderResult<()> {
        self.surface = surface;
        self.phase = phase;
        if surface.is_empty() {
            log::debug!("surface is {}x{}, frames suspended", surface.width, surface.height);
            return Ok(());
        }
        let sizes = TargetSizes::for_surface(surface, phase, &self.options);
        if sizes == self.sizes && !self.halted {
            return Ok(());
        }
        self.camera.set_viewport(surface.width, surface.height);
        self.picking_slot
            .resize(sizes.picking.width, sizes.picking.height);
        self.depth_slot.resize(sizes.depth.width, sizes.depth.height);
        match self.backend.resize_targets(&sizes) {
            Ok(()) => {
                if self.halted {
                    log::info!("frame targets recreated, resuming");
                }
                self.halted = false;
                self.sizes = sizes;
                Ok(())
            }
            Err(e) => {
                if !self.halted {
                    log::error!("failed to create frame targets: {e}");
                }
                self.halted = true;
                self.sizes = TargetSizes::default();
                Err(e)
            }
        }
    }

    /// Whether the caller should schedule another frame.
    pub fn wants_frame(&self) -> bool {
        !self.surface.is_empty() && !self.halted
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn surface_size(&self) -> Extent {
        self.surface
    }

    pub fn resize_phase(&self) -> ResizePhase {
        self.phase
    }

    pub fn target_sizes(&self) -> &TargetSizes {
        &self.sizes
    }

    // ========== Frame ==========

    /// Draws one frame.
    pub fn draw(&mut self) -> RenderResult<FrameOutcome> {
        if self.halted {
            return Ok(FrameOutcome::Halted);
        }
        if self.surface.is_empty() {
            return Ok(FrameOutcome::Suspended);
        }
        self.poll_readbacks();
        if !self.running {
            self.initialize_nodes()?;
            self.running = true;
        }

        let refresh = self.refresh.take() | self.input.wants_refresh();
        let result = self.record_frame(refresh);
        if result.is_err() {
            self.picking_slot.abandon();
            self.depth_slot.abandon();
        }
        self.queue.clear();
        self.input.end_frame();
        self.frame_index += 1;
        result.map(|()| FrameOutcome::Drawn { refreshed: refresh })
    }

    fn record_frame(&mut self, refresh: bool) -> RenderResult<()> {
        self.backend.begin_frame()?;

        let orthographic = self.camera.is_orthographic();
        let passes: Vec<_> = self
            .camera
            .iter_cascades()
            .map(|pass| (pass.cascade.clone(), pass.is_first_pass, pass.is_last_pass))
            .collect();

        for (cascade, is_first_pass, is_last_pass) in &passes {
            if *is_first_pass {
                self.rte.begin_frame(self.camera.eye());
                let uniforms: Vec<FrameUniforms> = self
                    .camera
                    .cascades()
                    .iter()
                    .map(|c| FrameUniforms::new(c, self.rte.eye(), self.sizes.scene))
                    .collect();
                self.backend.upload_frame_uniforms(&uniforms);
            }
            let frame = FrameInfo::new(
                self.frame_index,
                cascade,
                *is_first_pass,
                *is_last_pass,
                &self.rte,
                orthographic,
            );

            self.pre_draw(&frame);
            self.prepare_queued();
            self.draw_scene_pass(&frame)?;
            if refresh {
                self.draw_hooked_pass(&frame.with_kind(PassKind::Picking))?;
                self.draw_hooked_pass(&frame.with_kind(PassKind::Depth))?;
            }
            self.queue.clear();
        }

        self.backend.resolve_scene();
        self.backend.tone_map(&self.options.tone_mapping);
        if self.output.needs_debug_pass() {
            self.backend.visualize_depth(self.output);
        }
        self.backend.present(self.output)?;

        let picking_started = refresh && self.picking_slot.try_begin((), self.frame_index);
        if picking_started {
            self.backend.copy_to_transfer(TargetId::Picking)?;
        }
        let depth_started =
            refresh && self.depth_slot.try_begin(self.camera.clone(), self.frame_index);
        if depth_started {
            self.backend.copy_to_transfer(TargetId::Depth)?;
        }

        self.backend.submit()?;

        if picking_started {
            match self.backend.map_transfer(TargetId::Picking) {
                Ok(pending) => self.picking_slot.arm(pending),
                Err(e) => {
                    log::warn!("could not map picking transfer buffer: {e}");
                    self.picking_slot.abandon();
                }
            }
        }
        if depth_started {
            match self.backend.map_transfer(TargetId::Depth) {
                Ok(pending) => self.depth_slot.arm(pending),
                Err(e) => {
                    log::warn!("could not map depth transfer buffer: {e}");
                    self.depth_slot.abandon();
                }
            }
        }
        Ok(())
    }

    fn initialize_nodes(&mut self) -> RenderResult<()> {
        let mut ctx = SceneContext {
            camera: &self.camera,
            picking: &mut self.picking,
            rte: &mut self.rte,
            refresh: &mut self.refresh,
            next_object_id: &mut self.next_object_id,
        };
        for node in &mut self.nodes {
            node.initialize(&self.backend, &mut ctx)?;
        }
        Ok(())
    }

    fn pre_draw(&mut self, frame: &FrameInfo) {
        let mut ctx = SceneContext {
            camera: &self.camera,
            picking: &mut self.picking,
            rte: &mut self.rte,
            refresh: &mut self.refresh,
            next_object_id: &mut self.next_object_id,
        };
        for node in &mut self.nodes {
            node.pre_draw_node(&self.backend, frame, &mut ctx, &mut self.queue);
        }
    }

    /// Runs `prepare` on queued batches that have not been prepared this frame.
    fn prepare_queued(&mut self) {
        for &id in self.queue.as_slice() {
            let Some(entry) = self.batches.get_mut(id) else {
                log::warn!("batch {} was queued but is not registered", id.0);
                continue;
            };
            if entry.prepared_frame != Some(self.frame_index) {
                entry.batch.prepare(&self.backend, &self.rte);
                entry.prepared_frame = Some(self.frame_index);
            }
        }
    }

    fn draw_scene_pass(&mut self, frame: &FrameInfo) -> RenderResult<()> {
        let load = if frame.is_first_pass {
            let bg = self.options.background_color.as_dvec3();
            PassLoad::clear([bg.x, bg.y, bg.z, 1.0])
        } else {
            PassLoad::keep_color()
        };
        let mut pass = self.backend.begin_pass(TargetId::Scene, load)?;
        for node in &mut self.nodes {
            node.draw_node(&mut pass, frame);
        }
        draw_batches(&self.batches, &self.queue, &mut pass, frame);
        Ok(())
    }

    /// Picking or depth pass. Color is cleared only before the farthest
    /// cascade; depth is cleared in every cascade so nearer geometry drawn
    /// later overwrites farther geometry.
    fn draw_hooked_pass(&mut self, frame: &FrameInfo) -> RenderResult<()> {
        let (target, hooks) = match frame.kind {
            PassKind::Picking => (TargetId::Picking, &mut self.picking_hooks),
            PassKind::Depth => (TargetId::Depth, &mut self.depth_hooks),
            PassKind::Scene => return Ok(()),
        };
        let load = if frame.is_first_pass {
            PassLoad::clear(PassLoad::BLACK)
        } else {
            PassLoad::keep_color()
        };
        let mut pass = self.backend.begin_pass(target, load)?;
        for entry in hooks.iter_mut() {
            entry.hook.draw(&mut pass, frame);
        }
        draw_batches(&self.batches, &self.queue, &mut pass, frame);
        Ok(())
    }

    fn poll_readbacks(&mut self) {
        self.backend.poll_device();
        let backend = &mut self.backend;
        if let Err(e) = self
            .picking_slot
            .poll(|images| backend.read_transfer(TargetId::Picking, images))
        {
            log::warn!("picking readback failed: {e}");
        }
        if let Err(e) = self
            .depth_slot
            .poll(|images| backend.read_transfer(TargetId::Depth, images))
        {
            log::warn!("depth readback failed: {e}");
        }
    }

    // ========== Refresh and input ==========

    /// Forces picking and depth passes on the next frame.
    pub fn mark_for_depth_refresh(&mut self) {
        self.refresh.mark();
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    // ========== Queries ==========

    /// Maps surface pixels to normalized coordinates, `None` outside.
    fn normalized(&self, x: f64, y: f64) -> Option<DVec2> {
        if self.surface.is_empty() {
            return None;
        }
        let n = DVec2::new(
            x / f64::from(self.surface.width),
            y / f64::from(self.surface.height),
        );
        ((0.0..1.0).contains(&n.x) && (0.0..1.0).contains(&n.y)).then_some(n)
    }

    /// Picking color under a surface pixel from the latest completed readback.
    /// Black means nothing pickable was drawn there.
    pub fn read_picking_color_at(&self, x: f64, y: f64) -> Option<PickColor> {
        let normalized = self.normalized(x, y)?;
        pick_color_at(self.picking_slot.latest()?.images, normalized)
    }

    /// Object under a surface pixel.
    pub fn picked_object_at(&self, x: f64, y: f64) -> Option<ObjectId> {
        self.picking.lookup(self.read_picking_color_at(x, y)?)
    }

    /// Distance from the eye to the surface under a pixel, along the view ray.
    pub fn sample_distance_at(&self, x: f64, y: f64) -> Option<f64> {
        let normalized = self.normalized(x, y)?;
        let latest = self.depth_slot.latest()?;
        let [codes, distances] = latest.images else {
            return None;
        };
        let image = terrascope_core::DepthImage::new(codes, distances);
        sample_distance(latest.meta, &image, normalized)
    }

    /// World position of the surface under a pixel.
    pub fn world_position_at(&self, x: f64, y: f64) -> Option<DVec3> {
        let normalized = self.normalized(x, y)?;
        let latest = self.depth_slot.latest()?;
        let [codes, distances] = latest.images else {
            return None;
        };
        let image = terrascope_core::DepthImage::new(codes, distances);
        sample_world_position(latest.meta, &image, normalized)
    }

    /// Resolves with the picking color under a pixel once the next picking
    /// readback completes. Forces a refresh on the next frame.
    pub fn read_picking_color_at_async(
        &mut self,
        x: f64,
        y: f64,
        callback: impl FnOnce(Option<PickColor>) + 'static,
    ) {
        let normalized = self.normalized(x, y);
        self.refresh.mark();
        self.picking_slot.on_next_complete(Box::new(move |done| {
            callback(normalized.and_then(|n| pick_color_at(done.images, n)));
        }));
    }

    /// Resolves with the distance under a pixel once the next depth readback
    /// completes. Forces a refresh on the next frame.
    pub fn sample_distance_at_async(
        &mut self,
        x: f64,
        y: f64,
        callback: impl FnOnce(Option<f64>) + 'static,
    ) {
        let normalized = self.normalized(x, y);
        self.refresh.mark();
        self.depth_slot.on_next_complete(Box::new(move |done| {
            let distance = match (normalized, done.images) {
                (Some(n), [codes, distances]) => {
                    let image = terrascope_core::DepthImage::new(codes, distances);
                    sample_distance(done.meta, &image, n)
                }
                _ => None,
            };
            callback(distance);
        }));
    }

    /// Resolves with the world position under a pixel once the next depth
    /// readback completes. Forces a refresh on the next frame.
    pub fn world_position_at_async(
        &mut self,
        x: f64,
        y: f64,
        callback: impl FnOnce(Option<DVec3>) + 'static,
    ) {
        let normalized = self.normalized(x, y);
        self.refresh.mark();
        self.depth_slot.on_next_complete(Box::new(move |done| {
            let position = match (normalized, done.images) {
                (Some(n), [codes, distances]) => {
                    let image = terrascope_core::DepthImage::new(codes, distances);
                    sample_world_position(done.meta, &image, n)
                }
                _ => None,
            };
            callback(position);
        }));
    }

    pub fn picking_stats(&self) -> ReadbackStats {
        self.picking_slot.stats()
    }

    pub fn depth_stats(&self) -> ReadbackStats {
        self.depth_slot.stats()
    }

    // ========== Output ==========

    pub fn active_output(&self) -> OutputKind {
        self.output
    }

    pub fn set_active_output(&mut self, output: OutputKind) {
        if output != self.output {
            log::debug!("presenting {}", output.name());
            self.output = output;
        }
    }

    /// Selects the presented output by name (`"screen"`, `"picking"`,
    /// `"depth"` or `"frustum"`).
    pub fn set_active_output_by_name(&mut self, name: &str) -> RenderResult<()> {
        self.set_active_output(OutputKind::from_name(name)?);
        Ok(())
    }

    pub fn tone_mapping(&self) -> &ToneMappingConfig {
        &self.options.tone_mapping
    }

    pub fn set_tone_mapping(&mut self, config: ToneMappingConfig) {
        self.options.tone_mapping = config;
    }

    // ========== Nodes ==========

    fn context(&mut self) -> SceneContext<'_> {
        SceneContext {
            camera: &self.camera,
            picking: &mut self.picking,
            rte: &mut self.rte,
            refresh: &mut self.refresh,
            next_object_id: &mut self.next_object_id,
        }
    }

    /// Lends the picking registry, RTE encoder and refresh flag outside of a
    /// frame.
    pub fn scene_context(&mut self) -> SceneContext<'_> {
        self.context()
    }

    fn node_index(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.node_index(name).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Appends a node. Nodes draw in insertion order.
    pub fn add_node(&mut self, node: Box<dyn RenderNode<B>>) -> RenderResult<()> {
        let index = self.nodes.len();
        self.insert_node(index, node)
    }

    /// Inserts a node so it draws right before the node called `before`.
    pub fn add_node_before(
        &mut self,
        node: Box<dyn RenderNode<B>>,
        before: &str,
    ) -> RenderResult<()> {
        let Some(index) = self.node_index(before) else {
            log::warn!("cannot add node '{}': no node named '{before}'", node.name());
            return Err(TerrascopeError::NodeNotFound(before.to_string()).into());
        };
        self.insert_node(index, node)
    }

    fn insert_node(&mut self, index: usize, mut node: Box<dyn RenderNode<B>>) -> RenderResult<()> {
        let name = node.name().to_string();
        if self.has_node(&name) {
            log::warn!("node '{name}' already exists");
            return Err(TerrascopeError::NodeExists(name).into());
        }
        let running = self.running;
        let mut ctx = SceneContext {
            camera: &self.camera,
            picking: &mut self.picking,
            rte: &mut self.rte,
            refresh: &mut self.refresh,
            next_object_id: &mut self.next_object_id,
        };
        node.assign(&mut ctx);
        if running {
            if let Err(e) = node.initialize(&self.backend, &mut ctx) {
                node.remove(&mut ctx);
                return Err(e);
            }
        }
        log::debug!("added node '{name}'");
        self.nodes.insert(index, node);
        Ok(())
    }

    /// Removes a node and lets it release what it claimed.
    pub fn remove_node(&mut self, name: &str) -> Option<Box<dyn RenderNode<B>>> {
        let index = self.node_index(name)?;
        let mut node = self.nodes.remove(index);
        node.remove(&mut self.context());
        log::debug!("removed node '{name}'");
        Some(node)
    }

    // ========== Entity batches ==========

    pub fn add_entity_batch(&mut self, batch: Box<dyn EntityBatch<B>>) -> BatchId {
        self.batches.insert(batch)
    }

    pub fn remove_entity_batch(&mut self, id: BatchId) -> Option<Box<dyn EntityBatch<B>>> {
        self.queue.remove(id);
        self.batches.remove(id)
    }

    pub fn entity_batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Borrows a registered batch as its concrete type.
    pub fn entity_batch<T: EntityBatch<B>>(&self, id: BatchId) -> Option<&T> {
        self.batches.get(id)?.batch.as_any().downcast_ref()
    }

    /// Mutably borrows a registered batch as its concrete type.
    pub fn entity_batch_mut<T: EntityBatch<B>>(&mut self, id: BatchId) -> Option<&mut T> {
        self.batches.get_mut(id)?.batch.as_any_mut().downcast_mut()
    }

    // ========== Pass hooks ==========

    fn next_callback(&mut self) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        id
    }

    /// Registers extra draw work for the picking pass.
    pub fn add_picking_callback(
        &mut self,
        owner: impl Into<String>,
        hook: Box<dyn PassHook<B>>,
    ) -> CallbackId {
        let id = self.next_callback();
        self.picking_hooks.push(HookEntry {
            id,
            owner: owner.into(),
            hook,
        });
        id
    }

    pub fn remove_picking_callback(&mut self, id: CallbackId) -> bool {
        remove_hook(&mut self.picking_hooks, id)
    }

    /// Registers extra draw work for the depth pass.
    pub fn add_depth_callback(
        &mut self,
        owner: impl Into<String>,
        hook: Box<dyn PassHook<B>>,
    ) -> CallbackId {
        let id = self.next_callback();
        self.depth_hooks.push(HookEntry {
            id,
            owner: owner.into(),
            hook,
        });
        id
    }

    pub fn remove_depth_callback(&mut self, id: CallbackId) -> bool {
        remove_hook(&mut self.depth_hooks, id)
    }

    /// Removes every hook registered by `owner`.
    pub fn remove_callbacks_of(&mut self, owner: &str) -> usize {
        let before = self.picking_hooks.len() + self.depth_hooks.len();
        self.picking_hooks.retain(|h| h.owner != owner);
        self.depth_hooks.retain(|h| h.owner != owner);
        before - self.picking_hooks.len() - self.depth_hooks.len()
    }

    // ========== Accessors ==========

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn camera(&self) -> &PlanetCamera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut PlanetCamera {
        &mut self.camera
    }

    pub fn rte(&self) -> &RteEncoder {
        &self.rte
    }

    pub fn picking_registry(&self) -> &PickingRegistry<ObjectId> {
        &self.picking
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Removes every node, batch and hook and forgets all picking colors.
    pub fn teardown(&mut self) {
        let mut nodes = std::mem::take(&mut self.nodes);
        {
            let mut ctx = self.context();
            for node in &mut nodes {
                node.remove(&mut ctx);
            }
        }
        self.batches.clear();
        self.queue.clear();
        self.picking_hooks.clear();
        self.depth_hooks.clear();
        self.picking.clear();
        self.picking_slot.clear_latest();
        self.depth_slot.clear_latest();
        self.running = false;
        log::info!("scene torn down ({} nodes removed)", nodes.len());
    }
}

fn remove_hook<B: FrameBackend>(hooks: &mut Vec<HookEntry<B>>, id: CallbackId) -> bool {
    let before = hooks.len();
    hooks.retain(|h| h.id != id);
    hooks.len() != before
}

/// Draws every queued batch, category by category.
fn draw_batches<B: FrameBackend>(
    batches: &BatchArena<B>,
    queue: &BatchQueue,
    pass: &mut B::Pass<'_>,
    frame: &FrameInfo,
) {
    for category in EntityCategory::DRAW_ORDER {
        for &id in queue.as_slice() {
            let Some(entry) = batches.get(id) else {
                continue;
            };
            let batch = &entry.batch;
            if !batch.is_visible() || !batch.categories().contains(&category) {
                continue;
            }
            match frame.kind {
                PassKind::Scene => batch.draw(category, pass, frame),
                PassKind::Picking => batch.draw_picking(category, pass, frame),
                PassKind::Depth => batch.draw_depth(category, pass, frame),
            }
        }
    }
}

fn pick_color_at(images: &[PixelBuffer], normalized: DVec2) -> Option<PickColor> {
    let image = images.first()?;
    let (x, y) = image.texel_at(normalized)?;
    image.texel(x, y).map(PickColor::from_rgba)
}
