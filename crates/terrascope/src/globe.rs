//! The windowed front end over a wgpu frame orchestrator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pollster::FutureExt;
use winit::event::{ElementState, MouseButton, Touch, TouchPhase, WindowEvent};
use winit::window::Window;

use terrascope_core::{
    BatchId, BatchQueue, Extent, Instance, ObjectId, Options, PointerButton, ResizeDebounce,
};
use terrascope_render::{
    FrameBackend, FrameInfo, FrameOrchestrator, FrameOutcome, GpuContext, MeshData,
    MeshInstanceBatch, RenderNode, RenderResult, SceneContext, WgpuBackend,
};

const BATCH_NODE: &str = "globe.batches";

/// Queues every batch added through [`Globe::add_mesh_batch`] in each cascade.
struct BatchListNode {
    batches: Rc<RefCell<Vec<BatchId>>>,
}

impl<B: FrameBackend> RenderNode<B> for BatchListNode {
    fn name(&self) -> &str {
        BATCH_NODE
    }

    fn pre_draw_node(
        &mut self,
        _backend: &B,
        _frame: &FrameInfo,
        _ctx: &mut SceneContext<'_>,
        queue: &mut BatchQueue,
    ) {
        for &id in self.batches.borrow().iter() {
            queue.enqueue(id);
        }
    }

    fn draw_node(&mut self, _pass: &mut B::Pass<'_>, _frame: &FrameInfo) {}
}

/// A frame orchestrator bound to a window (or to an offscreen surface).
///
/// Window resizes first render at reduced resolution; once no resize arrived
/// for `Options::resize_settle_ms` the targets are rebuilt at full size.
pub struct Globe {
    window: Option<Arc<Window>>,
    orchestrator: FrameOrchestrator<WgpuBackend>,
    debounce: ResizeDebounce,
    batches: Rc<RefCell<Vec<BatchId>>>,
    objects: HashMap<BatchId, ObjectId>,
}

impl Globe {
    /// Creates a globe presenting into `window`.
    pub fn new(window: Arc<Window>, options: Options) -> RenderResult<Self> {
        let size = window.inner_size();
        let gpu = GpuContext::new_windowed(window.clone()).block_on()?;
        let mut globe = Self::with_gpu(gpu, options, Extent::new(size.width, size.height))?;
        globe.window = Some(window);
        Ok(globe)
    }

    /// Creates a globe without a window. The tone-mapped output is rendered
    /// but never presented.
    pub fn headless(width: u32, height: u32, options: Options) -> RenderResult<Self> {
        let gpu = GpuContext::new_headless(width, height).block_on()?;
        Self::with_gpu(gpu, options, Extent::new(width, height))
    }

    fn with_gpu(gpu: GpuContext, options: Options, surface: Extent) -> RenderResult<Self> {
        let backend = WgpuBackend::new(gpu, options.msaa_samples);
        let debounce = ResizeDebounce::new(Duration::from_millis(options.resize_settle_ms));
        let mut orchestrator = FrameOrchestrator::new(backend, options, surface)?;
        let batches = Rc::new(RefCell::new(Vec::new()));
        orchestrator.add_node(Box::new(BatchListNode {
            batches: batches.clone(),
        }))?;
        Ok(Self {
            window: None,
            orchestrator,
            debounce,
            batches,
            objects: HashMap::new(),
        })
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        self.window.as_ref()
    }

    pub fn orchestrator(&self) -> &FrameOrchestrator<WgpuBackend> {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut FrameOrchestrator<WgpuBackend> {
        &mut self.orchestrator
    }

    /// Adds an instanced mesh drawn in every cascade. All of its instances
    /// share one pickable object id.
    pub fn add_mesh_batch(
        &mut self,
        mesh: &MeshData,
        instances: impl IntoIterator<Item = Instance>,
    ) -> (BatchId, ObjectId) {
        let (object, color) = self.orchestrator.scene_context().register_pickable();
        let mut batch = MeshInstanceBatch::new(self.orchestrator.backend(), mesh, color);
        let rte = self.orchestrator.rte();
        for instance in instances {
            batch.instances_mut().add(instance, rte);
        }
        let id = self.orchestrator.add_entity_batch(Box::new(batch));
        self.batches.borrow_mut().push(id);
        self.objects.insert(id, object);
        self.orchestrator.mark_for_depth_refresh();
        (id, object)
    }

    pub fn mesh_batch_mut(&mut self, id: BatchId) -> Option<&mut MeshInstanceBatch> {
        self.orchestrator.entity_batch_mut(id)
    }

    /// Removes a batch added with [`add_mesh_batch`](Self::add_mesh_batch)
    /// and frees its picking color.
    pub fn remove_mesh_batch(&mut self, id: BatchId) -> bool {
        let Some(object) = self.objects.remove(&id) else {
            return false;
        };
        self.batches.borrow_mut().retain(|b| *b != id);
        self.orchestrator.scene_context().picking.release(object);
        self.orchestrator.remove_entity_batch(id);
        self.orchestrator.mark_for_depth_refresh();
        true
    }

    /// Returns true while a resize gesture has not settled yet.
    pub fn is_resizing(&self) -> bool {
        self.debounce.is_resizing()
    }

    /// Feeds a window event to the orchestrator.
    ///
    /// `RedrawRequested` draws a frame; pointer and touch events update the
    /// input state that decides when picking and depth refresh.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> RenderResult<()> {
        match event {
            WindowEvent::Resized(size) => {
                self.on_resize(Extent::new(size.width, size.height), Instant::now())?;
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.orchestrator
                    .input_mut()
                    .pointer_moved(position.x, position.y);
            }
            WindowEvent::CursorLeft { .. } => {
                self.orchestrator.input_mut().pointer_left();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = pointer_button(*button);
                let input = self.orchestrator.input_mut();
                match state {
                    ElementState::Pressed => input.button_pressed(button),
                    ElementState::Released => input.button_released(button),
                }
            }
            WindowEvent::Touch(touch) => self.on_touch(touch),
            WindowEvent::RedrawRequested => {
                self.redraw(Instant::now())?;
            }
            _ => {}
        }
        Ok(())
    }

    fn on_resize(&mut self, size: Extent, now: Instant) -> RenderResult<()> {
        if size.is_empty() {
            // Minimized: suspend right away, nothing to settle.
            self.debounce = ResizeDebounce::new(Duration::from_millis(
                self.orchestrator.options().resize_settle_ms,
            ));
            return self.orchestrator.resize(size.width, size.height);
        }
        self.debounce.on_resize(size, now);
        self.orchestrator
            .resize_in_progress(size.width, size.height)?;
        self.request_redraw();
        Ok(())
    }

    fn on_touch(&mut self, touch: &Touch) {
        let input = self.orchestrator.input_mut();
        let (x, y) = (touch.location.x, touch.location.y);
        match touch.phase {
            TouchPhase::Started => input.touch_started(x, y),
            TouchPhase::Moved => input.touch_moved(x, y),
            TouchPhase::Ended | TouchPhase::Cancelled => input.touch_ended(),
        }
    }

    /// Applies a settled resize if one is due, then draws a frame.
    pub fn redraw(&mut self, now: Instant) -> RenderResult<FrameOutcome> {
        if let Some(size) = self.debounce.poll(now) {
            log::debug!("resize settled at {}x{}", size.width, size.height);
            self.orchestrator.resize(size.width, size.height)?;
        }
        let outcome = self.orchestrator.draw()?;
        if self.debounce.is_resizing() || matches!(outcome, FrameOutcome::Drawn { .. }) {
            self.request_redraw();
        }
        Ok(outcome)
    }

    fn request_redraw(&self) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

/// Maps a winit mouse button onto the orchestrator's pointer buttons.
pub(crate) fn pointer_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Left,
        MouseButton::Right => PointerButton::Right,
        MouseButton::Middle => PointerButton::Middle,
        MouseButton::Back => PointerButton::Other(3),
        MouseButton::Forward => PointerButton::Other(4),
        MouseButton::Other(code) => PointerButton::Other(code),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_pointer_button_mapping() {
        assert_eq!(pointer_button(MouseButton::Left), PointerButton::Left);
        assert_eq!(pointer_button(MouseButton::Middle), PointerButton::Middle);
        assert_eq!(pointer_button(MouseButton::Back), PointerButton::Other(3));
        assert_eq!(pointer_button(MouseButton::Other(9)), PointerButton::Other(9));
    }

    proptest! {
        #[test]
        fn prop_extra_buttons_keep_their_code(code in any::<u16>()) {
            prop_assert_eq!(pointer_button(MouseButton::Other(code)), PointerButton::Other(code));
        }
    }
}
