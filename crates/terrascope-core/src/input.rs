//! Pointer and touch state that decides when picking and depth refresh.

use glam::DVec2;

/// A pointer button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    Other(u16),
}

/// Pointer state accumulated between two frames.
///
/// Picking and depth passes are expensive, so they only run when the pointer
/// hovers (moves with no button held), when a touch starts or ends, or when a
/// collaborator asked for a refresh.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    position: Option<DVec2>,
    held: Vec<PointerButton>,
    moved: bool,
    touches: u32,
    touch_started: bool,
    touch_ended: bool,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known pointer position in surface pixels.
    pub fn position(&self) -> Option<DVec2> {
        self.position
    }

    pub fn buttons_held(&self) -> bool {
        !self.held.is_empty()
    }

    pub fn is_held(&self, button: PointerButton) -> bool {
        self.held.contains(&button)
    }

    pub fn active_touches(&self) -> u32 {
        self.touches
    }

    pub fn pointer_moved(&mut self, x: f64, y: f64) {
        self.position = Some(DVec2::new(x, y));
        self.moved = true;
    }

    /// The pointer left the surface.
    pub fn pointer_left(&mut self) {
        self.position = None;
        self.held.clear();
    }

    pub fn button_pressed(&mut self, button: PointerButton) {
        if !self.held.contains(&button) {
            self.held.push(button);
        }
    }

    pub fn button_released(&mut self, button: PointerButton) {
        self.held.retain(|&b| b != button);
    }

    pub fn touch_started(&mut self, x: f64, y: f64) {
        self.position = Some(DVec2::new(x, y));
        self.touches += 1;
        self.touch_started = true;
    }

    pub fn touch_moved(&mut self, x: f64, y: f64) {
        self.position = Some(DVec2::new(x, y));
    }

    pub fn touch_ended(&mut self) {
        self.touches = self.touches.saturating_sub(1);
        self.touch_ended = true;
    }

    /// Whether input this frame calls for picking and depth passes.
    pub fn wants_refresh(&self) -> bool {
        (self.moved && self.held.is_empty()) || self.touch_started || self.touch_ended
    }

    /// Clears the per-frame edges. Held buttons and touches persist.
    pub fn end_frame(&mut self) {
        self.moved = false;
        self.touch_started = false;
        self.touch_ended = false;
    }
}

/// Sticky one-shot refresh request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshRequest {
    requested: bool,
}

impl RefreshRequest {
    /// Forces the next frame's picking and depth passes.
    pub fn mark(&mut self) {
        self.requested = true;
    }

    pub fn is_marked(&self) -> bool {
        self.requested
    }

    /// Consumes the request.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.requested)
    }
}
