//! A minimal viewer loop around [`Globe`].

use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use terrascope_core::Options;

use crate::{Error, Globe, Result};

type Setup = Box<dyn FnOnce(&mut Globe) -> Result<()>>;

struct App {
    options: Options,
    setup: Option<Setup>,
    globe: Option<Globe>,
    error: Option<Error>,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window_attributes = Window::default_attributes()
            .with_title("terrascope")
            .with_inner_size(LogicalSize::new(1280, 720));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let mut globe = Globe::new(window.clone(), self.options.clone())?;
        if let Some(setup) = self.setup.take() {
            setup(&mut globe)?;
        }
        self.globe = Some(globe);
        window.request_redraw();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.globe.is_some() {
            return;
        }
        if let Err(error) = self.start(event_loop) {
            self.fail(event_loop, error);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match &event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
                return;
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
                return;
            }
            _ => {}
        }

        let Some(globe) = self.globe.as_mut() else {
            return;
        };
        if let Err(error) = globe.handle_window_event(&event) {
            // A failed resize halts drawing until the next resize succeeds,
            // so keep the loop alive.
            log::error!("{error}");
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(globe) = self.globe.as_mut() {
            globe.orchestrator_mut().teardown();
        }
    }
}

/// Opens a window and runs the event loop until it is closed.
///
/// `setup` runs once the GPU is ready, before the first frame, and is where
/// render nodes, entity batches and pass callbacks get registered.
pub fn run<F>(options: Options, setup: F) -> Result<()>
where
    F: FnOnce(&mut Globe) -> Result<()> + 'static,
{
    options.validate()?;
    let event_loop = EventLoop::new()?;
    let mut app = App {
        options,
        setup: Some(Box::new(setup)),
        globe: None,
        error: None,
    };
    event_loop.run_app(&mut app)?;
    match app.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
