use std::sync::Arc;
use color_eyre::{Report, Result};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};
use crate::renderer::config::RenderConfig;
use crate::renderer::Renderer;

pub struct App {
    config: RenderConfig,

    // Dropped before the window it draws to
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,

    // State
    close_requested: bool,
    exit_error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,

            renderer: None,
            window: None,

            close_requested: false,
            exit_error: None,
        }
    }

    /// Runs the event loop until the window closes. Errors raised inside
    /// event callbacks stop the loop and are returned here.
    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.run_app(&mut self)?;

        match self.exit_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_none() {
            let attributes = Window::default_attributes()
                .with_title(self.config.window_title.clone())
                .with_inner_size(LogicalSize::new(
                    self.config.window_width,
                    self.config.window_height,
                ));
            self.window = Some(Arc::new(event_loop.create_window(attributes)?));
        }

        if self.renderer.is_none() {
            if let Some(window) = self.window.clone() {
                self.renderer = Some(Renderer::new(window, &self.config)?);
            }
        }

        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: Report) {
        log::error!("Stopping after error: {}", err);
        if self.exit_error.is_none() {
            self.exit_error = Some(err);
        }
        self.close_requested = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                if self.close_requested {
                    return;
                }
                let drawn = self.renderer.as_mut().map(Renderer::draw);
                if let Some(Err(err)) = drawn {
                    self.fail(event_loop, err);
                }
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
                self.close_requested = true;
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            event_loop.exit();
            return;
        }

        // Draw continuously, the model animates with wall-clock time. A
        // minimized window sleeps until the next event resizes it.
        if let Some(window) = self.window.as_ref() {
            if has_area(window.inner_size()) {
                window.request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // Device teardown happens while the window is still alive
        self.renderer = None;
        log::info!("Shutting down");
    }
}

fn has_area(size: PhysicalSize<u32>) -> bool {
    size.width > 0 && size.height > 0
}
