pub mod camera;
pub mod config;

mod contexts;
mod resources;
mod shader_data;
mod state;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::frame_ctx::frame_loop::{FrameBackend, FrameLoop, TickOutcome};
use crate::renderer::state::RenderState;

pub struct Renderer {
    frame_loop: FrameLoop,
    state: RenderState,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let state = RenderState::new(window, config)?;
        let frame_loop = FrameLoop::new(config.frames_in_flight, state.image_count());

        Ok(Self {
            frame_loop,
            state,
        })
    }

    pub fn request_resize(&mut self) {
        self.frame_loop.request_resize();
    }

    pub fn draw(&mut self) -> Result<()> {
        // Nothing can be presented to a zero-sized surface, any resize stays pending
        if self.state.is_minimized() {
            return Ok(());
        }

        match self.frame_loop.tick(&mut self.state)? {
            TickOutcome::Drawn { image_index, slot } => {
                log::trace!("Drew image {} with frame slot {}", image_index, slot);
            }
            TickOutcome::Skipped => {
                log::trace!("Skipped frame");
            }
        }
        Ok(())
    }
}
