pub mod frame;
pub mod frame_loop;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::frame::Frame;

/// Responsibilities:
/// - Own the synchronization primitives of every frame slot
/// - Own the command pool the per-image command buffers come from
pub struct RenderFrameContext {
    pub frames: Vec<Frame>,
    pub command_pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl RenderFrameContext {
    pub fn new(
        frames_in_flight: usize,
        dev: &RenderDevice,
    ) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(eyre!("At least one frame in flight is required"));
        }

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(dev.queue_families.graphics)
            // Command buffers are re-recorded every tick
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            dev.logical.create_command_pool(&command_pool_info, None)?
        };

        let mut ctx = Self {
            frames: Vec::with_capacity(frames_in_flight),
            command_pool,
            device: dev.logical.clone(),
        };
        for _ in 0..frames_in_flight {
            ctx.frames.push(Frame::new(dev.logical.clone())?);
        }

        log::debug!("Created {} frame slots", frames_in_flight);
        Ok(ctx)
    }

    pub fn frame(&self, slot: usize) -> Result<&Frame> {
        self.frames
            .get(slot)
            .ok_or_else(|| eyre!("Frame slot {} out of range", slot))
    }
}

impl Drop for RenderFrameContext {
    fn drop(&mut self) {
        self.frames.clear();
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
