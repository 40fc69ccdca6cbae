use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::frame_loop::{
    AcquireOutcome, FrameBackend, PresentOutcome, PresentRequest, SubmitRequest,
};
use crate::renderer::contexts::frame_ctx::RenderFrameContext;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::contexts::target_ctx::RenderTargetContext;

/// Every context the renderer owns, in teardown order
pub struct RenderState {
    tgt: Option<RenderTargetContext>,
    res: RenderResourceContext,
    pip: RenderPipelineContext,
    frm: RenderFrameContext,
    dev: RenderDeviceContext,

    camera: Camera,
    clear_color: [f32; 4],
    window: Arc<Window>,
}

impl RenderState {
    pub fn new(
        window: Arc<Window>,
        config: &RenderConfig,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(&window, config)?;
        let frm = RenderFrameContext::new(config.frames_in_flight, &dev.device)?;
        let pip = RenderPipelineContext::new(&config.shader_path, dev.device.logical.clone())?;
        let res = RenderResourceContext::new(config, &pip, &dev.device)?;
        let tgt = RenderTargetContext::new(
            &dev,
            &pip,
            frm.command_pool,
            framebuffer_extent(&window),
        )?;

        Ok(Self {
            tgt: Some(tgt),
            res,
            pip,
            frm,
            dev,

            camera: Camera::new(),
            clear_color: config.clear_color,
            window,
        })
    }

    /// True while the window has no drawable area
    pub fn is_minimized(&self) -> bool {
        let extent = framebuffer_extent(&self.window);
        extent.width == 0 || extent.height == 0
    }

    fn target(&self) -> Result<&RenderTargetContext> {
        self.tgt.as_ref().ok_or_eyre("No swapchain to draw to")
    }
}

impl FrameBackend for RenderState {
    fn image_count(&self) -> usize {
        self.tgt.as_ref().map_or(0, RenderTargetContext::image_count)
    }

    fn wait_for_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.frm.frame(slot)?.in_flight;
        unsafe {
            self.dev.device.logical.wait_for_fences(&[fence], true, u64::MAX)?;
        }
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let signal = self.frm.frame(slot)?.image_available;
        self.target()?.swapchain.acquire_next_image(signal)
    }

    fn update_uniforms(&mut self, slot: usize, elapsed_secs: f32) -> Result<()> {
        let extent = self.target()?.swapchain.extent;
        let ubo = self.camera.uniforms_at(elapsed_secs, extent);
        self.res.write_uniforms(slot, &ubo)
    }

    fn record_commands(&mut self, image_index: u32, slot: usize) -> Result<()> {
        let descriptor_set = self.res.descriptor_set(slot)?;
        self.target()?.record_draw(
            image_index,
            descriptor_set,
            &self.res,
            &self.pip,
            self.clear_color,
        )
    }

    fn submit(&mut self, request: &SubmitRequest) -> Result<()> {
        let command_buffers = [self.target()?.command_buffer(request.image_index)?];
        let wait_semaphores = [self.frm.frame(request.wait_image_available)?.image_available];
        let signal_semaphores = [self.frm.frame(request.signal_render_finished)?.render_finished];
        let fence = self.frm.frame(request.signal_fence)?.in_flight;
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let device = &self.dev.device;
        unsafe {
            device.logical.reset_fences(&[fence])?;
            device.logical.queue_submit(device.graphics_queue.handle, &[submit_info], fence)?;
        }
        Ok(())
    }

    fn present(&mut self, request: &PresentRequest) -> Result<PresentOutcome> {
        let wait = self.frm.frame(request.wait_render_finished)?.render_finished;
        self.target()?.swapchain.present(
            self.dev.device.present_queue.handle,
            request.image_index,
            wait,
        )
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        self.dev.device.wait_idle()?;
        // The old chain goes away before the new one is created
        self.tgt = None;

        if self.is_minimized() {
            log::debug!("Window has no area, postponing swapchain rebuild");
            return Ok(());
        }

        let tgt = RenderTargetContext::new(
            &self.dev,
            &self.pip,
            self.frm.command_pool,
            framebuffer_extent(&self.window),
        )?;
        log::info!("Swapchain rebuilt with {} images", tgt.image_count());
        self.tgt = Some(tgt);
        Ok(())
    }
}

impl Drop for RenderState {
    fn drop(&mut self) {
        if let Err(err) = self.dev.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {}", err);
        }
    }
}

fn framebuffer_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}
