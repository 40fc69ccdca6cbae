pub mod render_pass;
pub mod swapchain;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::pipeline_ctx::pipeline::GraphicsPipeline;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::contexts::target_ctx::render_pass::{select_depth_format, RenderPass};
use crate::renderer::contexts::target_ctx::swapchain::Swapchain;
use crate::renderer::resources::image::Image;

/// Responsibilities:
/// - Own everything whose size or count follows the swapchain
/// - Record the draw into the command buffer of an acquired image
///
/// The whole context is dropped and rebuilt when the swapchain goes stale.
pub struct RenderTargetContext {
    // Fields drop after `Drop::drop` releases framebuffers and command buffers,
    // in declaration order
    pub pipeline: GraphicsPipeline,
    pub render_pass: RenderPass,
    pub depth_image: Image,
    pub swapchain: Swapchain,

    framebuffers: Vec<vk::Framebuffer>,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl RenderTargetContext {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        pip_ctx: &RenderPipelineContext,
        command_pool: vk::CommandPool,
        desired_extent: vk::Extent2D,
    ) -> Result<Self> {
        let dev = &dev_ctx.device;
        let swapchain = Swapchain::new(&dev_ctx.surface, dev, desired_extent)?;
        let extent = swapchain.extent;

        let depth_format = select_depth_format(|format| dev.format_properties(format))?;
        log::info!("Using depth format {:?}", depth_format);
        let depth_image = Image::new_depth_image(extent, depth_format, dev)?;

        let render_pass = RenderPass::new(
            swapchain.format.format,
            depth_format,
            dev.logical.clone(),
        )?;
        let pipeline = GraphicsPipeline::new(
            pip_ctx,
            render_pass.render_pass,
            extent,
            dev.logical.clone(),
        )?;
        let framebuffers = render_pass.create_framebuffers(
            &swapchain.image_views,
            depth_image.view,
            extent,
        )?;

        let mut ctx = Self {
            pipeline,
            render_pass,
            depth_image,
            swapchain,

            framebuffers,
            command_buffers: Vec::new(),
            command_pool,
            device: dev.logical.clone(),
        };

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(u32::try_from(ctx.framebuffers.len())?);
        ctx.command_buffers = unsafe {
            ctx.device.allocate_command_buffers(&allocate_info)?
        };

        Ok(ctx)
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn command_buffer(&self, image_index: u32) -> Result<vk::CommandBuffer> {
        self.command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| eyre!("No command buffer for swapchain image {}", image_index))
    }

    /// Re-records the image's command buffer to draw the scene with `descriptor_set`
    pub fn record_draw(
        &self,
        image_index: u32,
        descriptor_set: vk::DescriptorSet,
        res_ctx: &RenderResourceContext,
        pip_ctx: &RenderPipelineContext,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let cmd = self.command_buffer(image_index)?;
        let framebuffer = self.framebuffers[image_index as usize];

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            self.device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;

            self.device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
            self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            self.device.cmd_bind_vertex_buffers(cmd, 0, &[res_ctx.vertex_buffer.buffer], &[0]);
            self.device.cmd_bind_index_buffer(cmd, res_ctx.index_buffer.buffer, 0, vk::IndexType::UINT32);
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pip_ctx.pipeline_layout,
                0,
                &[descriptor_set],
                &[],
            );
            self.device.cmd_draw_indexed(cmd, res_ctx.index_count, 1, 0, 0, 0);
            self.device.cmd_end_render_pass(cmd);

            self.device.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

impl Drop for RenderTargetContext {
    fn drop(&mut self) {
        unsafe {
            if !self.command_buffers.is_empty() {
                self.device.free_command_buffers(self.command_pool, &self.command_buffers);
            }
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
