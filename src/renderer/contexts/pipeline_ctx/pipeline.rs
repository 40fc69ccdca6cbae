use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::shader_data::Vertex;

// Shaders are built without a clip-space Y flip, so +Z-facing geometry seen
// from the camera winds clockwise in framebuffer space
pub const FRONT_FACE: vk::FrontFace = vk::FrontFace::CLOCKWISE;
pub const CULL_MODE: vk::CullModeFlags = vk::CullModeFlags::BACK;

/// Graphics pipeline with static viewport state, rebuilt together with the swapchain
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    device: Arc<ash::Device>,
}

impl GraphicsPipeline {
    pub fn new(
        pip_ctx: &RenderPipelineContext,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let stages = pip_ctx.shader.stage_infos();

        let binding_descriptions = [Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(CULL_MODE)
            .front_face(FRONT_FACE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(pip_ctx.pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, err)| err)?
                .into_iter()
                .next()
                .ok_or_eyre("Pipeline creation returned no pipeline")?
        };

        log::debug!("Created graphics pipeline for {}x{}", extent.width, extent.height);
        Ok(Self {
            pipeline,
            device,
        })
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec2, Vec4Swizzles};
    use super::*;
    use crate::renderer::camera::Camera;
    use crate::renderer::resources::mesh::Mesh;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    // Same mapping as the pipeline's viewport: origin top-left, y growing down
    fn to_framebuffer(mvp: Mat4, position: glam::Vec3) -> Vec2 {
        let clip = mvp * position.extend(1.0);
        let ndc = clip.xy() / clip.w;
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * EXTENT.width as f32,
            (ndc.y + 1.0) * 0.5 * EXTENT.height as f32,
        )
    }

    // Rasterizer's signed area, negative for clockwise triangles
    fn signed_area(tri: [Vec2; 3]) -> f32 {
        let sum: f32 = (0..3)
            .map(|i| {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        -0.5 * sum
    }

    fn is_front_facing(area: f32) -> bool {
        match FRONT_FACE {
            vk::FrontFace::CLOCKWISE => area < 0.0,
            _ => area > 0.0,
        }
    }

    fn front_facing_triangles(elapsed_secs: f32) -> usize {
        let mesh = Mesh::new_depth_quads();
        let ubo = Camera::new().uniforms_at(elapsed_secs, EXTENT);
        let mvp = ubo.proj * ubo.view * ubo.model;

        mesh.indices
            .chunks_exact(3)
            .filter(|tri| {
                let corners = [0, 1, 2].map(|i| to_framebuffer(mvp, mesh.vertices[tri[i] as usize].position));
                is_front_facing(signed_area(corners))
            })
            .count()
    }

    #[test]
    fn culling_drops_back_faces() {
        assert_eq!(CULL_MODE, vk::CullModeFlags::BACK);
    }

    #[test]
    fn depth_quads_face_the_camera() {
        assert_eq!(front_facing_triangles(0.0), 4);
    }

    #[test]
    fn depth_quads_stay_visible_while_spinning() {
        for elapsed in [0.25, 0.5, 1.0, 1.5, 3.3] {
            assert_eq!(front_facing_triangles(elapsed), 4, "at {}s", elapsed);
        }
    }
}
