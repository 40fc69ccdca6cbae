pub mod descriptor_set_layout_builder;
pub mod pipeline;

use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use gpu_descriptor::DescriptorTotalCount;
use crate::renderer::contexts::pipeline_ctx::descriptor_set_layout_builder::DescriptorSetLayoutBuilder;
use crate::renderer::resources::shader::GraphicsShader;

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;
pub const SAMPLER_BINDING: u32 = 2;

/// Responsibilities:
/// - Own the shader module and the pipeline layout, which survive swapchain rebuilds
/// - Describe the single descriptor set the draw binds
pub struct RenderPipelineContext {
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub descriptor_count: DescriptorTotalCount,
    pub pipeline_layout: vk::PipelineLayout,
    pub shader: GraphicsShader,
    device: Arc<ash::Device>,
}

impl RenderPipelineContext {
    pub fn new(
        shader_path: &Path,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let shader = GraphicsShader::new(shader_path, device.clone())?;

        let layout_builder = DescriptorSetLayoutBuilder::new()
            .add_binding(UNIFORM_BINDING, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
            .add_binding(TEXTURE_BINDING, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT)
            .add_binding(SAMPLER_BINDING, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT);
        let descriptor_set_layout = layout_builder.build(&device)?;

        let set_layouts = [descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts);
        let pipeline_layout = match unsafe { device.create_pipeline_layout(&layout_info, None) } {
            Ok(layout) => layout,
            Err(err) => {
                unsafe { device.destroy_descriptor_set_layout(descriptor_set_layout, None) };
                return Err(err.into());
            }
        };

        Ok(Self {
            descriptor_set_layout,
            descriptor_count: layout_builder.descriptor_count(),
            pipeline_layout,
            shader,
            device,
        })
    }
}

impl Drop for RenderPipelineContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
    }
}
