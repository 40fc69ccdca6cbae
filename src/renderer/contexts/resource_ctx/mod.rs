use std::mem::size_of;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use gpu_descriptor::DescriptorSetLayoutCreateFlags;
use crate::renderer::config::{RenderConfig, SceneSource};
use crate::renderer::contexts::device_ctx::descriptor::{DescriptorAllocator, DescriptorAshDevice, DescriptorSet};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::pipeline_ctx::{
    RenderPipelineContext, SAMPLER_BINDING, TEXTURE_BINDING, UNIFORM_BINDING,
};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::texture::{checkerboard, ColorTexture};
use crate::renderer::shader_data::UniformBufferObject;

/// Responsibilities:
/// - Upload the scene geometry and texture once at startup
/// - Own one uniform buffer and one descriptor set per frame slot
pub struct RenderResourceContext {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
    pub texture: ColorTexture,

    uniform_buffers: Vec<Buffer>,
    descriptor_sets: Vec<DescriptorSet>,
    descriptor_allocator: Arc<Mutex<DescriptorAllocator>>,
    device: Arc<ash::Device>,
}

impl RenderResourceContext {
    pub fn new(
        config: &RenderConfig,
        pip_ctx: &RenderPipelineContext,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let (mesh, texture) = match &config.scene.resolve() {
            SceneSource::Model { mesh_path, texture_path } => (
                Mesh::new_from_obj_file(mesh_path)?,
                ColorTexture::new_from_file(texture_path, dev)?,
            ),
            SceneSource::DepthQuads => (
                Mesh::new_depth_quads(),
                ColorTexture::new_from_image(&checkerboard(256, 8), dev)?,
            ),
        };
        log::info!("Texture has {} mip levels", texture.image.mip_levels);

        let vertex_buffer = Buffer::new_device_local(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Vertex buffer",
            dev,
        )?;
        let index_buffer = Buffer::new_device_local(
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
            "Index buffer",
            dev,
        )?;
        let index_count = u32::try_from(mesh.indices.len())?;

        let uniform_buffers = (0..config.frames_in_flight)
            .map(|slot| {
                Buffer::new(
                    size_of::<UniformBufferObject>() as u64,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    &format!("Uniform buffer {}", slot),
                    MemoryLocation::CpuToGpu,
                    dev.memory_allocator(),
                    dev.logical.clone(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let descriptor_allocator = dev.descriptor_allocator();
        let descriptor_sets = unsafe {
            descriptor_allocator
                .lock()
                .map_err(|e| eyre!(e.to_string()))?
                .allocate(
                    &DescriptorAshDevice::from(dev.logical.clone()),
                    &pip_ctx.descriptor_set_layout,
                    DescriptorSetLayoutCreateFlags::empty(),
                    &pip_ctx.descriptor_count,
                    u32::try_from(config.frames_in_flight)?,
                )?
        };

        let ctx = Self {
            vertex_buffer,
            index_buffer,
            index_count,
            texture,

            uniform_buffers,
            descriptor_sets,
            descriptor_allocator,
            device: dev.logical.clone(),
        };
        ctx.write_descriptor_sets();

        Ok(ctx)
    }

    /// Points every slot's set at its own uniform buffer and the shared texture
    fn write_descriptor_sets(&self) {
        for (set, uniform_buffer) in self.descriptor_sets.iter().zip(&self.uniform_buffers) {
            let buffer_info = [vk::DescriptorBufferInfo::default()
                .buffer(uniform_buffer.buffer)
                .offset(0)
                .range(size_of::<UniformBufferObject>() as u64)];
            let image_info = [vk::DescriptorImageInfo::default()
                .image_view(self.texture.image.view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
            let sampler_info = [vk::DescriptorImageInfo::default()
                .sampler(self.texture.sampler)];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(*set.raw())
                    .dst_binding(UNIFORM_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(*set.raw())
                    .dst_binding(TEXTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(&image_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(*set.raw())
                    .dst_binding(SAMPLER_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(&sampler_info),
            ];
            unsafe {
                self.device.update_descriptor_sets(&writes, &[]);
            }
        }
    }

    pub fn write_uniforms(
        &mut self,
        slot: usize,
        ubo: &UniformBufferObject,
    ) -> Result<()> {
        self.uniform_buffers
            .get_mut(slot)
            .ok_or_else(|| eyre!("No uniform buffer for frame slot {}", slot))?
            .write(std::slice::from_ref(ubo), 0)?;
        Ok(())
    }

    pub fn descriptor_set(&self, slot: usize) -> Result<vk::DescriptorSet> {
        self.descriptor_sets
            .get(slot)
            .map(|set| *set.raw())
            .ok_or_else(|| eyre!("No descriptor set for frame slot {}", slot))
    }
}

impl Drop for RenderResourceContext {
    fn drop(&mut self) {
        match self.descriptor_allocator.lock() {
            Ok(mut allocator) => unsafe {
                allocator.free(
                    &DescriptorAshDevice::from(self.device.clone()),
                    self.descriptor_sets.drain(..),
                );
            },
            Err(err) => log::error!("Descriptor allocator lock poisoned: {}", err),
        }
    }
}
