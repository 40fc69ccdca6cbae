use ash::vk;
use color_eyre::Result;
use gpu_descriptor::DescriptorTotalCount;

#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stages);

        self.bindings.push(binding);
        self
    }

    /// Descriptors one set of this layout consumes, as gpu-descriptor sizes its pools
    pub fn descriptor_count(&self) -> DescriptorTotalCount {
        let mut count = DescriptorTotalCount::default();
        for binding in &self.bindings {
            let n = binding.descriptor_count;
            match binding.descriptor_type {
                vk::DescriptorType::SAMPLER => count.sampler += n,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => count.combined_image_sampler += n,
                vk::DescriptorType::SAMPLED_IMAGE => count.sampled_image += n,
                vk::DescriptorType::STORAGE_IMAGE => count.storage_image += n,
                vk::DescriptorType::UNIFORM_BUFFER => count.uniform_buffer += n,
                vk::DescriptorType::STORAGE_BUFFER => count.storage_buffer += n,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => count.uniform_buffer_dynamic += n,
                vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => count.storage_buffer_dynamic += n,
                other => log::warn!("Descriptor type {:?} is not counted for pool sizing", other),
            }
        }
        count
    }

    pub fn build(
        &self,
        device: &ash::Device,
    ) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings);
        Ok(unsafe {
            device.create_descriptor_set_layout(&layout_info, None)?
        })
    }
}
