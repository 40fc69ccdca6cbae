use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, Result};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::buffer::Buffer;

pub struct ImageCreateInfo<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub name: &'a str,
}

/// Device-local 2D image with a view over all of its mip levels
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // The returned image holds no data yet and sits in the UNDEFINED layout
    pub fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(vk::Extent3D {
                    width: create_info.extent.width,
                    height: create_info.extent.height,
                    depth: 1,
                })
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(create_info.mip_levels)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None)? }
        };
        // Owned from here on, any failure below releases what exists so far
        let mut image = Self {
            image,
            view: vk::ImageView::null(),
            format: create_info.format,
            extent: create_info.extent,
            aspect: create_info.aspect,
            mip_levels: create_info.mip_levels,

            allocation: None,
            memory_allocator,
            device,
        };

        let requirements = unsafe { image.device.get_image_memory_requirements(image.image) };
        // The allocator lock is released before any early return drops `image`
        let allocation = image.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: create_info.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::DedicatedImage(image.image),
            });
        let allocation = allocation?;
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        image.allocation = Some(allocation);

        unsafe {
            image.device.bind_image_memory(image.image, memory, offset)?;
        }
        image.view = create_image_view(
            &image.device,
            image.image,
            create_info.format,
            create_info.aspect,
            create_info.mip_levels,
        )?;

        Ok(image)
    }

    /// Depth attachment matching the swapchain extent, left in the depth attachment layout
    pub fn new_depth_image(
        extent: vk::Extent2D,
        format: vk::Format,
        device: &RenderDevice,
    ) -> Result<Self> {
        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        let create_info = ImageCreateInfo {
            format,
            extent,
            mip_levels: 1,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect,
            name: "Depth image",
        };
        let image = Self::new(&create_info, device.memory_allocator(), device.logical.clone())?;

        device.immediate_submit(|cmd, dev| {
            record_transition(
                dev,
                cmd,
                image.image,
                subresource_range(aspect, 0, 1),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            );
            Ok(())
        })?;

        Ok(image)
    }

    /// Sampled RGBA8 sRGB image with a full mip chain generated on the GPU
    pub fn new_mipmapped_texture(
        rgba: &[u8],
        extent: vk::Extent2D,
        device: &RenderDevice,
    ) -> Result<Self> {
        let format = vk::Format::R8G8B8A8_SRGB;
        let expected_len = extent.width as usize * extent.height as usize * 4;
        if rgba.len() != expected_len || expected_len == 0 {
            return Err(eyre!(
                "Texture data is {} bytes, expected {} for {}x{}",
                rgba.len(),
                expected_len,
                extent.width,
                extent.height,
            ));
        }

        let format_props = device.format_properties(format);
        if !format_props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
        {
            return Err(eyre!("Texture format {:?} does not support linear blitting", format));
        }

        let mip_levels = mip_level_count(extent.width, extent.height);
        let create_info = ImageCreateInfo {
            format,
            extent,
            mip_levels,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
            name: "Texture image",
        };
        let image = Self::new(&create_info, device.memory_allocator(), device.logical.clone())?;

        let mut staging = Buffer::new(
            rgba.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            "Texture staging buffer",
            MemoryLocation::CpuToGpu,
            device.memory_allocator(),
            device.logical.clone(),
        )?;
        staging.write(rgba, 0)?;

        let steps = mip_chain_steps(extent, mip_levels);
        device.immediate_submit(|cmd, dev| {
            record_mip_steps(dev, cmd, image.image, staging.buffer, &steps);
            Ok(())
        })?;

        log::debug!(
            "Uploaded {}x{} texture with {} mip levels",
            extent.width,
            extent.height,
            mip_levels,
        );
        Ok(image)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {}", err);
                    }
                }
                Err(err) => log::error!("Memory allocator lock poisoned: {}", err),
            }
        }
        unsafe {
            self.device.destroy_image(self.image, None);
        }
    }
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .subresource_range(subresource_range(aspect, 0, mip_levels));
    Ok(unsafe { device.create_image_view(&info, None)? })
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(format, vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT)
}

/// floor(log2(max(width, height))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Size of mip `level`, halving per level and never dropping below one texel
pub fn mip_extent(extent: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width.checked_shr(level).unwrap_or(0).max(1),
        height: extent.height.checked_shr(level).unwrap_or(0).max(1),
    }
}

fn subresource_range(aspect: vk::ImageAspectFlags, base_mip_level: u32, level_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn subresource_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn extent_offset(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

/// One command of a texture upload, in submission order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MipStep {
    Transition {
        base_level: u32,
        level_count: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    /// Staging buffer into level 0
    CopyBase {
        extent: vk::Extent2D,
    },
    /// Linear blit of `src_level` into the level below it
    Blit {
        src_level: u32,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
}

/// Upload plan for a texture with `mip_levels` levels: every level becomes a
/// transfer destination, level 0 is filled from staging, then each level feeds
/// the next through a blit. Every level ends up SHADER_READ_ONLY_OPTIMAL.
pub fn mip_chain_steps(extent: vk::Extent2D, mip_levels: u32) -> Vec<MipStep> {
    let mip_levels = mip_levels.max(1);
    let mut steps = Vec::with_capacity(3 * mip_levels as usize);

    steps.push(MipStep::Transition {
        base_level: 0,
        level_count: mip_levels,
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    });
    steps.push(MipStep::CopyBase { extent });

    for level in 1..mip_levels {
        let src_level = level - 1;
        steps.push(MipStep::Transition {
            base_level: src_level,
            level_count: 1,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        });
        steps.push(MipStep::Blit {
            src_level,
            src_extent: mip_extent(extent, src_level),
            dst_extent: mip_extent(extent, level),
        });
        steps.push(MipStep::Transition {
            base_level: src_level,
            level_count: 1,
            old_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        });
    }

    // The last level was only ever written to
    steps.push(MipStep::Transition {
        base_level: mip_levels - 1,
        level_count: 1,
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    });

    steps
}

/// Access masks and stages `(src_access, dst_access, src_stage, dst_stage)` for a layout change
fn layout_sync(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags) {
    use vk::ImageLayout as L;
    match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::MEMORY_WRITE,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

fn record_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_access, dst_access, src_stage, dst_stage) = layout_sync(old_layout, new_layout);
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

fn record_mip_steps(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    staging: vk::Buffer,
    steps: &[MipStep],
) {
    for step in steps {
        match *step {
            MipStep::Transition { base_level, level_count, old_layout, new_layout } => {
                record_transition(
                    device,
                    cmd,
                    image,
                    subresource_range(vk::ImageAspectFlags::COLOR, base_level, level_count),
                    old_layout,
                    new_layout,
                );
            }
            MipStep::CopyBase { extent } => {
                let region = vk::BufferImageCopy::default()
                    .image_subresource(subresource_layers(0))
                    .image_extent(vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    });
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        staging,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
            }
            MipStep::Blit { src_level, src_extent, dst_extent } => {
                let blit = vk::ImageBlit::default()
                    .src_subresource(subresource_layers(src_level))
                    .src_offsets([vk::Offset3D::default(), extent_offset(src_extent)])
                    .dst_subresource(subresource_layers(src_level + 1))
                    .dst_offsets([vk::Offset3D::default(), extent_offset(dst_extent)]);
                unsafe {
                    device.cmd_blit_image(
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[blit],
                        vk::Filter::LINEAR,
                    );
                }
            }
        }
    }
}
