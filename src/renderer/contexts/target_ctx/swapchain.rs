use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::surface::RenderSurface;
use crate::renderer::contexts::frame_ctx::frame_loop::{AcquireOutcome, PresentOutcome};
use crate::renderer::resources::image::create_image_view;

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,

    loader: ash::khr::swapchain::Device,
    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        surface: &RenderSurface,
        dev: &RenderDevice,
        desired_extent: vk::Extent2D,
    ) -> Result<Self> {
        let support = surface.query_support(dev.physical)?;
        let capabilities = support.capabilities;

        let format = choose_surface_format(&support.formats)?;
        let extent = choose_extent(&capabilities, desired_extent);
        check_extent(extent)?;
        let min_image_count = choose_image_count(&capabilities);
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let family_indices = [dev.queue_families.graphics, dev.queue_families.present];
        let mut swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);
        swapchain_info = if dev.queue_families.is_shared() {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        } else {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        };

        let loader = dev.swapchain_loader.clone();
        let swapchain = unsafe {
            loader.create_swapchain(&swapchain_info, None)?
        };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(err) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(err.into());
            }
        };

        // Build the wrapper first so a failing view creation still releases the chain
        let mut chain = Self {
            swapchain,
            images,
            image_views: Vec::new(),
            format,
            extent,
            loader,
            device: dev.logical.clone(),
        };
        for &image in &chain.images {
            let view = create_image_view(
                &chain.device,
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            chain.image_views.push(view);
        }

        log::info!(
            "Created swapchain: {:?} {:?}, {}x{}, {} images",
            format.format,
            format.color_space,
            extent.width,
            extent.height,
            chain.images.len(),
        );
        Ok(chain)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        AcquireOutcome::from_vk(result)
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let result: VkResult<bool> = unsafe {
            self.loader.queue_present(queue, &present_info)
        };
        PresentOutcome::from_vk(result)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Only the sRGB BGRA8 format is accepted
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| *f == PREFERRED_SURFACE_FORMAT)
        .ok_or_eyre("Surface does not offer B8G8R8A8_SRGB with the SRGB_NONLINEAR color space")
}

/// At least two images, limited by the surface maximum when it has one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count.max(2);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// The surface's current extent, or the framebuffer size clamped to the
/// supported range when the surface lets the swapchain decide
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: desired.width.clamp(min.width, max.width.max(min.width)),
        height: desired.height.clamp(min.height, max.height.max(min.height)),
    }
}

/// Rejects extents a swapchain cannot be built with
pub fn check_extent(extent: vk::Extent2D) -> Result<()> {
    if extent.width == 0 || extent.height == 0 {
        return Err(eyre!("Cannot create a swapchain with a zero-sized extent"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        }
    }

    #[test]
    fn picks_srgb_bgra_only() {
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            choose_surface_format(&[unorm, PREFERRED_SURFACE_FORMAT]).unwrap(),
            PREFERRED_SURFACE_FORMAT,
        );
        assert!(choose_surface_format(&[unorm]).is_err());
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn image_count_is_at_least_two() {
        assert_eq!(choose_image_count(&capabilities(1, 0)), 2);
        assert_eq!(choose_image_count(&capabilities(3, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 8)), 2);
    }

    #[test]
    fn image_count_respects_maximum() {
        assert_eq!(choose_image_count(&capabilities(1, 1)), 1);
    }

    #[test]
    fn current_extent_wins_when_defined() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = vk::Extent2D { width: 800, height: 600 };
        let extent = choose_extent(&caps, vk::Extent2D { width: 1920, height: 1080 });
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn undefined_extent_clamps_framebuffer_size() {
        let caps = capabilities(2, 0);
        let extent = choose_extent(&caps, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });

        let extent = choose_extent(&caps, vk::Extent2D { width: 10_000, height: 0 });
        assert_eq!(extent, vk::Extent2D { width: 4096, height: 1 });
    }

    #[test]
    fn zero_extent_is_rejected() {
        assert!(check_extent(vk::Extent2D { width: 0, height: 600 }).is_err());
        assert!(check_extent(vk::Extent2D { width: 800, height: 600 }).is_ok());
    }
}
