use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use image::{Rgba, RgbaImage};
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::resources::image::Image;

/// Mipmapped color image and the sampler used to read it
pub struct ColorTexture {
    pub image: Image,
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl ColorTexture {
    pub fn new_from_file(
        path: &Path,
        device: &RenderDevice,
    ) -> Result<Self> {
        let decoded = image::open(path)
            .wrap_err_with(|| format!("Failed to load texture {}", path.display()))?
            .to_rgba8();
        log::info!(
            "Loaded texture {} ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height(),
        );
        Self::new_from_image(&decoded, device)
    }

    pub fn new_from_image(
        image: &RgbaImage,
        device: &RenderDevice,
    ) -> Result<Self> {
        let extent = vk::Extent2D {
            width: image.width(),
            height: image.height(),
        };
        let image = Image::new_mipmapped_texture(image.as_raw(), extent, device)?;
        let sampler = Self::create_sampler(image.mip_levels, device)?;

        Ok(Self {
            image,
            sampler,
            device: device.logical.clone(),
        })
    }

    fn create_sampler(
        mip_levels: u32,
        device: &RenderDevice,
    ) -> Result<vk::Sampler> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(device.properties.limits.max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);
        Ok(unsafe { device.logical.create_sampler(&info, None)? })
    }
}

impl Drop for ColorTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Two-tone checkerboard with `cells` squares per side
pub fn checkerboard(size: u32, cells: u32) -> RgbaImage {
    let cell = (size / cells.max(1)).max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([230, 230, 230, 255])
        } else {
            Rgba([40, 90, 160, 255])
        }
    })
}
