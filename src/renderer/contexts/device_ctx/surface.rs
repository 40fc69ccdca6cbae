use ash::vk;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;

/// Presentation surface of the window
pub struct RenderSurface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::khr::surface::Instance,
}

/// Capabilities, formats, and present modes a surface offers a physical device
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl RenderSurface {
    pub fn new(
        instance: &RenderInstance,
        window: &Window,
    ) -> Result<Self> {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);
        Ok(Self {
            surface,
            loader,
        })
    }

    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
    ) -> Result<bool> {
        Ok(unsafe {
            self.loader.get_physical_device_surface_support(
                physical_device,
                queue_family_index,
                self.surface,
            )?
        })
    }

    pub fn query_support(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self.loader
                    .get_physical_device_surface_capabilities(physical_device, self.surface)?,
                formats: self.loader
                    .get_physical_device_surface_formats(physical_device, self.surface)?,
                present_modes: self.loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)?,
            })
        }
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
