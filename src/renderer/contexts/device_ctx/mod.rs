pub mod descriptor;
pub mod device;
pub mod instance;
pub mod memory;
#[cfg(test)]
pub mod mock_driver;
pub mod queue;
pub mod surface;
pub mod transfer_ctx;

use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::surface::RenderSurface;

/// Responsibilities:
/// - Load Vulkan and keep the instance and window surface alive
/// - Pick the physical device and own the logical device and its queues
/// - Provide memory and descriptor allocators and one-shot submission
pub struct RenderDeviceContext {
    // Fields drop in declaration order: device, then surface, then instance
    pub device: RenderDevice,
    pub surface: RenderSurface,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(window, config)?;
        let surface = RenderSurface::new(&instance, window)?;
        let device = RenderDevice::new(&instance, &surface)?;

        Ok(Self {
            device,
            surface,
            instance,
        })
    }
}
