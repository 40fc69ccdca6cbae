use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocatorDebugSettings;
use crate::renderer::contexts::device_ctx::descriptor::{DescriptorAllocator, DescriptorAshDevice};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::memory;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamilyIndices};
use crate::renderer::contexts::device_ctx::surface::RenderSurface;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;

/// Logical device with its queues and allocators
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,

    pub graphics_queue: Queue,
    pub present_queue: Queue,
    pub swapchain_loader: ash::khr::swapchain::Device,

    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    descriptor_allocator: ManuallyDrop<Arc<Mutex<DescriptorAllocator>>>,
    transfer_context: ManuallyDrop<TransferContext>,

    instance: ash::Instance,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &RenderSurface,
    ) -> Result<Self> {
        let (physical_device, queue_families) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let (properties, memory_properties) = unsafe {
            (
                instance.instance.get_physical_device_properties(physical_device),
                instance.instance.get_physical_device_memory_properties(physical_device),
            )
        };
        memory::check_required_memory_types(&memory_properties)?;

        log::info!(
            "Using device {} ({:?}), graphics family {}, present family {}",
            properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            properties.device_type,
            queue_families.graphics,
            queue_families.present,
        );

        let logical_device = Self::create_logical_device(
            &instance.instance,
            physical_device,
            &queue_families,
        )?;

        let (graphics_queue, present_queue) = unsafe {
            (
                Queue::new(
                    queue_families.graphics,
                    logical_device.get_device_queue(queue_families.graphics, 0),
                ),
                Queue::new(
                    queue_families.present,
                    logical_device.get_device_queue(queue_families.present, 0),
                ),
            )
        };

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance.instance, &logical_device);
        let logical_device = Arc::new(logical_device);

        // Blits for mipmaps need a graphics-capable queue
        let transfer_context = TransferContext::new(
            &graphics_queue,
            logical_device.clone(),
        )?;

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            properties,
            memory_properties,
            queue_families,

            graphics_queue,
            present_queue,
            swapchain_loader,

            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            descriptor_allocator: ManuallyDrop::new(Arc::new(Mutex::new(DescriptorAllocator::new(0)))),
            transfer_context: ManuallyDrop::new(transfer_context),

            instance: instance.instance.clone(),
        })
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context.immediate_submit(func)
    }

    pub fn memory_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    pub fn descriptor_allocator(&self) -> Arc<Mutex<DescriptorAllocator>> {
        Arc::clone(&self.descriptor_allocator)
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance.get_physical_device_format_properties(self.physical, format)
        }
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    /// The first enumerated device that can draw to the surface
    fn select_physical_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let physical_device = unsafe {
            instance
                .enumerate_physical_devices()?
                .into_iter()
                .next()
                .ok_or_eyre("No Vulkan capable physical device found")?
        };

        let supported_extensions = unsafe {
            instance.enumerate_device_extension_properties(physical_device)?
        };
        for req_ext in Self::get_required_device_extensions() {
            let supported = supported_extensions
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == req_ext));
            if !supported {
                return Err(eyre!("Device extension not supported: {:?}", req_ext));
            }
        }

        let features = unsafe { instance.get_physical_device_features(physical_device) };
        if features.sampler_anisotropy == vk::FALSE {
            return Err(eyre!("Device does not support sampler anisotropy"));
        }

        let queue_family_props = unsafe {
            instance.get_physical_device_queue_family_properties(physical_device)
        };
        let queue_families = QueueFamilyIndices::find(
            &queue_family_props,
            |index| surface.supports_present(physical_device, index),
        )?;

        let support = surface.query_support(physical_device)?;
        if support.formats.is_empty() || support.present_modes.is_empty() {
            return Err(eyre!("Device offers no surface formats or present modes"));
        }

        Ok((physical_device, queue_families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        Ok(unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        })
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {}", err);
        }

        match self.descriptor_allocator.lock() {
            Ok(mut allocator) => unsafe {
                allocator.cleanup(&DescriptorAshDevice::from(self.logical.clone()));
            },
            Err(err) => log::error!("Descriptor allocator lock poisoned: {}", err),
        }

        unsafe {
            ManuallyDrop::drop(&mut self.transfer_context);
            ManuallyDrop::drop(&mut self.descriptor_allocator);
            // Every allocation must be returned before the device goes away
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}
