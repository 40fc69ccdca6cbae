use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::eyre::Result;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::contexts::device_ctx::device::RenderDevice;

pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        mem_loc: MemoryLocation,
        mem_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&buffer_info, None)? }
        };

        // Owned from here on, any failure below releases what exists so far
        let mut buffer = Self {
            buffer,
            size,

            allocation: None,
            memory_allocator: mem_allocator,
            device,
        };

        let requirements = unsafe {
            buffer.device.get_buffer_memory_requirements(buffer.buffer)
        };
        // The allocator lock is released before any early return drops `buffer`
        let allocation = buffer.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: mem_loc,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
        let allocation = allocation?;
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        buffer.allocation = Some(allocation);

        unsafe {
            buffer.device.bind_buffer_memory(buffer.buffer, memory, offset)?;
        }

        Ok(buffer)
    }

    /// Device-local buffer filled with `data` through a host-visible staging copy
    pub fn new_device_local<T>(
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
        device: &RenderDevice,
    ) -> Result<Self>
    where
        T: Copy,
    {
        let size = std::mem::size_of_val(data) as u64;
        if size == 0 {
            return Err(eyre!("Cannot create empty buffer {}", name));
        }

        let mut staging = Buffer::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{} staging", name),
            MemoryLocation::CpuToGpu,
            device.memory_allocator(),
            device.logical.clone(),
        )?;
        staging.write(data, 0)?;

        let buffer = Buffer::new(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
            MemoryLocation::GpuOnly,
            device.memory_allocator(),
            device.logical.clone(),
        )?;

        device.immediate_submit(|cmd, dev| {
            let region = vk::BufferCopy::default().size(size);
            unsafe {
                dev.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]);
            }
            Ok(())
        })?;

        log::debug!("Uploaded {} bytes into {}", size, name);
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory of a host-visible buffer
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let allocation = self.allocation
            .as_mut()
            .ok_or_eyre("Buffer memory was already freed")?;
        let mapped = allocation
            .mapped_ptr()
            .ok_or_eyre("Buffer memory is not host-visible")?;
        let mut raw = presser::RawAllocation::from_raw_parts(
            mapped.cast::<u8>(),
            allocation.size() as usize,
        );
        let mut slab = unsafe { raw.borrow_as_slab() };
        Ok(presser::copy_from_slice_to_offset(data, &mut slab, start_offset)?)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(err) = allocator.free(allocation) {
                        log::error!("Failed to free buffer memory: {}", err);
                    }
                }
                Err(err) => log::error!("Memory allocator lock poisoned: {}", err),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::device_ctx::mock_driver::{self, BIND_BUFFER, BUFFER, MEMORY};

    fn new_buffer(allocator: &Arc<Mutex<Allocator>>, device: &Arc<ash::Device>) -> Result<Buffer> {
        Buffer::new(
            64,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            "Test buffer",
            MemoryLocation::GpuOnly,
            allocator.clone(),
            device.clone(),
        )
    }

    #[test]
    fn drop_returns_buffer_and_allocation() {
        let device = mock_driver::device();
        let allocator = mock_driver::memory_allocator(&device);

        let buffer = new_buffer(&allocator, &device).unwrap();
        assert_eq!(mock_driver::live_count(BUFFER), 1);
        assert_eq!(mock_driver::live_allocations(&allocator), 1);

        drop(buffer);
        assert_eq!(mock_driver::live_count(BUFFER), 0);
        assert_eq!(mock_driver::live_allocations(&allocator), 0);
        assert_eq!(mock_driver::invalid_destroys(), 0);
    }

    #[test]
    fn failed_bind_releases_buffer_and_allocation() {
        let device = mock_driver::device();
        let allocator = mock_driver::memory_allocator(&device);
        mock_driver::fail_call(BIND_BUFFER, 0);

        assert!(new_buffer(&allocator, &device).is_err());
        assert_eq!(mock_driver::live_count(BUFFER), 0);
        assert_eq!(mock_driver::live_allocations(&allocator), 0);

        drop(allocator);
        assert_eq!(mock_driver::live_count(MEMORY), 0);
        assert_eq!(mock_driver::invalid_destroys(), 0);
    }

    #[test]
    fn failed_allocation_releases_buffer() {
        let device = mock_driver::device();
        let allocator = mock_driver::memory_allocator(&device);
        mock_driver::fail_call(MEMORY, 0);

        assert!(new_buffer(&allocator, &device).is_err());
        assert_eq!(mock_driver::live_count(BUFFER), 0);
        assert_eq!(mock_driver::invalid_destroys(), 0);
    }
}
