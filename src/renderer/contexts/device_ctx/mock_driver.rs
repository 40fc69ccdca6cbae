//! In-process stand-in for the handful of Vulkan entry points the resource
//! wrappers call, so handle ownership can be checked without a GPU.
//!
//! State is per thread, each test sees a fresh driver.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::ptr;
use std::sync::{Arc, Mutex};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocatorDebugSettings;

pub const SEMAPHORE: &str = "semaphore";
pub const FENCE: &str = "fence";
pub const BUFFER: &str = "buffer";
pub const IMAGE: &str = "image";
pub const IMAGE_VIEW: &str = "image view";
pub const MEMORY: &str = "memory";
pub const BIND_BUFFER: &str = "bind buffer";
pub const BIND_IMAGE: &str = "bind image";

const MEMORY_SIZE: u64 = 256;

#[derive(Default)]
struct Driver {
    next_handle: u64,
    live: Vec<(&'static str, u64)>,
    calls: HashMap<&'static str, u32>,
    failures: Vec<(&'static str, u32)>,
    invalid_destroys: usize,
}

thread_local! {
    static DRIVER: RefCell<Driver> = RefCell::new(Driver::default());
}

/// Makes the `nth` call (0-based) of `kind` on this thread fail
pub fn fail_call(kind: &'static str, nth: u32) {
    DRIVER.with(|d| d.borrow_mut().failures.push((kind, nth)));
}

/// Destroy calls on handles that were never created or already destroyed
pub fn invalid_destroys() -> usize {
    DRIVER.with(|d| d.borrow().invalid_destroys)
}

/// Handles of `kind` created and not yet destroyed
pub fn live_count(kind: &'static str) -> usize {
    DRIVER.with(|d| d.borrow().live.iter().filter(|(k, _)| *k == kind).count())
}

fn should_fail(kind: &'static str) -> bool {
    DRIVER.with(|d| {
        let mut d = d.borrow_mut();
        let call = d.calls.entry(kind).or_insert(0);
        let index = *call;
        *call += 1;
        d.failures.contains(&(kind, index))
    })
}

fn create(kind: &'static str) -> Result<u64, vk::Result> {
    if should_fail(kind) {
        return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    }
    Ok(DRIVER.with(|d| {
        let mut d = d.borrow_mut();
        d.next_handle += 1;
        let handle = d.next_handle;
        d.live.push((kind, handle));
        handle
    }))
}

fn destroy(kind: &'static str, handle: u64) {
    // Destroying a null handle is a no-op
    if handle == 0 {
        return;
    }
    DRIVER.with(|d| {
        let mut d = d.borrow_mut();
        let position = d.live.iter().position(|&(k, h)| k == kind && h == handle);
        match position {
            Some(index) => {
                d.live.swap_remove(index);
            }
            None => d.invalid_destroys += 1,
        }
    });
}

unsafe fn write_handle<T: Handle>(kind: &'static str, out: *mut T) -> vk::Result {
    match create(kind) {
        Ok(raw) => {
            unsafe { out.write(T::from_raw(raw)) };
            vk::Result::SUCCESS
        }
        Err(err) => err,
    }
}

unsafe extern "system" fn create_semaphore(
    _: vk::Device,
    _: *const vk::SemaphoreCreateInfo<'_>,
    _: *const vk::AllocationCallbacks<'_>,
    out: *mut vk::Semaphore,
) -> vk::Result {
    unsafe { write_handle(SEMAPHORE, out) }
}

unsafe extern "system" fn destroy_semaphore(
    _: vk::Device,
    semaphore: vk::Semaphore,
    _: *const vk::AllocationCallbacks<'_>,
) {
    destroy(SEMAPHORE, semaphore.as_raw());
}

unsafe extern "system" fn create_fence(
    _: vk::Device,
    _: *const vk::FenceCreateInfo<'_>,
    _: *const vk::AllocationCallbacks<'_>,
    out: *mut vk::Fence,
) -> vk::Result {
    unsafe { write_handle(FENCE, out) }
}

unsafe extern "system" fn destroy_fence(
    _: vk::Device,
    fence: vk::Fence,
    _: *const vk::AllocationCallbacks<'_>,
) {
    destroy(FENCE, fence.as_raw());
}

unsafe extern "system" fn create_buffer(
    _: vk::Device,
    _: *const vk::BufferCreateInfo<'_>,
    _: *const vk::AllocationCallbacks<'_>,
    out: *mut vk::Buffer,
) -> vk::Result {
    unsafe { write_handle(BUFFER, out) }
}

unsafe extern "system" fn destroy_buffer(
    _: vk::Device,
    buffer: vk::Buffer,
    _: *const vk::AllocationCallbacks<'_>,
) {
    destroy(BUFFER, buffer.as_raw());
}

unsafe extern "system" fn create_image(
    _: vk::Device,
    _: *const vk::ImageCreateInfo<'_>,
    _: *const vk::AllocationCallbacks<'_>,
    out: *mut vk::Image,
) -> vk::Result {
    unsafe { write_handle(IMAGE, out) }
}

unsafe extern "system" fn destroy_image(
    _: vk::Device,
    image: vk::Image,
    _: *const vk::AllocationCallbacks<'_>,
) {
    destroy(IMAGE, image.as_raw());
}

unsafe extern "system" fn create_image_view(
    _: vk::Device,
    _: *const vk::ImageViewCreateInfo<'_>,
    _: *const vk::AllocationCallbacks<'_>,
    out: *mut vk::ImageView,
) -> vk::Result {
    unsafe { write_handle(IMAGE_VIEW, out) }
}

unsafe extern "system" fn destroy_image_view(
    _: vk::Device,
    view: vk::ImageView,
    _: *const vk::AllocationCallbacks<'_>,
) {
    destroy(IMAGE_VIEW, view.as_raw());
}

unsafe extern "system" fn allocate_memory(
    _: vk::Device,
    _: *const vk::MemoryAllocateInfo<'_>,
    _: *const vk::AllocationCallbacks<'_>,
    out: *mut vk::DeviceMemory,
) -> vk::Result {
    unsafe { write_handle(MEMORY, out) }
}

unsafe extern "system" fn free_memory(
    _: vk::Device,
    memory: vk::DeviceMemory,
    _: *const vk::AllocationCallbacks<'_>,
) {
    destroy(MEMORY, memory.as_raw());
}

unsafe extern "system" fn buffer_memory_requirements(
    _: vk::Device,
    _: vk::Buffer,
    out: *mut vk::MemoryRequirements,
) {
    unsafe { out.write(memory_requirements()) };
}

unsafe extern "system" fn image_memory_requirements(
    _: vk::Device,
    _: vk::Image,
    out: *mut vk::MemoryRequirements,
) {
    unsafe { out.write(memory_requirements()) };
}

unsafe extern "system" fn bind_buffer_memory(
    _: vk::Device,
    _: vk::Buffer,
    _: vk::DeviceMemory,
    _: vk::DeviceSize,
) -> vk::Result {
    bind_result(BIND_BUFFER)
}

unsafe extern "system" fn bind_image_memory(
    _: vk::Device,
    _: vk::Image,
    _: vk::DeviceMemory,
    _: vk::DeviceSize,
) -> vk::Result {
    bind_result(BIND_IMAGE)
}

unsafe extern "system" fn physical_device_properties(
    _: vk::PhysicalDevice,
    out: *mut vk::PhysicalDeviceProperties,
) {
    let mut properties = vk::PhysicalDeviceProperties::default();
    properties.limits.buffer_image_granularity = 1;
    unsafe { out.write(properties) };
}

unsafe extern "system" fn physical_device_memory_properties(
    _: vk::PhysicalDevice,
    out: *mut vk::PhysicalDeviceMemoryProperties,
) {
    let mut properties = vk::PhysicalDeviceMemoryProperties {
        memory_type_count: 1,
        memory_heap_count: 1,
        ..Default::default()
    };
    properties.memory_types[0] = vk::MemoryType {
        property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        heap_index: 0,
    };
    properties.memory_heaps[0] = vk::MemoryHeap {
        size: 1 << 32,
        flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
    };
    unsafe { out.write(properties) };
}

fn memory_requirements() -> vk::MemoryRequirements {
    vk::MemoryRequirements {
        size: MEMORY_SIZE,
        alignment: 16,
        memory_type_bits: 1,
    }
}

fn bind_result(kind: &'static str) -> vk::Result {
    if should_fail(kind) {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
    } else {
        vk::Result::SUCCESS
    }
}

fn device_proc(name: &CStr) -> *const c_void {
    match name.to_bytes() {
        b"vkCreateSemaphore" => create_semaphore as vk::PFN_vkCreateSemaphore as *const c_void,
        b"vkDestroySemaphore" => destroy_semaphore as vk::PFN_vkDestroySemaphore as *const c_void,
        b"vkCreateFence" => create_fence as vk::PFN_vkCreateFence as *const c_void,
        b"vkDestroyFence" => destroy_fence as vk::PFN_vkDestroyFence as *const c_void,
        b"vkCreateBuffer" => create_buffer as vk::PFN_vkCreateBuffer as *const c_void,
        b"vkDestroyBuffer" => destroy_buffer as vk::PFN_vkDestroyBuffer as *const c_void,
        b"vkCreateImage" => create_image as vk::PFN_vkCreateImage as *const c_void,
        b"vkDestroyImage" => destroy_image as vk::PFN_vkDestroyImage as *const c_void,
        b"vkCreateImageView" => create_image_view as vk::PFN_vkCreateImageView as *const c_void,
        b"vkDestroyImageView" => destroy_image_view as vk::PFN_vkDestroyImageView as *const c_void,
        b"vkAllocateMemory" => allocate_memory as vk::PFN_vkAllocateMemory as *const c_void,
        b"vkFreeMemory" => free_memory as vk::PFN_vkFreeMemory as *const c_void,
        b"vkGetBufferMemoryRequirements" => {
            buffer_memory_requirements as vk::PFN_vkGetBufferMemoryRequirements as *const c_void
        }
        b"vkGetImageMemoryRequirements" => {
            image_memory_requirements as vk::PFN_vkGetImageMemoryRequirements as *const c_void
        }
        b"vkBindBufferMemory" => bind_buffer_memory as vk::PFN_vkBindBufferMemory as *const c_void,
        b"vkBindImageMemory" => bind_image_memory as vk::PFN_vkBindImageMemory as *const c_void,
        _ => ptr::null(),
    }
}

fn instance_proc(name: &CStr) -> *const c_void {
    match name.to_bytes() {
        b"vkGetPhysicalDeviceProperties" => {
            physical_device_properties as vk::PFN_vkGetPhysicalDeviceProperties as *const c_void
        }
        b"vkGetPhysicalDeviceMemoryProperties" => {
            physical_device_memory_properties as vk::PFN_vkGetPhysicalDeviceMemoryProperties as *const c_void
        }
        _ => ptr::null(),
    }
}

pub fn device() -> Arc<ash::Device> {
    Arc::new(unsafe { ash::Device::load_with(device_proc, vk::Device::from_raw(1)) })
}

/// Allocator over a single device-local heap served by the mock driver
pub fn memory_allocator(device: &ash::Device) -> Arc<Mutex<Allocator>> {
    let instance = unsafe { ash::Instance::load_with(instance_proc, vk::Instance::from_raw(1)) };
    let allocator = Allocator::new(&AllocatorCreateDesc {
        instance,
        device: device.clone(),
        physical_device: vk::PhysicalDevice::from_raw(1),
        debug_settings: AllocatorDebugSettings::default(),
        buffer_device_address: false,
        allocation_sizes: Default::default(),
    });
    match allocator {
        Ok(allocator) => Arc::new(Mutex::new(allocator)),
        Err(err) => panic!("mock allocator: {}", err),
    }
}

/// Live sub-allocations handed out by `allocator`
pub fn live_allocations(allocator: &Mutex<Allocator>) -> usize {
    match allocator.lock() {
        Ok(allocator) => allocator.generate_report().allocations.len(),
        Err(err) => panic!("allocator lock poisoned: {}", err),
    }
}
