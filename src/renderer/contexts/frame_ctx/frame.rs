use std::sync::Arc;
use ash::vk;
use color_eyre::Result;

/// Synchronization primitives owned by one frame slot
pub struct Frame {
    // Signaled by the presentation engine when the acquired image can be drawn to
    pub image_available: vk::Semaphore,

    // Signaled when the slot's draw commands finish, presentation waits on it
    pub render_finished: vk::Semaphore,

    // Signaled when the slot's submission retires, the CPU waits on it before reuse
    pub in_flight: vk::Fence,

    device: Arc<ash::Device>,
}

impl Frame {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        // Null handles until created, a failed create drops what already exists
        let mut frame = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
            device,
        };

        unsafe {
            frame.image_available = frame.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
            frame.render_finished = frame.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
            // Starts signaled so the first wait on a fresh slot returns immediately
            frame.in_flight = frame.device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?;
        }

        Ok(frame)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.in_flight, None);
            self.device.destroy_semaphore(self.render_finished, None);
            self.device.destroy_semaphore(self.image_available, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::device_ctx::mock_driver::{self, FENCE, SEMAPHORE};

    fn assert_nothing_live() {
        assert_eq!(mock_driver::live_count(SEMAPHORE), 0);
        assert_eq!(mock_driver::live_count(FENCE), 0);
        assert_eq!(mock_driver::invalid_destroys(), 0);
    }

    #[test]
    fn drop_releases_every_primitive() {
        let frame = Frame::new(mock_driver::device()).unwrap();
        assert_eq!(mock_driver::live_count(SEMAPHORE), 2);
        assert_eq!(mock_driver::live_count(FENCE), 1);

        drop(frame);
        assert_nothing_live();
    }

    #[test]
    fn failed_fence_releases_semaphores() {
        mock_driver::fail_call(FENCE, 0);
        assert!(Frame::new(mock_driver::device()).is_err());
        assert_nothing_live();
    }

    #[test]
    fn failed_second_semaphore_releases_first() {
        mock_driver::fail_call(SEMAPHORE, 1);
        assert!(Frame::new(mock_driver::device()).is_err());
        assert_nothing_live();
    }
}
