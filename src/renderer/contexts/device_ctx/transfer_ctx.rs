use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::Result;
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Runs one-shot command buffers for uploads and layout transitions outside of the frame loop
pub struct TransferContext {
    transfer_fence: vk::Fence,
    command_pool: vk::CommandPool,

    queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(
        queue: &Queue,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let transfer_fence_info = vk::FenceCreateInfo::default();
        let transfer_fence =
            unsafe { device.create_fence(&transfer_fence_info, None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        Ok(Self {
            transfer_fence,
            command_pool,
            queue: queue.handle,
            device,
        })
    }

    /// Records `func` into a fresh command buffer, submits it, and blocks until the GPU is done
    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let cmd = unsafe {
            self.device.allocate_command_buffers(&command_buffer_info)?[0]
        };

        let result = self.record_and_wait(cmd, func);

        unsafe {
            self.device.free_command_buffers(self.command_pool, &[cmd]);
        }
        result
    }

    fn record_and_wait<F>(
        &self,
        cmd: vk::CommandBuffer,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        func(cmd, &self.device)?;

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmds);
        unsafe {
            self.device.queue_submit(self.queue, &[submit], self.transfer_fence)?;
            self.device.wait_for_fences(&[self.transfer_fence], true, u64::MAX)?;
            self.device.reset_fences(&[self.transfer_fence])?;
        }

        log::trace!("Immediate submission finished");
        Ok(())
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_fence(self.transfer_fence, None);
        }
    }
}
