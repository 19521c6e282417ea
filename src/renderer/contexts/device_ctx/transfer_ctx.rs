use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{OptionExt, Result};
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Synchronous one-time submissions on a transient command pool.
/// Used for initial resource uploads, never during steady-state frames.
pub struct TransferContext {
    command_pool: vk::CommandPool,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl TransferContext {
    pub fn new(
        queue: Arc<Queue>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        // Command buffers from this pool live for a single submission
        let command_pool_info = queue.command_pool_info(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        Ok(Self {
            command_pool,
            queue,
            device,
        })
    }

    /// Record `func` into a fresh command buffer, submit it and block until the queue is idle
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
            self.device
                .allocate_command_buffers(&command_buffer_info)?
                .into_iter()
                .next()
                .ok_or_eyre("No transient command buffer allocated")?
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

        func(cmd, &*self.device)?;

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmds);
        unsafe {
            self.device.queue_submit(
                self.queue.handle,
                &[submit],
                vk::Fence::null(),
            )?;
            self.device.queue_wait_idle(self.queue.handle)?;
        }

        Ok(())
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
