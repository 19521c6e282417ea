use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;

/// One frame-in-flight slot. Its objects may only be reused once `render_fence` signals.
pub struct Frame {
    pub command_buffer: vk::CommandBuffer,

    // Signals when the swapchain image is ready to be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when rendering has finished and the image may be presented.
    pub render_finished: vk::Semaphore,

    // Signals when all rendering commands of this slot have finished execution.
    pub render_fence: vk::Fence,
}

impl Frame {
    pub fn new(command_pool: vk::CommandPool, device: &ash::Device) -> Result<Self> {
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe {
            device
                .allocate_command_buffers(&command_buffer_info)?
                .into_iter()
                .next()
                .ok_or_eyre("No frame command buffer allocated")?
        };

        let mut frame = Self {
            command_buffer,
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            render_fence: vk::Fence::null(),
        };
        if let Err(e) = frame.create_sync_objects(device) {
            frame.destroy(command_pool, device);
            return Err(e);
        }

        Ok(frame)
    }

    fn create_sync_objects(&mut self, device: &ash::Device) -> Result<()> {
        unsafe {
            self.image_available = device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
            self.render_finished = device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?;
            // Created signaled so the first wait on a fresh slot returns immediately
            self.render_fence = device.create_fence(
                &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                None,
            )?;
        }
        Ok(())
    }

    pub fn destroy(&mut self, command_pool: vk::CommandPool, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.render_fence, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_semaphore(self.image_available, None);
            device.free_command_buffers(command_pool, &[self.command_buffer]);
        }
        self.render_fence = vk::Fence::null();
        self.render_finished = vk::Semaphore::null();
        self.image_available = vk::Semaphore::null();
        self.command_buffer = vk::CommandBuffer::null();
    }
}
