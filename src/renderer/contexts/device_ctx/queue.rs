use ash::vk;

/// The one queue the graph records, submits and presents on
pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family_index: u32, handle: vk::Queue) -> Self {
        Self {
            family_index,
            handle,
        }
    }

    /// Command pools must be created on the family their buffers are submitted to
    pub fn command_pool_info(&self, flags: vk::CommandPoolCreateFlags) -> vk::CommandPoolCreateInfo<'static> {
        vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.family_index)
            .flags(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_pools_target_the_queue_family() {
        let queue = Queue::new(2, vk::Queue::null());
        let info = queue.command_pool_info(vk::CommandPoolCreateFlags::TRANSIENT);

        assert_eq!(info.queue_family_index, 2);
        assert_eq!(info.flags, vk::CommandPoolCreateFlags::TRANSIENT);
    }
}
