use ash::vk;

/// One buffered instance of a logical buffer
#[derive(Clone, Copy, Debug)]
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
}

impl Default for Buffer {
    fn default() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
        }
    }
}

impl Buffer {
    pub fn new(size: u64, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            ..Default::default()
        }
    }

    pub fn is_realized(&self) -> bool {
        self.buffer != vk::Buffer::null()
    }
}
