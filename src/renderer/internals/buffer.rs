use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

/// A buffer with its own dedicated allocation, freed on drop
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub size: u64,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl AllocatedBuffer {
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

        let requirements = unsafe {
            device.get_buffer_memory_requirements(buffer)
        };
        let allocation = mem_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: mem_loc,
                linear: true,
                allocation_scheme: AllocationScheme::DedicatedBuffer(buffer),
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        // From here on `Drop` cleans up whatever was created
        let allocated = Self {
            buffer,
            size,

            allocation: Some(allocation),
            memory_allocator: mem_allocator,
            device,
        };

        if let Some(allocation) = allocated.allocation.as_ref() {
            unsafe {
                allocated.device.bind_buffer_memory(
                    buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        Ok(allocated)
    }

    /// Copy `data` into host-visible memory starting at `start_offset` bytes
    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        let allocation = self
            .allocation
            .as_mut()
            .ok_or_eyre("Buffer has no allocation")?;
        Ok(presser::copy_from_slice_to_offset(
            data,
            allocation,
            start_offset,
        )?)
    }
}

impl Drop for AllocatedBuffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free buffer allocation: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator poisoned: {}", e),
            }
        }
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}
