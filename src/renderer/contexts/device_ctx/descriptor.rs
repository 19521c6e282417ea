use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_descriptor::{
    CreatePoolError, DescriptorAllocator, DescriptorDevice, DescriptorPoolCreateFlags,
    DescriptorSet, DescriptorSetLayoutCreateFlags, DescriptorTotalCount, DeviceAllocationError,
};

/// Descriptor-set layout plus the per-type descriptor counts the pool allocator needs
pub struct DescriptorSetLayout {
    pub layout: vk::DescriptorSetLayout,
    pub counts: DescriptorTotalCount,
    device: Arc<ash::Device>,
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
    counts: DescriptorTotalCount,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(descriptor_count)
                .stage_flags(stages),
        );
        add_descriptor_count(&mut self.counts, descriptor_type, descriptor_count);
        self
    }

    pub fn counts(&self) -> &DescriptorTotalCount {
        &self.counts
    }

    pub fn build(self, device: Arc<ash::Device>) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings);
        let layout = unsafe {
            device.create_descriptor_set_layout(&layout_info, None)?
        };

        Ok(DescriptorSetLayout {
            layout,
            counts: self.counts,
            device,
        })
    }
}

fn add_descriptor_count(
    counts: &mut DescriptorTotalCount,
    descriptor_type: vk::DescriptorType,
    count: u32,
) {
    let slot = match descriptor_type {
        vk::DescriptorType::SAMPLER => &mut counts.sampler,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER => &mut counts.combined_image_sampler,
        vk::DescriptorType::SAMPLED_IMAGE => &mut counts.sampled_image,
        vk::DescriptorType::STORAGE_IMAGE => &mut counts.storage_image,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER => &mut counts.uniform_texel_buffer,
        vk::DescriptorType::STORAGE_TEXEL_BUFFER => &mut counts.storage_texel_buffer,
        vk::DescriptorType::UNIFORM_BUFFER => &mut counts.uniform_buffer,
        vk::DescriptorType::STORAGE_BUFFER => &mut counts.storage_buffer,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => &mut counts.uniform_buffer_dynamic,
        vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => &mut counts.storage_buffer_dynamic,
        vk::DescriptorType::INPUT_ATTACHMENT => &mut counts.input_attachment,
        vk::DescriptorType::ACCELERATION_STRUCTURE_KHR => &mut counts.acceleration_structure,
        other => {
            log::warn!("Descriptor type {:?} is not pooled", other);
            return;
        }
    };
    *slot += count;
}

/// Pooled descriptor-set allocation.
///
/// When the current pool is exhausted or fragmented the allocator moves on to a freshly
/// created pool once before reporting the failure.
pub struct DescriptorSetAllocator {
    allocator: DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>,
    device: DescriptorAshDevice,
}

impl DescriptorSetAllocator {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self {
            allocator: DescriptorAllocator::new(0),
            device: DescriptorAshDevice::from(device),
        }
    }

    pub fn allocate(
        &mut self,
        layout: &DescriptorSetLayout,
        count: u32,
    ) -> Result<Vec<DescriptorSet<vk::DescriptorSet>>> {
        unsafe {
            self.allocator.allocate(
                &self.device,
                &layout.layout,
                DescriptorSetLayoutCreateFlags::empty(),
                &layout.counts,
                count,
            )
        }
        .map_err(|e| eyre!("Failed to allocate descriptor sets: {:?}", e))
    }

    pub fn free(&mut self, sets: impl IntoIterator<Item = DescriptorSet<vk::DescriptorSet>>) {
        unsafe {
            self.allocator.free(&self.device, sets);
        }
    }
}

impl Drop for DescriptorSetAllocator {
    fn drop(&mut self) {
        unsafe {
            self.allocator.cleanup(&self.device);
        }
    }
}

pub struct DescriptorAshDevice(pub Arc<ash::Device>);

impl From<Arc<ash::Device>> for DescriptorAshDevice {
    fn from(device: Arc<ash::Device>) -> Self {
        Self(device)
    }
}

impl DescriptorDevice<vk::DescriptorSetLayout, vk::DescriptorPool, vk::DescriptorSet>
for DescriptorAshDevice
{
    unsafe fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let sizes = [
            (vk::DescriptorType::SAMPLER, descriptor_count.sampler),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count.combined_image_sampler),
            (vk::DescriptorType::SAMPLED_IMAGE, descriptor_count.sampled_image),
            (vk::DescriptorType::STORAGE_IMAGE, descriptor_count.storage_image),
            (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, descriptor_count.uniform_texel_buffer),
            (vk::DescriptorType::STORAGE_TEXEL_BUFFER, descriptor_count.storage_texel_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER, descriptor_count.uniform_buffer),
            (vk::DescriptorType::STORAGE_BUFFER, descriptor_count.storage_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count.uniform_buffer_dynamic),
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, descriptor_count.storage_buffer_dynamic),
            (vk::DescriptorType::INPUT_ATTACHMENT, descriptor_count.input_attachment),
            (vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, descriptor_count.acceleration_structure),
        ];
        let pool_sizes: smallvec::SmallVec<[vk::DescriptorPoolSize; 12]> = sizes
            .iter()
            .filter(|(_, count)| *count != 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count,
            })
            .collect();

        let mut ash_flags = vk::DescriptorPoolCreateFlags::empty();

        if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            ash_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        }

        if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            ash_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let result = unsafe {
            self.0.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(max_sets)
                    .pool_sizes(&pool_sizes)
                    .flags(ash_flags),
                None,
            )
        };

        match result {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(CreatePoolError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(err) => {
                log::error!("Unexpected descriptor pool creation result: {}", err);
                Err(CreatePoolError::OutOfHostMemory)
            }
        }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.0.destroy_descriptor_pool(pool, None)
        }
    }

    unsafe fn alloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        layouts: impl ExactSizeIterator<Item = &'a vk::DescriptorSetLayout>,
        sets: &mut impl Extend<vk::DescriptorSet>,
    ) -> Result<(), DeviceAllocationError> {
        let set_layouts: smallvec::SmallVec<[_; 16]> = layouts.copied().collect();

        let result = unsafe {
            self.0.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .set_layouts(&set_layouts)
                    .descriptor_pool(*pool),
            )
        };

        match result {
            Ok(allocated) => {
                sets.extend(allocated);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => Err(DeviceAllocationError::OutOfHostMemory),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(DeviceAllocationError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
            Err(err) => {
                log::error!("Unexpected descriptor set allocation result: {}", err);
                Err(DeviceAllocationError::OutOfHostMemory)
            }
        }
    }

    unsafe fn dealloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        sets: impl Iterator<Item = vk::DescriptorSet>,
    ) {
        let sets: smallvec::SmallVec<[_; 16]> = sets.collect();
        if let Err(err) = unsafe { self.0.free_descriptor_sets(*pool, &sets) } {
            log::error!("Failed to free descriptor sets: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_builder_counts_descriptors_per_type() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::FRAGMENT)
            .add_binding(1, vk::DescriptorType::INPUT_ATTACHMENT, 2, vk::ShaderStageFlags::FRAGMENT)
            .add_binding(2, vk::DescriptorType::UNIFORM_BUFFER, 3, vk::ShaderStageFlags::VERTEX);

        let counts = builder.counts();
        assert_eq!(counts.uniform_buffer, 4);
        assert_eq!(counts.input_attachment, 2);
        assert_eq!(counts.sampler, 0);
    }
}
