use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::contexts::device_ctx::descriptor::DescriptorSetAllocator;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Logical device, its graphics queue and the allocators that feed the graph
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,

    // For now, require the graphics queue to support presentation
    pub graphics_queue: Arc<Queue>,

    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    descriptor_allocator: ManuallyDrop<Mutex<DescriptorSetAllocator>>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &(vk::SurfaceKHR, ash::khr::surface::Instance),
    ) -> Result<Self> {
        let (physical_device, graphics_queue_family) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let (logical_device, graphics_queue) = Self::create_logical_device(
            &instance.instance,
            &physical_device,
            graphics_queue_family,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: false,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let logical_device = Arc::new(logical_device);
        let descriptor_allocator = DescriptorSetAllocator::new(logical_device.clone());

        Ok(Self {
            logical: logical_device,
            physical: physical_device,

            graphics_queue: Arc::new(graphics_queue),

            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            descriptor_allocator: ManuallyDrop::new(Mutex::new(descriptor_allocator)),
        })
    }

    pub fn memory_allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    pub fn with_descriptor_allocator<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&mut DescriptorSetAllocator) -> Result<T>,
    {
        let mut guard = self.descriptor_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?;
        func(&mut guard)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.logical.device_wait_idle()?;
        }
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &(vk::SurfaceKHR, ash::khr::surface::Instance),
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let (surface, surface_loader) = surface;
        let req_device_exts = Self::get_required_device_extensions();

        let candidates = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default()
                };

                req_device_exts.iter().all(|req_ext| {
                    let req_ext_supported = supported_extensions
                        .iter()
                        .filter_map(|sup_ext| sup_ext.extension_name_as_c_str().ok())
                        .any(|sup_ext| sup_ext == *req_ext);
                    if !req_ext_supported {
                        log::warn!("Device extension not supported: {:?}", req_ext);
                    }
                    req_ext_supported
                })
            })
            // Filter out devices without a queue that can both draw and present
            .filter_map(|device| {
                let props = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };

                props
                    .iter()
                    .enumerate()
                    .find(|(i, q)| {
                        let supports_graphics = q.queue_flags.contains(vk::QueueFlags::GRAPHICS);
                        let supports_present = unsafe {
                            surface_loader
                                .get_physical_device_surface_support(device, *i as u32, *surface)
                                .unwrap_or(false)
                        };
                        supports_graphics && supports_present
                    })
                    .map(|(i, _)| (device, i as u32))
            });

        candidates
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    vk::PhysicalDeviceType::OTHER => 4,
                    _ => 5,
                }
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: &vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .queue_priorities(&queue_priorities),
        ];

        let device = {
            let enabled_extension_names = Self::get_required_device_extensions()
                .iter()
                .map(|ext| ext.as_ptr())
                .collect::<Vec<*const c_char>>();
            let features = unsafe { instance.get_physical_device_features(*physical_device) };
            // The generic ATTACHMENT_OPTIMAL layout is part of synchronization2
            let mut synchronization2_features =
                vk::PhysicalDeviceSynchronization2Features::default()
                    .synchronization2(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&enabled_extension_names)
                .enabled_features(&features)
                .push_next(&mut synchronization2_features);

            unsafe {
                instance.create_device(*physical_device, &device_create_info, None)?
            }
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family, 0);
            Queue::new(graphics_queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle: {}", e);
            }
            // Both allocators hand their memory back through the device, so they go first
            ManuallyDrop::drop(&mut self.descriptor_allocator);
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_device(None);
        }
    }
}
