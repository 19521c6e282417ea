use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::graph_ctx::resource::Resource;
use crate::renderer::resources::texture::Texture;

/// Presentation target of the renderer, encapsulating the surface, swapchain and the
/// back buffer resource the graph renders into
pub struct RenderTarget {
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,

    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub extent: vk::Extent2D,

    /// One slice per swapchain image, in swapchain order
    pub back_buffer: Resource<Texture>,

    device: Arc<ash::Device>,
}

impl RenderTarget {
    pub fn new(
        window: &Window,
        surface: (vk::SurfaceKHR, ash::khr::surface::Instance),
        vsync: bool,
        ins: &RenderInstance,
        dev: &RenderDevice,
    ) -> Result<Self> {
        let (surface, surface_loader) = surface;

        let surface_formats = unsafe {
            surface_loader.get_physical_device_surface_formats(dev.physical, surface)?
        };
        let surface_present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(dev.physical, surface)?
        };

        let surface_format = surface_formats
            .iter()
            .find(|format| {
                format.format == vk::Format::B8G8R8A8_SRGB
                    && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| surface_formats.first())
            .copied()
            .ok_or_eyre("No suitable surface format found")?;

        // FIFO is the only mode guaranteed to be available
        let present_mode = if vsync {
            vk::PresentModeKHR::FIFO
        } else {
            surface_present_modes
                .iter()
                .copied()
                .find(|mode| *mode == vk::PresentModeKHR::MAILBOX)
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };

        let surface_capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(dev.physical, surface)?
        };

        let extent = if surface_capabilities.current_extent.width != u32::MAX {
            surface_capabilities.current_extent
        } else {
            let window_size = window.inner_size();
            vk::Extent2D {
                width: window_size.width.clamp(
                    surface_capabilities.min_image_extent.width,
                    surface_capabilities.max_image_extent.width,
                ),
                height: window_size.height.clamp(
                    surface_capabilities.min_image_extent.height,
                    surface_capabilities.max_image_extent.height,
                ),
            }
        };

        let min_image_count = {
            let min = surface_capabilities.min_image_count;
            let max = surface_capabilities.max_image_count;
            // Request one more image than the minimum so acquiring rarely waits on the driver
            if max > 0 && min + 1 > max {
                max
            } else {
                min + 1
            }
        };
        let pre_transform = if surface_capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_capabilities.current_transform
        };
        let image_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;

        let swapchain_loader = ash::khr::swapchain::Device::new(&ins.instance, &dev.logical);
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_usage(image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = unsafe {
            swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        let slices = Self::create_back_buffer_slices(
            swapchain,
            &swapchain_loader,
            surface_format.format,
            extent,
            image_usage,
            &dev.logical,
        )?;
        log::info!(
            "Created swapchain with {} images of {}x{} ({:?}, {:?})",
            slices.len(),
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
        );

        let mut back_buffer = Resource::new("Back buffer", false).with_slices(slices);
        back_buffer.external = true;

        Ok(Self {
            surface,
            surface_loader,
            surface_format,
            present_mode,
            swapchain,
            swapchain_loader,
            extent,
            back_buffer,
            device: dev.logical.clone(),
        })
    }

    pub fn image_count(&self) -> usize {
        self.back_buffer.slice_count()
    }

    fn create_back_buffer_slices(
        swapchain: vk::SwapchainKHR,
        swapchain_loader: &ash::khr::swapchain::Device,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        device: &ash::Device,
    ) -> Result<Vec<Texture>> {
        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain)?
        };
        let views = images
            .iter()
            .map(|image| {
                let view_info = vk::ImageViewCreateInfo::default()
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::R,
                        g: vk::ComponentSwizzle::G,
                        b: vk::ComponentSwizzle::B,
                        a: vk::ComponentSwizzle::A,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image(*image);
                unsafe {
                    device.create_image_view(&view_info, None)
                }
            })
            .collect::<VkResult<Vec<vk::ImageView>>>()?;

        Ok(images
            .into_iter()
            .zip(views)
            .map(|(image, view)| Texture {
                image,
                view,
                ..Texture::new(
                    format,
                    extent.width,
                    extent.height,
                    usage,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect())
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            for slice in self.back_buffer.slices() {
                self.device.destroy_image_view(slice.view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
