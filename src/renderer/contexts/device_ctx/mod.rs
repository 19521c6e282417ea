pub mod descriptor;
pub mod device;
pub mod instance;
pub mod queue;
pub mod target;
pub mod transfer_ctx;

use std::sync::Arc;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::target::RenderTarget;

/// Responsibilities:
/// - Manage the Vulkan instance, device, and graphics queue
/// - Own the surface and swapchain the graph presents to
/// - Hand out the memory and descriptor allocators
pub struct RenderDeviceContext {
    // Field order is drop order: the target and device must go before the instance
    pub target: Arc<RenderTarget>,
    pub device: Arc<RenderDevice>,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(window: &Window, config: &RenderConfig) -> Result<Self> {
        let instance = RenderInstance::new(window, config.validation)?;
        let surface = instance.create_surface(window)?;
        let device = RenderDevice::new(&instance, &surface)?;
        let target = RenderTarget::new(window, surface, config.vsync, &instance, &device)?;

        Ok(Self {
            target: Arc::new(target),
            device: Arc::new(device),
            instance,
        })
    }
}
