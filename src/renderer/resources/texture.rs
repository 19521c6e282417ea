use ash::vk;

/// How the dimensions of a texture slice are decided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureSizeClass {
    /// `width` and `height` are used as given
    #[default]
    Absolute,
    /// `width` and `height` follow the presentation target's extent
    SwapchainRelative,
}

/// One buffered instance of a logical texture.
///
/// `image` and `view` stay null until the slice is committed, allocated by the graph
/// as a transient attachment, or supplied by a collaborator such as the swapchain.
#[derive(Clone, Copy, Debug)]
pub struct Texture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub width: u32,
    pub height: u32,
    pub size_class: TextureSizeClass,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            image: vk::Image::null(),
            view: vk::ImageView::null(),
            format: vk::Format::UNDEFINED,
            width: 0,
            height: 0,
            size_class: TextureSizeClass::Absolute,
            usage: vk::ImageUsageFlags::empty(),
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }
}

impl Texture {
    pub fn new(
        format: vk::Format,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            format,
            width,
            height,
            usage,
            aspect,
            ..Default::default()
        }
    }

    /// A slice whose extent is resolved against the presentation target
    pub fn swapchain_relative(
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Self {
        Self {
            format,
            size_class: TextureSizeClass::SwapchainRelative,
            usage,
            aspect,
            ..Default::default()
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Resolves the slice's extent, taking `target_extent` for swapchain-relative slices
    pub fn resolved_extent(&self, target_extent: Option<vk::Extent2D>) -> Option<vk::Extent2D> {
        match self.size_class {
            TextureSizeClass::Absolute => Some(self.extent()),
            TextureSizeClass::SwapchainRelative => target_extent,
        }
    }

    /// Bytes per texel for the formats the graph can upload into
    pub fn texel_size(&self) -> Option<u64> {
        let size = match self.format {
            vk::Format::R8_UNORM | vk::Format::R8_SRGB => 1,
            vk::Format::R8G8_UNORM => 2,
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::R16G16_SFLOAT
            | vk::Format::R32_SFLOAT
            | vk::Format::D32_SFLOAT => 4,
            vk::Format::R16G16B16A16_SFLOAT | vk::Format::R32G32_SFLOAT => 8,
            vk::Format::R32G32B32A32_SFLOAT => 16,
            _ => return None,
        };
        Some(size)
    }

    pub fn is_depth(&self) -> bool {
        self.aspect.contains(vk::ImageAspectFlags::DEPTH)
    }

    pub fn is_realized(&self) -> bool {
        self.view != vk::ImageView::null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_relative_extent_follows_target() {
        let slice = Texture::swapchain_relative(
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        );
        let target = vk::Extent2D { width: 800, height: 600 };

        assert_eq!(slice.resolved_extent(Some(target)), Some(target));
        assert_eq!(slice.resolved_extent(None), None);
        assert!(slice.is_depth());
        assert!(!slice.is_realized());
    }

    #[test]
    fn test_absolute_extent_ignores_target() {
        let slice = Texture::new(
            vk::Format::R8G8B8A8_UNORM,
            256,
            128,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        );
        let target = vk::Extent2D { width: 800, height: 600 };

        assert_eq!(
            slice.resolved_extent(Some(target)),
            Some(vk::Extent2D { width: 256, height: 128 })
        );
    }
}
