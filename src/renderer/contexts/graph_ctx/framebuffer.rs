use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

/// Number of framebuffers needed so every combination of attachment slices recurs
/// with a fixed period
pub fn framebuffer_period(slice_counts: &[usize]) -> usize {
    slice_counts
        .iter()
        .filter(|count| **count > 0)
        .fold(1, |period, count| lcm(period, *count))
}

/// Slice of each attachment bound by framebuffer `framebuffer_index`
pub fn slice_indices(framebuffer_index: usize, slice_counts: &[usize]) -> Vec<usize> {
    slice_counts
        .iter()
        .map(|count| if *count == 0 { 0 } else { framebuffer_index % count })
        .collect()
}

/// Creates one framebuffer per entry of `views`, each holding the views in attachment order.
/// Framebuffers created before a failure are destroyed again.
pub fn create_framebuffers(
    render_pass: vk::RenderPass,
    views: &[Vec<vk::ImageView>],
    extent: vk::Extent2D,
    device: &ash::Device,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(views.len());

    for attachments in views {
        if attachments.iter().any(|view| *view == vk::ImageView::null()) {
            destroy_framebuffers(&framebuffers, device);
            return Err(eyre!("Framebuffer attachment has no image view"));
        }

        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                destroy_framebuffers(&framebuffers, device);
                return Err(e.into());
            }
        }
    }

    Ok(framebuffers)
}

pub fn destroy_framebuffers(framebuffers: &[vk::Framebuffer], device: &ash::Device) {
    for framebuffer in framebuffers {
        unsafe {
            device.destroy_framebuffer(*framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_is_lcm_of_slice_counts() {
        assert_eq!(framebuffer_period(&[2, 3]), 6);
        assert_eq!(framebuffer_period(&[3, 1]), 3);
        assert_eq!(framebuffer_period(&[2, 4]), 4);
        assert_eq!(framebuffer_period(&[]), 1);
    }

    #[test]
    fn test_framebuffer_binds_slice_modulo_count() {
        assert_eq!(slice_indices(4, &[2, 3]), vec![0, 1]);
        assert_eq!(slice_indices(5, &[2, 3]), vec![1, 2]);
        assert_eq!(slice_indices(2, &[1, 3]), vec![0, 2]);
    }

    #[test]
    fn test_every_slice_combination_recurs_once_per_period() {
        let counts = [2, 3];
        let period = framebuffer_period(&counts);
        let combinations = (0..period)
            .map(|i| slice_indices(i, &counts))
            .collect::<std::collections::HashSet<_>>();

        assert_eq!(combinations.len(), 6);
        assert_eq!(slice_indices(period, &counts), slice_indices(0, &counts));
    }
}
