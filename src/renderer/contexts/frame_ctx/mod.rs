pub mod frame;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::config::GraphConfig;
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::contexts::frame_ctx::frame::Frame;
use crate::renderer::contexts::graph_ctx::group::PassGroup;
use crate::renderer::contexts::graph_ctx::pass::Pass;

/// Outcome of one call to `execute`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Nothing to render: the graph is incomplete or has no groups
    Skipped,
    /// The swapchain no longer matches the surface and has to be recreated by the caller
    OutOfDate,
}

/// Whether a graph in this state records anything at all
pub fn should_execute(complete: bool, group_count: usize) -> bool {
    complete && group_count > 0
}

/// A submission that only waits, used to unsignal semaphores without recording anything
pub fn wait_only_submit<'a>(
    wait_semaphores: &'a [vk::Semaphore],
    wait_stages: &'a [vk::PipelineStageFlags],
) -> vk::SubmitInfo<'a> {
    vk::SubmitInfo::default()
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
}

pub fn slot_index(frame_index: u64, frames_in_flight: usize) -> usize {
    (frame_index % frames_in_flight.max(1) as u64) as usize
}

/// Responsibilities:
/// - Manage per-frame command buffers
/// - Manage synchronization between frames in flight
/// - Record the groups of a graph and present the result
pub struct RenderFrameContext {
    frames: Vec<Frame>,
    command_pool: vk::CommandPool,
    frame_index: u64,
    fence_timeout_ns: u64,

    queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

impl RenderFrameContext {
    pub fn new(
        config: &GraphConfig,
        queue: Arc<Queue>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        if config.frames_in_flight == 0 {
            return Err(eyre!("At least one frame in flight is required"));
        }

        // Each slot resets its own command buffer before recording
        let command_pool_info = queue.command_pool_info(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };

        let mut ctx = Self {
            frames: Vec::with_capacity(config.frames_in_flight),
            command_pool,
            frame_index: 0,
            fence_timeout_ns: config.fence_timeout_ns,
            queue,
            device,
        };
        for _ in 0..config.frames_in_flight {
            // Drop cleans up the slots created so far
            let frame = Frame::new(ctx.command_pool, &ctx.device)?;
            ctx.frames.push(frame);
        }

        Ok(ctx)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn execute(
        &mut self,
        groups: &[PassGroup],
        passes: &mut [Pass],
        target: &RenderTarget,
    ) -> Result<FrameStatus> {
        let slot = slot_index(self.frame_index, self.frames.len());
        let frame = self.frames.get(slot).ok_or_eyre("Frame slot out of range")?;
        let (command_buffer, image_available, render_finished, render_fence) = (
            frame.command_buffer,
            frame.image_available,
            frame.render_finished,
            frame.render_fence,
        );

        unsafe {
            self.device.wait_for_fences(&[render_fence], true, self.fence_timeout_ns)?;
        }

        let acquired = unsafe {
            target.swapchain_loader.acquire_next_image(
                target.swapchain,
                self.fence_timeout_ns,
                image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((image_index, _suboptimal)) => image_index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire, frame {}", self.frame_index);
                return Ok(FrameStatus::OutOfDate);
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.record(command_buffer, groups, passes, image_index) {
            self.release_acquire(image_available, render_fence)?;
            return Err(e);
        }

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device.reset_fences(&[render_fence])?;
            self.device.queue_submit(self.queue.handle, &[submit_info], render_fence)?;
        }

        let swapchains = [target.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            target.swapchain_loader.queue_present(self.queue.handle, &present_info)
        };

        // The slot is in flight now, whatever presentation reports
        self.frame_index += 1;

        match presented {
            Ok(_suboptimal) => Ok(FrameStatus::Presented),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on present, frame {}", self.frame_index - 1);
                Ok(FrameStatus::OutOfDate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Consumes the acquire signal of an abandoned frame so the slot's semaphore can be reused.
    /// The submission carries no work and signals the slot's fence.
    fn release_acquire(&self, image_available: vk::Semaphore, render_fence: vk::Fence) -> Result<()> {
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit_info = wait_only_submit(&wait_semaphores, &wait_stages);
        unsafe {
            self.device.reset_fences(&[render_fence])?;
            self.device.queue_submit(self.queue.handle, &[submit_info], render_fence)?;
        }
        log::debug!("Released acquired image of abandoned frame {}", self.frame_index);
        Ok(())
    }

    fn record(
        &self,
        cmd: vk::CommandBuffer,
        groups: &[PassGroup],
        passes: &mut [Pass],
        image_index: u32,
    ) -> Result<()> {
        let device = &*self.device;
        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }

        for group in groups {
            let framebuffer = group
                .framebuffers
                .get(group.framebuffer_index(image_index, self.frame_index))
                .copied()
                .ok_or_eyre("Pass group has no framebuffer for this frame")?;
            let clear_values = group.layout.clear_values();
            let render_pass_begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(group.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: group.layout.extent,
                })
                .clear_values(&clear_values);

            unsafe {
                device.cmd_begin_render_pass(cmd, &render_pass_begin_info, vk::SubpassContents::INLINE);
            }

            for (subpass, pass_index) in group.passes.iter().enumerate() {
                if subpass > 0 {
                    unsafe {
                        device.cmd_next_subpass(cmd, vk::SubpassContents::INLINE);
                    }
                }
                let pipeline = group
                    .pipelines
                    .get(subpass)
                    .copied()
                    .ok_or_eyre("Pass group is missing a pipeline")?;
                let pass = passes
                    .get_mut(*pass_index)
                    .and_then(Pass::as_graphics_mut)
                    .ok_or_eyre("Pass group refers to a missing graphics pass")?;

                unsafe {
                    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                }
                pass.record(cmd, device, self.frame_index)?;
            }

            unsafe {
                device.cmd_end_render_pass(cmd);
            }
        }

        unsafe {
            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }
}

impl Drop for RenderFrameContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.queue_wait_idle(self.queue.handle) {
                log::error!("Failed to wait for queue idle: {}", e);
            }
        }
        for frame in self.frames.iter_mut() {
            frame.destroy(self.command_pool, &self.device);
        }
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_or_incomplete_graph_is_skipped() {
        assert!(!should_execute(true, 0));
        assert!(!should_execute(false, 2));
        assert!(should_execute(true, 1));
    }

    #[test]
    fn test_slots_rotate_through_frames_in_flight() {
        let slots = (0..7).map(|frame| slot_index(frame, 3)).collect::<Vec<_>>();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(slot_index(5, 1), 0);
    }

    #[test]
    fn test_abandoned_frame_waits_on_acquire_without_work() {
        let semaphores = [vk::Semaphore::null()];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit_info = wait_only_submit(&semaphores, &stages);

        assert_eq!(submit_info.wait_semaphore_count, 1);
        assert_eq!(submit_info.p_wait_semaphores, semaphores.as_ptr());
        assert_eq!(submit_info.p_wait_dst_stage_mask, stages.as_ptr());
        assert_eq!(submit_info.command_buffer_count, 0);
        assert_eq!(submit_info.signal_semaphore_count, 0);
    }
}
