use std::collections::VecDeque;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use crate::renderer::contexts::graph_ctx::dependency::DependencyGraph;
use crate::renderer::contexts::graph_ctx::framebuffer::{self, framebuffer_period, slice_indices};
use crate::renderer::contexts::graph_ctx::pass::{GraphicsPass, Pass};
use crate::renderer::contexts::graph_ctx::render_pass::RenderPassLayout;
use crate::renderer::contexts::graph_ctx::resource::{ResourceTable, TextureHandle};
use crate::renderer::resources::texture::Texture;

/// Passes sharing one native render pass, one subpass each.
///
/// The native handles stay null until the group is realized on a device.
pub struct PassGroup {
    /// Indices into the graph's pass list, in subpass order
    pub passes: Vec<usize>,
    pub layout: RenderPassLayout,
    pub framebuffer_period: usize,

    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    /// One per pass, in subpass order
    pub pipelines: Vec<vk::Pipeline>,
}

impl PassGroup {
    pub fn plan(
        members: Vec<usize>,
        passes: &[Pass],
        textures: &ResourceTable<Texture>,
        back_buffer: TextureHandle,
        target_extent: Option<vk::Extent2D>,
    ) -> Result<Self> {
        let graphics = members
            .iter()
            .map(|index| {
                passes
                    .get(*index)
                    .and_then(Pass::as_graphics)
                    .ok_or_else(|| eyre!("Pass {} is not a graphics pass", index))
            })
            .collect::<Result<Vec<&GraphicsPass>>>()?;

        let layout = RenderPassLayout::synthesize(&graphics, textures, back_buffer, target_extent)?;
        let framebuffer_period = framebuffer_period(&Self::slice_counts(&layout, textures));

        Ok(Self {
            passes: members,
            layout,
            framebuffer_period,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            pipelines: Vec::new(),
        })
    }

    pub fn writes_swapchain(&self) -> bool {
        self.layout.swapchain_subpass.is_some()
    }

    fn slice_counts(layout: &RenderPassLayout, textures: &ResourceTable<Texture>) -> Vec<usize> {
        layout.attachments
            .iter()
            .map(|a| textures.get(a.handle).map_or(0, |r| r.slice_count()))
            .collect()
    }

    /// Image views of every framebuffer in the period, in attachment order
    pub fn framebuffer_views(&self, textures: &ResourceTable<Texture>) -> Result<Vec<Vec<vk::ImageView>>> {
        let slice_counts = Self::slice_counts(&self.layout, textures);
        (0..self.framebuffer_period)
            .map(|framebuffer| {
                self.layout.attachments
                    .iter()
                    .zip(slice_indices(framebuffer, &slice_counts))
                    .map(|(attachment, slice)| {
                        textures
                            .get(attachment.handle)
                            .and_then(|r| r.slice(slice))
                            .map(|t| t.view)
                            .ok_or_else(|| eyre!("Attachment {:?} has no slice {}", attachment.handle, slice))
                    })
                    .collect()
            })
            .collect()
    }

    /// Swapchain-bound groups follow the acquired image, all others cycle with the frame counter
    pub fn framebuffer_index(&self, image_index: u32, frame_index: u64) -> usize {
        let period = self.framebuffer_period.max(1);
        if self.writes_swapchain() {
            image_index as usize % period
        } else {
            (frame_index % period as u64) as usize
        }
    }

    pub fn realize_framebuffers(
        &mut self,
        textures: &ResourceTable<Texture>,
        device: &ash::Device,
    ) -> Result<()> {
        let views = self.framebuffer_views(textures)?;
        self.framebuffers = framebuffer::create_framebuffers(
            self.render_pass,
            &views,
            self.layout.extent,
            device,
        )?;
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for pipeline in self.pipelines.drain(..) {
                device.destroy_pipeline(pipeline, None);
            }
            framebuffer::destroy_framebuffers(&self.framebuffers, device);
            self.framebuffers.clear();
            if self.render_pass != vk::RenderPass::null() {
                device.destroy_render_pass(self.render_pass, None);
                self.render_pass = vk::RenderPass::null();
            }
        }
    }
}

/// Splits the live part of `graph` into groups of connected graphics passes.
///
/// Members are in declaration order, which respects every dependency. Groups are
/// ordered by their first member.
pub fn group_passes(graph: &DependencyGraph, passes: &[Pass]) -> Vec<Vec<usize>> {
    let mut assigned = vec![false; graph.pass_count()];
    let mut begin_passes = graph.begin_passes.clone();
    begin_passes.sort_unstable();

    let mut groups = Vec::new();
    for begin in begin_passes {
        if assigned[begin] {
            continue;
        }
        if passes.get(begin).and_then(Pass::as_graphics).is_none() {
            log::warn!("Pass \"{}\" has no implementation, skipping", passes[begin].name());
            assigned[begin] = true;
            continue;
        }

        let mut members = Vec::new();
        let mut queue = VecDeque::from([begin]);
        assigned[begin] = true;
        while let Some(index) = queue.pop_front() {
            members.push(index);
            let neighbours = graph.successors[index]
                .iter()
                .chain(graph.dependencies[index].iter().filter(|d| graph.live[**d]));
            for neighbour in neighbours {
                if assigned[*neighbour] {
                    continue;
                }
                assigned[*neighbour] = true;
                if passes[*neighbour].as_graphics().is_some() {
                    queue.push_back(*neighbour);
                } else {
                    log::warn!("Pass \"{}\" has no implementation, skipping", passes[*neighbour].name());
                }
            }
        }
        members.sort_unstable();
        groups.push(members);
    }

    groups.sort_by_key(|members| members.first().copied());
    groups
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::renderer::contexts::graph_ctx::resource::Resource;
    use crate::renderer::resources::buffer::Buffer;
    use crate::renderer::resources::pipeline::GraphicsPipeline;

    fn graphics(colors: &[TextureHandle], inputs: &[TextureHandle]) -> Pass {
        let mut pass = GraphicsPass::new("Pass", Arc::new(GraphicsPipeline::new()));
        for handle in colors {
            pass.add_color_attachment(*handle);
        }
        for handle in inputs {
            pass.add_input_attachment(*handle);
        }
        Pass::Graphics(pass)
    }

    fn slice() -> Texture {
        Texture::new(
            vk::Format::R8G8B8A8_UNORM,
            64,
            64,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )
    }

    fn table() -> (ResourceTable<Texture>, ResourceTable<Buffer>, TextureHandle) {
        let mut textures = ResourceTable::new();
        let back_buffer = textures.add_external(
            Resource::new("back buffer", false).with_slices(vec![slice(); 3])
        );
        (textures, ResourceTable::new(), back_buffer)
    }

    #[test]
    fn test_chain_forms_one_group() {
        let (mut textures, mut buffers, back_buffer) = table();
        let gbuffer = textures.create("gbuffer", true);
        let passes = [
            graphics(&[gbuffer], &[]),
            graphics(&[back_buffer], &[gbuffer]),
        ];

        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);
        assert_eq!(group_passes(&graph, &passes), vec![vec![0, 1]]);
    }

    #[test]
    fn test_shared_successor_joins_both_begin_passes() {
        let (mut textures, mut buffers, back_buffer) = table();
        let albedo = textures.create("albedo", true);
        let normal = textures.create("normal", true);
        let passes = [
            graphics(&[albedo], &[]),
            graphics(&[normal], &[]),
            graphics(&[back_buffer], &[albedo, normal]),
        ];

        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);
        assert_eq!(graph.begin_passes.len(), 2);
        assert_eq!(group_passes(&graph, &passes), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_independent_roots_form_separate_groups() {
        let (mut textures, mut buffers, back_buffer) = table();
        let passes = [
            graphics(&[back_buffer], &[]),
            graphics(&[back_buffer], &[]),
        ];

        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);
        assert_eq!(group_passes(&graph, &passes), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_framebuffer_selection() {
        let (mut textures, mut buffers, back_buffer) = table();
        let history = textures.create("history", false);
        if let Some(resource) = textures.get_mut(history) {
            resource.set_slices(vec![slice(); 2]).unwrap();
        }
        let offscreen = textures.add_external(
            Resource::new("offscreen", false).with_slices(vec![slice(); 2])
        );
        let passes = [
            graphics(&[back_buffer, history], &[]),
            graphics(&[offscreen], &[]),
        ];
        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);
        let groups = group_passes(&graph, &passes)
            .into_iter()
            .map(|members| PassGroup::plan(members, &passes, &textures, back_buffer, None).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].framebuffer_period, 6);
        assert!(groups[0].writes_swapchain());
        assert_eq!(groups[0].framebuffer_index(2, 7), 2);

        assert_eq!(groups[1].framebuffer_period, 2);
        assert!(!groups[1].writes_swapchain());
        assert_eq!(groups[1].framebuffer_index(2, 7), 1);

        let views = groups[0].framebuffer_views(&textures).unwrap();
        assert_eq!(views.len(), 6);
        assert!(views.iter().all(|attachments| attachments.len() == 2));
    }
}
