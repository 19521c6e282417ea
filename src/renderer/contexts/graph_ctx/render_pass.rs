use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::contexts::graph_ctx::pass::GraphicsPass;
use crate::renderer::contexts::graph_ctx::resource::{ResourceTable, TextureHandle};
use crate::renderer::resources::texture::Texture;

/// What an attachment is cleared to when its render pass begins
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum AttachmentClear {
    #[default]
    None,
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl AttachmentClear {
    pub fn clear_value(&self) -> vk::ClearValue {
        match *self {
            AttachmentClear::None => vk::ClearValue::default(),
            AttachmentClear::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            AttachmentClear::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AttachmentInfo {
    pub handle: TextureHandle,
    pub description: vk::AttachmentDescription,
    pub clear: AttachmentClear,
}

/// Attachment references of one subpass.
///
/// Color references come first and input references follow them in the same array.
#[derive(Clone, Debug, Default)]
pub struct SubpassLayout {
    pub references: Vec<vk::AttachmentReference>,
    pub color_count: usize,
    pub depth_stencil: Option<vk::AttachmentReference>,
}

impl SubpassLayout {
    pub fn color_references(&self) -> &[vk::AttachmentReference] {
        &self.references[..self.color_count]
    }

    pub fn input_references(&self) -> &[vk::AttachmentReference] {
        &self.references[self.color_count..]
    }
}

/// Everything needed to create one native render pass for a group of passes
#[derive(Clone, Debug, Default)]
pub struct RenderPassLayout {
    pub attachments: Vec<AttachmentInfo>,
    pub subpasses: Vec<SubpassLayout>,
    pub dependencies: Vec<vk::SubpassDependency>,
    pub extent: vk::Extent2D,
    /// First subpass writing the swapchain-backed attachment
    pub swapchain_subpass: Option<usize>,
}

impl RenderPassLayout {
    pub fn attachment_index(&self, handle: TextureHandle) -> Option<usize> {
        self.attachments.iter().position(|a| a.handle == handle)
    }

    pub fn clear_values(&self) -> Vec<vk::ClearValue> {
        self.attachments.iter().map(|a| a.clear.clear_value()).collect()
    }

    /// Derives attachment descriptions, subpasses and their dependencies for `passes`,
    /// which share one render pass in the given order
    pub fn synthesize(
        passes: &[&GraphicsPass],
        textures: &ResourceTable<Texture>,
        back_buffer: TextureHandle,
        target_extent: Option<vk::Extent2D>,
    ) -> Result<Self> {
        let mut layout = Self::default();

        for pass in passes {
            for handle in pass.color_attachments.iter() {
                if layout.attachment_index(*handle).is_none() {
                    layout.push_attachment(*handle, textures, back_buffer)?;
                }
            }
            for handle in pass.input_attachments.iter() {
                let index = match layout.attachment_index(*handle) {
                    Some(index) => index,
                    None => layout.push_attachment(*handle, textures, back_buffer)?,
                };
                let description = &mut layout.attachments[index].description;
                if description.load_op == vk::AttachmentLoadOp::DONT_CARE {
                    description.load_op = vk::AttachmentLoadOp::LOAD;
                }
            }
            if let Some(handle) = pass.depth_attachment {
                let index = match layout.attachment_index(handle) {
                    Some(index) => index,
                    None => layout.push_attachment(handle, textures, back_buffer)?,
                };
                let attachment = &mut layout.attachments[index];
                attachment.description.load_op = vk::AttachmentLoadOp::CLEAR;
                attachment.description.final_layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
                attachment.clear = AttachmentClear::DepthStencil { depth: 1.0, stencil: 0 };
            }
            for (color_index, color) in pass.clears.iter() {
                let Some(handle) = pass.cleared_attachment(*color_index) else {
                    log::warn!(
                        "Pass \"{}\": ignoring clear of missing color attachment {}",
                        pass.name,
                        color_index,
                    );
                    continue;
                };
                if let Some(index) = layout.attachment_index(handle) {
                    let attachment = &mut layout.attachments[index];
                    attachment.description.load_op = vk::AttachmentLoadOp::CLEAR;
                    attachment.clear = AttachmentClear::Color(*color);
                }
            }
        }

        layout.extent = layout.min_extent(textures, target_extent)?;

        for (subpass, pass) in passes.iter().enumerate() {
            layout.push_subpass(subpass, pass);
        }

        for (index, attachment) in layout.attachments.iter().enumerate() {
            log::debug!(
                "Attachment {} ({:?}): load {:?}, store {:?}, final {:?}",
                index,
                attachment.handle,
                attachment.description.load_op,
                attachment.description.store_op,
                attachment.description.final_layout,
            );
        }

        Ok(layout)
    }

    fn push_attachment(
        &mut self,
        handle: TextureHandle,
        textures: &ResourceTable<Texture>,
        back_buffer: TextureHandle,
    ) -> Result<usize> {
        let resource = textures
            .get(handle)
            .ok_or_else(|| eyre!("Attachment {:?} is not a registered texture", handle))?;
        let slice = resource
            .slice(0)
            .ok_or_else(|| eyre!("Attachment \"{}\" has no slices", resource.name))?;

        let store_op = if resource.external || !resource.transient {
            vk::AttachmentStoreOp::STORE
        } else {
            vk::AttachmentStoreOp::DONT_CARE
        };
        let final_layout = if handle == back_buffer {
            vk::ImageLayout::PRESENT_SRC_KHR
        } else {
            vk::ImageLayout::ATTACHMENT_OPTIMAL
        };

        self.attachments.push(AttachmentInfo {
            handle,
            description: vk::AttachmentDescription {
                format: slice.format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                store_op,
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout: vk::ImageLayout::UNDEFINED,
                final_layout,
                ..Default::default()
            },
            clear: AttachmentClear::None,
        });
        Ok(self.attachments.len() - 1)
    }

    fn min_extent(
        &self,
        textures: &ResourceTable<Texture>,
        target_extent: Option<vk::Extent2D>,
    ) -> Result<vk::Extent2D> {
        let mut extents = Vec::with_capacity(self.attachments.len());
        for attachment in self.attachments.iter() {
            let resource = textures
                .get(attachment.handle)
                .ok_or_eyre("Attachment is not a registered texture")?;
            let extent = resource
                .slice(0)
                .and_then(|slice| slice.resolved_extent(target_extent))
                .ok_or_else(|| eyre!(
                    "Attachment \"{}\" is swapchain-relative but no target is set",
                    resource.name
                ))?;
            extents.push(extent);
        }

        let min = extents.iter().fold(None, |min: Option<vk::Extent2D>, e| {
            Some(match min {
                Some(m) => vk::Extent2D {
                    width: m.width.min(e.width),
                    height: m.height.min(e.height),
                },
                None => *e,
            })
        });
        if extents.iter().any(|e| Some(*e) != min) {
            log::warn!("Attachments of one render pass differ in size: {:?}", extents);
        }

        Ok(min.unwrap_or_default())
    }

    fn push_subpass(&mut self, subpass: usize, pass: &GraphicsPass) {
        let reference = |handle: &TextureHandle, layout: vk::ImageLayout| {
            self.attachment_index(*handle).map(|index| vk::AttachmentReference {
                attachment: index as u32,
                layout,
            })
        };

        let colors = pass.color_attachments
            .iter()
            .filter_map(|h| reference(h, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
            .collect::<Vec<_>>();
        let inputs = pass.input_attachments
            .iter()
            .filter_map(|h| reference(h, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL))
            .collect::<Vec<_>>();
        let depth_stencil = pass.depth_attachment
            .as_ref()
            .and_then(|h| reference(h, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));

        let writes_swapchain = colors
            .iter()
            .any(|r| self.attachments[r.attachment as usize].description.final_layout == vk::ImageLayout::PRESENT_SRC_KHR);
        if writes_swapchain && self.swapchain_subpass.is_none() {
            self.swapchain_subpass = Some(subpass);
            self.dependencies.push(vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: subpass as u32,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                ..Default::default()
            });
        }

        if depth_stencil.is_some() {
            let fragment_tests = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
            self.dependencies.push(vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: subpass as u32,
                src_stage_mask: fragment_tests,
                dst_stage_mask: fragment_tests,
                src_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_access_mask: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ..Default::default()
            });
        }

        // Attachments this subpass writes that an earlier subpass already wrote
        let writes = colors
            .iter()
            .map(|r| (r.attachment, false))
            .chain(depth_stencil.map(|r| (r.attachment, true)))
            .collect::<Vec<_>>();
        for (attachment, is_depth) in writes {
            let Some(writer) = self.last_writer(attachment) else {
                continue;
            };
            let (stage_mask, write_access, read_access) = if is_depth {
                (
                    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                )
            } else {
                (
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::AccessFlags::COLOR_ATTACHMENT_READ,
                )
            };
            self.merge_dependency(vk::SubpassDependency {
                src_subpass: writer as u32,
                dst_subpass: subpass as u32,
                src_stage_mask: stage_mask,
                dst_stage_mask: stage_mask,
                src_access_mask: write_access,
                dst_access_mask: read_access | write_access,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            });
        }

        // Input attachments written by an earlier subpass of this render pass
        for input in inputs.iter() {
            let Some(writer) = self.last_writer(input.attachment) else {
                continue;
            };
            let writer_is_depth = self.subpasses[writer]
                .depth_stencil
                .is_some_and(|r| r.attachment == input.attachment);
            let (src_stage_mask, src_access_mask) = if writer_is_depth {
                (
                    vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
            } else {
                (
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                )
            };
            self.merge_dependency(vk::SubpassDependency {
                src_subpass: writer as u32,
                dst_subpass: subpass as u32,
                src_stage_mask,
                dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER,
                src_access_mask,
                dst_access_mask: vk::AccessFlags::INPUT_ATTACHMENT_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            });
        }

        let color_count = colors.len();
        let mut references = colors;
        references.extend(inputs);
        self.subpasses.push(SubpassLayout {
            references,
            color_count,
            depth_stencil,
        });
    }

    /// Most recent already-pushed subpass that writes `attachment` as color or depth
    fn last_writer(&self, attachment: u32) -> Option<usize> {
        self.subpasses.iter().rposition(|earlier| {
            earlier.color_references().iter().any(|r| r.attachment == attachment)
                || earlier.depth_stencil.is_some_and(|r| r.attachment == attachment)
        })
    }

    /// One dependency per subpass pair; masks of repeated pairs are combined
    fn merge_dependency(&mut self, dependency: vk::SubpassDependency) {
        let existing = self.dependencies.iter_mut().find(|d| {
            d.src_subpass == dependency.src_subpass && d.dst_subpass == dependency.dst_subpass
        });
        match existing {
            Some(existing) => {
                existing.src_stage_mask |= dependency.src_stage_mask;
                existing.dst_stage_mask |= dependency.dst_stage_mask;
                existing.src_access_mask |= dependency.src_access_mask;
                existing.dst_access_mask |= dependency.dst_access_mask;
                existing.dependency_flags |= dependency.dependency_flags;
            }
            None => self.dependencies.push(dependency),
        }
    }

    pub fn create_render_pass(&self, device: &ash::Device) -> Result<vk::RenderPass> {
        let descriptions = self.attachments
            .iter()
            .map(|a| a.description)
            .collect::<Vec<_>>();
        let subpasses = self.subpasses
            .iter()
            .map(|subpass| {
                let description = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(subpass.color_references())
                    .input_attachments(subpass.input_references());
                match subpass.depth_stencil.as_ref() {
                    Some(depth_stencil) => description.depth_stencil_attachment(depth_stencil),
                    None => description,
                }
            })
            .collect::<Vec<_>>();

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&descriptions)
            .subpasses(&subpasses)
            .dependencies(&self.dependencies);

        Ok(unsafe {
            device.create_render_pass(&render_pass_info, None)?
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::renderer::contexts::graph_ctx::resource::Resource;
    use crate::renderer::resources::pipeline::GraphicsPipeline;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    fn color(textures: &mut ResourceTable<Texture>, name: &str, transient: bool) -> TextureHandle {
        let handle = textures.create(name, transient);
        if let Some(resource) = textures.get_mut(handle) {
            resource
                .set_slices(vec![Texture::swapchain_relative(
                    vk::Format::R16G16B16A16_SFLOAT,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT,
                    vk::ImageAspectFlags::COLOR,
                )])
                .unwrap();
        }
        handle
    }

    fn back_buffer(textures: &mut ResourceTable<Texture>, images: usize) -> TextureHandle {
        let slice = Texture::new(
            vk::Format::B8G8R8A8_SRGB,
            EXTENT.width,
            EXTENT.height,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        );
        textures.add_external(Resource::new("back buffer", false).with_slices(vec![slice; images]))
    }

    fn pass(name: &str) -> GraphicsPass {
        GraphicsPass::new(name, Arc::new(GraphicsPipeline::new()))
    }

    #[test]
    fn test_single_swapchain_pass() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 3);
        let mut present = pass("Present");
        present.add_color_attachment(back_buffer);

        let layout = RenderPassLayout::synthesize(&[&present], &textures, back_buffer, Some(EXTENT)).unwrap();

        assert_eq!(layout.subpasses.len(), 1);
        assert_eq!(layout.attachments.len(), 1);
        let description = layout.attachments[0].description;
        assert_eq!(description.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(description.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(description.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(description.initial_layout, vk::ImageLayout::UNDEFINED);

        assert_eq!(layout.dependencies.len(), 1);
        let dependency = layout.dependencies[0];
        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert_eq!(dependency.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dependency.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(layout.swapchain_subpass, Some(0));
        assert_eq!(layout.extent, EXTENT);
    }

    #[test]
    fn test_color_only_attachment_is_dont_care() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let albedo = color(&mut textures, "albedo", true);
        let mut geometry = pass("Geometry");
        geometry.add_color_attachment(albedo).add_color_attachment(back_buffer);

        let layout = RenderPassLayout::synthesize(&[&geometry], &textures, back_buffer, Some(EXTENT)).unwrap();

        let albedo = &layout.attachments[0];
        assert_eq!(albedo.description.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(albedo.description.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(albedo.description.final_layout, vk::ImageLayout::ATTACHMENT_OPTIMAL);
        assert_eq!(albedo.clear, AttachmentClear::None);
    }

    #[test]
    fn test_input_attachment_is_loaded() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let albedo = color(&mut textures, "albedo", true);
        let normal = color(&mut textures, "normal", false);

        let mut geometry = pass("Geometry");
        geometry.add_color_attachment(albedo).add_color_attachment(normal);
        let mut lighting = pass("Lighting");
        lighting
            .add_color_attachment(back_buffer)
            .add_input_attachment(albedo)
            .add_input_attachment(normal)
            .clear_color_attachment(0, [0.0, 0.0, 0.0, 1.0]);

        let layout = RenderPassLayout::synthesize(
            &[&geometry, &lighting],
            &textures,
            back_buffer,
            Some(EXTENT),
        ).unwrap();

        let load_op = |handle| {
            layout.attachment_index(handle).map(|i| layout.attachments[i].description.load_op)
        };
        assert_eq!(load_op(albedo), Some(vk::AttachmentLoadOp::LOAD));
        assert_eq!(load_op(normal), Some(vk::AttachmentLoadOp::LOAD));
        assert_eq!(load_op(back_buffer), Some(vk::AttachmentLoadOp::CLEAR));

        // Non-transient attachments keep their content
        let normal_index = layout.attachment_index(normal).unwrap();
        assert_eq!(layout.attachments[normal_index].description.store_op, vk::AttachmentStoreOp::STORE);

        let lighting_subpass = &layout.subpasses[1];
        assert_eq!(lighting_subpass.color_count, 1);
        assert_eq!(lighting_subpass.references.len(), 3);
        assert!(lighting_subpass
            .input_references()
            .iter()
            .all(|r| r.layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        assert_eq!(layout.swapchain_subpass, Some(1));
    }

    #[test]
    fn test_input_read_depends_on_writing_subpass_once() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let albedo = color(&mut textures, "albedo", true);
        let normal = color(&mut textures, "normal", true);

        let mut geometry = pass("Geometry");
        geometry.add_color_attachment(albedo).add_color_attachment(normal);
        let mut lighting = pass("Lighting");
        lighting
            .add_color_attachment(back_buffer)
            .add_input_attachment(albedo)
            .add_input_attachment(normal);

        let layout = RenderPassLayout::synthesize(
            &[&geometry, &lighting],
            &textures,
            back_buffer,
            Some(EXTENT),
        ).unwrap();

        let internal = layout.dependencies
            .iter()
            .filter(|d| d.src_subpass != vk::SUBPASS_EXTERNAL)
            .collect::<Vec<_>>();
        assert_eq!(internal.len(), 1);
        assert_eq!(internal[0].src_subpass, 0);
        assert_eq!(internal[0].dst_subpass, 1);
        assert_eq!(internal[0].dst_access_mask, vk::AccessFlags::INPUT_ATTACHMENT_READ);
        assert_eq!(internal[0].dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn test_successive_color_writes_are_ordered() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let shadow = color(&mut textures, "shadow", true);

        let mut shadows = pass("Shadow");
        shadows.add_color_attachment(shadow);
        let mut opaque = pass("Opaque");
        opaque.add_color_attachment(back_buffer).add_input_attachment(shadow);
        let mut transparent = pass("Transparent");
        transparent.add_color_attachment(back_buffer).add_input_attachment(shadow);

        let layout = RenderPassLayout::synthesize(
            &[&shadows, &opaque, &transparent],
            &textures,
            back_buffer,
            Some(EXTENT),
        ).unwrap();

        let pairs = layout.dependencies
            .iter()
            .map(|d| (d.src_subpass, d.dst_subpass))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![(vk::SUBPASS_EXTERNAL, 1), (0, 1), (1, 2), (0, 2)]);

        let overwrite = layout.dependencies[2];
        assert_eq!(overwrite.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(overwrite.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(overwrite.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(
            overwrite.dst_access_mask,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(overwrite.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn test_shared_depth_writes_are_ordered() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let depth = textures.create("depth", true);
        if let Some(resource) = textures.get_mut(depth) {
            resource
                .set_slices(vec![Texture::swapchain_relative(
                    vk::Format::D32_SFLOAT,
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    vk::ImageAspectFlags::DEPTH,
                )])
                .unwrap();
        }
        let albedo = color(&mut textures, "albedo", true);

        let mut prepass = pass("Depth prepass");
        prepass.add_color_attachment(albedo).set_depth_attachment(depth);
        let mut forward = pass("Forward");
        forward.add_color_attachment(back_buffer).set_depth_attachment(depth);

        let layout = RenderPassLayout::synthesize(
            &[&prepass, &forward],
            &textures,
            back_buffer,
            Some(EXTENT),
        ).unwrap();

        let overwrite = layout.dependencies
            .iter()
            .find(|d| d.src_subpass == 0 && d.dst_subpass == 1)
            .copied()
            .unwrap();
        assert!(overwrite.src_stage_mask.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(overwrite.dst_access_mask.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(overwrite.dependency_flags, vk::DependencyFlags::BY_REGION);
    }

    #[test]
    fn test_depth_attachment_is_cleared() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let depth = textures.create("depth", true);
        if let Some(resource) = textures.get_mut(depth) {
            resource
                .set_slices(vec![Texture::swapchain_relative(
                    vk::Format::D32_SFLOAT,
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    vk::ImageAspectFlags::DEPTH,
                )])
                .unwrap();
        }
        let mut forward = pass("Forward");
        forward.add_color_attachment(back_buffer).set_depth_attachment(depth);

        let layout = RenderPassLayout::synthesize(&[&forward], &textures, back_buffer, Some(EXTENT)).unwrap();

        let attachment = &layout.attachments[1];
        assert_eq!(attachment.description.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.description.final_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.clear, AttachmentClear::DepthStencil { depth: 1.0, stencil: 0 });
        assert_eq!(layout.subpasses[0].depth_stencil.map(|r| r.attachment), Some(1));
        assert_eq!(layout.dependencies.len(), 2);
        assert_eq!(layout.clear_values().len(), 2);
    }

    #[test]
    fn test_out_of_range_clear_is_ignored() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let mut present = pass("Present");
        present.add_color_attachment(back_buffer).clear_color_attachment(3, [1.0; 4]);

        let layout = RenderPassLayout::synthesize(&[&present], &textures, back_buffer, Some(EXTENT)).unwrap();

        assert_eq!(layout.attachments[0].description.load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_extent_is_minimum_across_attachments() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let small = textures.create("small", true);
        if let Some(resource) = textures.get_mut(small) {
            resource
                .set_slices(vec![Texture::new(
                    vk::Format::R8G8B8A8_UNORM,
                    1024,
                    256,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT,
                    vk::ImageAspectFlags::COLOR,
                )])
                .unwrap();
        }
        let mut present = pass("Present");
        present.add_color_attachment(back_buffer).add_color_attachment(small);

        let layout = RenderPassLayout::synthesize(&[&present], &textures, back_buffer, Some(EXTENT)).unwrap();

        assert_eq!(layout.extent, vk::Extent2D { width: 800, height: 256 });
    }

    #[test]
    fn test_swapchain_relative_attachment_needs_target() {
        let mut textures = ResourceTable::new();
        let back_buffer = back_buffer(&mut textures, 2);
        let albedo = color(&mut textures, "albedo", true);
        let mut present = pass("Present");
        present.add_color_attachment(back_buffer).add_color_attachment(albedo);

        assert!(RenderPassLayout::synthesize(&[&present], &textures, back_buffer, None).is_err());
    }
}
