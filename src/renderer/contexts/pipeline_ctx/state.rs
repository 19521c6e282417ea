use ash::vk;
use crate::renderer::resources::pipeline::GraphicsPipeline;

/// Fixed-function state of one subpass pipeline, derived from the pass it belongs to
pub struct PipelineState {
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'static>,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo<'static>,
    pub multisample: vk::PipelineMultisampleStateCreateInfo<'static>,
    pub color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState>,
    pub depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl PipelineState {
    pub fn derive(
        pipeline: &GraphicsPipeline,
        color_attachment_count: usize,
        has_depth_attachment: bool,
        extent: vk::Extent2D,
    ) -> Self {
        let (vertex_bindings, vertex_attributes) = pipeline.vertex_inputs
            .iter()
            .enumerate()
            .map(|(binding, description)| description.describe(binding as u32))
            .fold((Vec::new(), Vec::new()), |(mut bindings, mut attributes), (b, a)| {
                bindings.push(b);
                attributes.extend(a);
                (bindings, attributes)
            });

        let depth_stencil = if has_depth_attachment {
            default_depth_stencil_info()
        } else {
            disabled_depth_stencil_info()
        };

        Self {
            vertex_bindings,
            vertex_attributes,
            input_assembly: vk::PipelineInputAssemblyStateCreateInfo::default()
                .topology(pipeline.topology)
                .primitive_restart_enable(false),
            rasterization: default_rasterization_info().cull_mode(pipeline.cull_mode),
            multisample: default_multisample_info(),
            color_blend_attachments: vec![default_color_blend_state(); color_attachment_count],
            depth_stencil,
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            dynamic_states: pipeline.dynamic_states.clone(),
        }
    }
}

fn default_rasterization_info() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        // Discards all primitives before rasterization stage if true
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .front_face(vk::FrontFace::CLOCKWISE)
        // No depth bias
        .depth_bias_enable(false)
        .depth_bias_constant_factor(0.0)
        .depth_bias_clamp(0.0)
        .depth_bias_slope_factor(0.0)
}

fn default_color_blend_state() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
}

fn default_multisample_info() -> vk::PipelineMultisampleStateCreateInfo<'static> {
    vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        // 1 sample per pixel means no multisampling
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .min_sample_shading(1.0)
        .alpha_to_coverage_enable(false)
        .alpha_to_one_enable(false)
}

fn default_depth_stencil_info() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(true)
        .depth_write_enable(true)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0)
        .stencil_test_enable(false)
}

fn disabled_depth_stencil_info() -> vk::PipelineDepthStencilStateCreateInfo<'static> {
    vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(false)
        .depth_write_enable(false)
        .depth_compare_op(vk::CompareOp::NEVER)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resources::vertex::{VertexInputAttributeFormat, VertexInputDescription};

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 640, height: 480 };

    #[test]
    fn test_fixed_function_defaults() {
        let pipeline = GraphicsPipeline::new()
            .with_input_topology(vk::PrimitiveTopology::LINE_LIST)
            .with_cull_mode(vk::CullModeFlags::NONE);
        let state = PipelineState::derive(&pipeline, 2, false, EXTENT);

        assert_eq!(state.input_assembly.topology, vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(state.rasterization.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(state.rasterization.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(state.rasterization.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.rasterization.depth_bias_enable, vk::FALSE);
        assert_eq!(state.multisample.rasterization_samples, vk::SampleCountFlags::TYPE_1);

        assert_eq!(state.color_blend_attachments.len(), 2);
        assert!(state.color_blend_attachments.iter().all(|blend| {
            blend.blend_enable == vk::FALSE && blend.color_write_mask == vk::ColorComponentFlags::RGBA
        }));
        assert_eq!(state.depth_stencil.depth_test_enable, vk::FALSE);
        assert_eq!(state.depth_stencil.depth_write_enable, vk::FALSE);
        assert_eq!(state.scissor.extent, EXTENT);
        assert_eq!(state.viewport.width, 640.0);
    }

    #[test]
    fn test_depth_attachment_enables_depth_testing() {
        let state = PipelineState::derive(&GraphicsPipeline::new(), 1, true, EXTENT);

        assert_eq!(state.depth_stencil.depth_test_enable, vk::TRUE);
        assert_eq!(state.depth_stencil.depth_write_enable, vk::TRUE);
        assert_eq!(state.depth_stencil.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
    }

    #[test]
    fn test_vertex_inputs_bind_in_order() {
        let pipeline = GraphicsPipeline::new()
            .with_vertex_input(VertexInputDescription::new(&[
                (0, VertexInputAttributeFormat::Vector2),
                (1, VertexInputAttributeFormat::Vector3),
            ]))
            .with_vertex_input(VertexInputDescription::new(&[
                (2, VertexInputAttributeFormat::Vector4),
            ]))
            .with_dynamic_state(vk::DynamicState::LINE_WIDTH);
        let state = PipelineState::derive(&pipeline, 1, false, EXTENT);

        assert_eq!(state.vertex_bindings.len(), 2);
        assert_eq!(state.vertex_bindings[0].stride, 20);
        assert_eq!(state.vertex_bindings[1].binding, 1);
        let attributes = state.vertex_attributes
            .iter()
            .map(|a| (a.location, a.binding, a.offset))
            .collect::<Vec<_>>();
        assert_eq!(attributes, vec![(0, 0, 0), (1, 0, 8), (2, 1, 0)]);
        assert_eq!(state.dynamic_states, vec![vk::DynamicState::LINE_WIDTH]);
    }
}
