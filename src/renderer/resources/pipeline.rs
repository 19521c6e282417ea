use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::resources::shader::Shader;
use crate::renderer::resources::vertex::VertexInputDescription;

/// Description of the programmable and caller-controlled parts of a graphics pipeline.
///
/// The remaining fixed-function state (rasterization, blending, depth testing, viewport)
/// is derived by the graph from the pass the description is attached to.
#[derive(Clone)]
pub struct GraphicsPipeline {
    pub vertex_shader: Option<Arc<Shader>>,
    pub fragment_shader: Option<Arc<Shader>>,
    pub layout: vk::PipelineLayout,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    /// One description per vertex binding, bound at its index
    pub vertex_inputs: Vec<VertexInputDescription>,
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for GraphicsPipeline {
    fn default() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            layout: vk::PipelineLayout::null(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            vertex_inputs: Vec::new(),
            dynamic_states: Vec::new(),
        }
    }
}

impl GraphicsPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vertex_shader(mut self, shader: Arc<Shader>) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn with_fragment_shader(mut self, shader: Arc<Shader>) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_inputs.push(description);
        self
    }

    pub fn with_dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }
}

/// Owning wrapper around a pipeline layout built from descriptor-set layouts and push constants
pub struct PipelineLayout {
    pub layout: vk::PipelineLayout,
    device: Arc<ash::Device>,
}

impl PipelineLayout {
    pub fn new(
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let layout = unsafe {
            device.create_pipeline_layout(&layout_info, None)?
        };

        Ok(Self { layout, device })
    }

    pub fn update_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        stage_flags: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                command_buffer,
                self.layout,
                stage_flags,
                0,
                data,
            );
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// A push-constant range at offset zero covering one `T`
pub fn push_constant_range<T>(stage_flags: vk::ShaderStageFlags) -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags,
        offset: 0,
        size: size_of::<T>() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resources::vertex::VertexInputAttributeFormat;

    #[test]
    fn test_defaults_are_triangle_list_with_back_culling() {
        let pipeline = GraphicsPipeline::new();
        assert_eq!(pipeline.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(pipeline.cull_mode, vk::CullModeFlags::BACK);
        assert!(pipeline.vertex_inputs.is_empty());
    }

    #[test]
    fn test_builder_collects_inputs_and_dedups_dynamic_states() {
        let pipeline = GraphicsPipeline::new()
            .with_cull_mode(vk::CullModeFlags::NONE)
            .with_vertex_input(VertexInputDescription::new(&[
                (0, VertexInputAttributeFormat::Vector2),
            ]))
            .with_dynamic_state(vk::DynamicState::LINE_WIDTH)
            .with_dynamic_state(vk::DynamicState::LINE_WIDTH);

        assert_eq!(pipeline.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(pipeline.vertex_inputs.len(), 1);
        assert_eq!(pipeline.dynamic_states, vec![vk::DynamicState::LINE_WIDTH]);
    }

    #[test]
    fn test_push_constant_range_covers_type() {
        let range = push_constant_range::<[f32; 4]>(vk::ShaderStageFlags::VERTEX);
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 16);
    }
}
