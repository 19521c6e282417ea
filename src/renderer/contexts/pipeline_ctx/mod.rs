pub mod state;

use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use crate::renderer::contexts::pipeline_ctx::state::PipelineState;
use crate::renderer::resources::pipeline::GraphicsPipeline;

/// Responsibilities:
/// - Own the pipeline cache shared by every group of a graph
/// - Create the pipelines of one render pass in a single batched call
pub struct RenderPipelineContext {
    cache: vk::PipelineCache,
    device: Arc<ash::Device>,
}

impl RenderPipelineContext {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let cache = unsafe {
            device.create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None)?
        };
        Ok(Self { cache, device })
    }

    /// Creates one pipeline per `(description, state)` pair, pipeline `i` targeting subpass `i`
    pub fn create_group_pipelines(
        &self,
        pipelines: &[(&GraphicsPipeline, PipelineState)],
        render_pass: vk::RenderPass,
    ) -> Result<Vec<vk::Pipeline>> {
        if pipelines.is_empty() {
            return Ok(Vec::new());
        }

        let shader_stages = pipelines
            .iter()
            .map(|(description, _)| -> Result<[vk::PipelineShaderStageCreateInfo; 2]> {
                let vertex = description
                    .vertex_shader
                    .as_ref()
                    .ok_or_eyre("Graphics pipeline has no vertex shader")?;
                let fragment = description
                    .fragment_shader
                    .as_ref()
                    .ok_or_eyre("Graphics pipeline has no fragment shader")?;
                Ok([
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(vk::ShaderStageFlags::VERTEX)
                        .module(vertex.module)
                        .name(vertex.entry_point()),
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(vk::ShaderStageFlags::FRAGMENT)
                        .module(fragment.module)
                        .name(fragment.entry_point()),
                ])
            })
            .collect::<Result<Vec<_>>>()?;

        let vertex_inputs = pipelines
            .iter()
            .map(|(_, state)| {
                vk::PipelineVertexInputStateCreateInfo::default()
                    .vertex_binding_descriptions(&state.vertex_bindings)
                    .vertex_attribute_descriptions(&state.vertex_attributes)
            })
            .collect::<Vec<_>>();
        let viewports = pipelines
            .iter()
            .map(|(_, state)| {
                vk::PipelineViewportStateCreateInfo::default()
                    .viewports(std::slice::from_ref(&state.viewport))
                    .scissors(std::slice::from_ref(&state.scissor))
            })
            .collect::<Vec<_>>();
        let color_blends = pipelines
            .iter()
            .map(|(_, state)| {
                vk::PipelineColorBlendStateCreateInfo::default()
                    .logic_op_enable(false)
                    .logic_op(vk::LogicOp::COPY)
                    .attachments(&state.color_blend_attachments)
            })
            .collect::<Vec<_>>();
        let dynamic_states = pipelines
            .iter()
            .map(|(_, state)| {
                vk::PipelineDynamicStateCreateInfo::default()
                    .dynamic_states(&state.dynamic_states)
            })
            .collect::<Vec<_>>();

        let pipeline_infos = pipelines
            .iter()
            .enumerate()
            .map(|(subpass, (description, state))| {
                vk::GraphicsPipelineCreateInfo::default()
                    .stages(&shader_stages[subpass])
                    .vertex_input_state(&vertex_inputs[subpass])
                    .input_assembly_state(&state.input_assembly)
                    .viewport_state(&viewports[subpass])
                    .rasterization_state(&state.rasterization)
                    .multisample_state(&state.multisample)
                    .color_blend_state(&color_blends[subpass])
                    .depth_stencil_state(&state.depth_stencil)
                    .dynamic_state(&dynamic_states[subpass])
                    .layout(description.layout)
                    .render_pass(render_pass)
                    .subpass(subpass as u32)
            })
            .collect::<Vec<_>>();

        let result = unsafe {
            self.device.create_graphics_pipelines(self.cache, &pipeline_infos, None)
        };
        match result {
            Ok(pipelines) => Ok(pipelines),
            Err((pipelines, err)) => {
                for pipeline in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                    unsafe {
                        self.device.destroy_pipeline(pipeline, None);
                    }
                }
                Err(eyre!("Failed to create graphics pipelines: {}", err))
            }
        }
    }
}

impl Drop for RenderPipelineContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_cache(self.cache, None);
        }
    }
}
