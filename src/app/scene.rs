use std::sync::Arc;
use std::time::Instant;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use glam::{Vec2, Vec3, Vec4};
use winit::window::Window;
use raxa_graph::renderer::contexts::device_ctx::descriptor::{
    DescriptorSetLayout, DescriptorSetLayoutBuilder,
};
use raxa_graph::renderer::resources::buffer::Buffer;
use raxa_graph::renderer::resources::pipeline::{push_constant_range, GraphicsPipeline, PipelineLayout};
use raxa_graph::renderer::resources::shader::Shader;
use raxa_graph::renderer::resources::texture::Texture;
use raxa_graph::renderer::resources::vertex::{VertexInputAttributeFormat, VertexInputDescription};
use raxa_graph::renderer::{FrameStatus, RenderConfig, RenderDeviceContext, RenderGraph};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: Vec2,
    color: Vec3,
}

const VERTICES: [Vertex; 3] = [
    Vertex { position: Vec2::new(0.0, -0.5), color: Vec3::new(1.0, 0.0, 0.0) },
    Vertex { position: Vec2::new(0.5, 0.5), color: Vec3::new(0.0, 1.0, 0.0) },
    Vertex { position: Vec2::new(-0.5, 0.5), color: Vec3::new(0.0, 0.0, 1.0) },
];

const TINT: Vec4 = Vec4::new(1.0, 0.9, 0.8, 1.0);
const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.03, 1.0];

/// A rotating triangle drawn by a one-pass graph straight into the swapchain
pub struct Scene {
    // Field order is drop order: the graph and everything it references go before the device
    graph: RenderGraph,
    descriptor_set: Option<gpu_descriptor::DescriptorSet<vk::DescriptorSet>>,
    _tint_layout: DescriptorSetLayout,
    dev_ctx: RenderDeviceContext,
}

impl Scene {
    pub fn new(window: &Window, config: &RenderConfig) -> Result<Self> {
        let dev_ctx = RenderDeviceContext::new(window, config)?;
        let device = dev_ctx.device.logical.clone();

        let vertex_shader = Arc::new(Shader::from_spirv(
            include_bytes!(concat!(env!("OUT_DIR"), "/shaders/triangle.vert.spv")),
            device.clone(),
        )?);
        let fragment_shader = Arc::new(Shader::from_spirv(
            include_bytes!(concat!(env!("OUT_DIR"), "/shaders/triangle.frag.spv")),
            device.clone(),
        )?);

        let tint_layout = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::FRAGMENT)
            .build(device.clone())?;
        let pipeline_layout = Arc::new(PipelineLayout::new(
            &[tint_layout.layout],
            &[push_constant_range::<f32>(vk::ShaderStageFlags::VERTEX)],
            device.clone(),
        )?);
        let pipeline = Arc::new(
            GraphicsPipeline::new()
                .with_vertex_shader(vertex_shader)
                .with_fragment_shader(fragment_shader)
                .with_pipeline_layout(pipeline_layout.layout)
                .with_cull_mode(vk::CullModeFlags::NONE)
                .with_vertex_input(VertexInputDescription::new(&[
                    (0, VertexInputAttributeFormat::Vector2),
                    (1, VertexInputAttributeFormat::Vector3),
                ])),
        );

        let mut graph = RenderGraph::new(dev_ctx.device.clone(), config.graph)?;
        let back_buffer = graph.set_target(dev_ctx.target.clone());

        let depth = graph.create_texture("Depth", true);
        graph
            .texture_mut(depth)
            .ok_or_eyre("Depth texture missing")?
            .set_slices(vec![Texture::swapchain_relative(
                vk::Format::D32_SFLOAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            )])?;

        let vertices = graph.create_buffer("Triangle vertices", false);
        graph
            .buffer_mut(vertices)
            .ok_or_eyre("Vertex buffer missing")?
            .set_slices(vec![Buffer::new(0, vk::BufferUsageFlags::VERTEX_BUFFER)])?;
        graph.commit_buffer(
            vertices,
            Some(bytemuck::cast_slice(&VERTICES)),
            size_of_val(&VERTICES) as u64,
        )?;

        let tint = graph.create_buffer("Tint", false);
        graph
            .buffer_mut(tint)
            .ok_or_eyre("Tint buffer missing")?
            .set_slices(vec![Buffer::new(
                size_of::<Vec4>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            )])?;
        graph.commit_buffer(tint, Some(bytemuck::bytes_of(&TINT)), 0)?;

        let slice_buffer = |handle| {
            graph
                .buffer(handle)
                .and_then(|r| r.slice(0))
                .map(|slice| slice.buffer)
                .ok_or_eyre("Committed buffer has no slice")
        };
        let vertex_buffer = slice_buffer(vertices)?;
        let tint_buffer = slice_buffer(tint)?;

        let descriptor_set = dev_ctx
            .device
            .with_descriptor_allocator(|allocator| allocator.allocate(&tint_layout, 1))?
            .pop()
            .ok_or_eyre("No descriptor set allocated")?;
        let raw_set = *descriptor_set.raw();
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: tint_buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(raw_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_info);
        unsafe {
            device.update_descriptor_sets(&[write], &[]);
        }

        let start = Instant::now();
        graph
            .create_graphics_pass("Triangle", pipeline)
            .add_color_attachment(back_buffer)
            .set_depth_attachment(depth)
            .clear_color_attachment(0, CLEAR_COLOR)
            .add_buffer_input(vertices)
            .add_buffer_input(tint)
            .set_callback(move |cmd: vk::CommandBuffer, device: &ash::Device, _frame_index: u64| -> Result<()> {
                let angle = start.elapsed().as_secs_f32();
                pipeline_layout.update_push_constants(
                    cmd,
                    vk::ShaderStageFlags::VERTEX,
                    bytemuck::bytes_of(&angle),
                );
                pipeline_layout.bind_descriptor_sets(cmd, 0, &[raw_set]);
                unsafe {
                    device.cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
                    device.cmd_draw(cmd, VERTICES.len() as u32, 1, 0, 0);
                }
                Ok(())
            });

        if !graph.build() {
            return Err(eyre!("Failed to build the render graph"));
        }

        Ok(Self {
            graph,
            descriptor_set: Some(descriptor_set),
            _tint_layout: tint_layout,
            dev_ctx,
        })
    }

    pub fn draw(&mut self) -> Result<()> {
        match self.graph.execute()? {
            FrameStatus::Presented | FrameStatus::Skipped => {}
            FrameStatus::OutOfDate => {
                log::warn!("Swapchain is out of date; the window surface changed");
            }
        }
        Ok(())
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        if let Err(e) = self.dev_ctx.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
        if let Some(set) = self.descriptor_set.take() {
            let freed = self.dev_ctx.device.with_descriptor_allocator(|allocator| {
                allocator.free([set]);
                Ok(())
            });
            if let Err(e) = freed {
                log::error!("Failed to free descriptor set: {}", e);
            }
        }
    }
}
