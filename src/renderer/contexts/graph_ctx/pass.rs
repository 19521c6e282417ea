use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use smallvec::SmallVec;
use crate::renderer::contexts::graph_ctx::resource::{BufferHandle, TextureHandle};
use crate::renderer::resources::pipeline::GraphicsPipeline;

/// Per-frame draw logic of a pass.
///
/// Invoked once per frame inside the pass's subpass with its pipeline already bound.
/// Implementations must not begin or end render passes.
pub trait RenderCallback {
    fn record(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &ash::Device,
        frame_index: u64,
    ) -> Result<()>;
}

impl<F> RenderCallback for F
where
    F: FnMut(vk::CommandBuffer, &ash::Device, u64) -> Result<()>,
{
    fn record(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &ash::Device,
        frame_index: u64,
    ) -> Result<()> {
        self(cmd, device, frame_index)
    }
}

pub enum Pass {
    Graphics(GraphicsPass),
    Compute,
    RayTracing,
}

impl Pass {
    pub fn as_graphics(&self) -> Option<&GraphicsPass> {
        match self {
            Pass::Graphics(pass) => Some(pass),
            _ => None,
        }
    }

    pub fn as_graphics_mut(&mut self) -> Option<&mut GraphicsPass> {
        match self {
            Pass::Graphics(pass) => Some(pass),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Pass::Graphics(pass) => &pass.name,
            Pass::Compute => "compute",
            Pass::RayTracing => "ray tracing",
        }
    }
}

pub struct GraphicsPass {
    pub name: String,
    pub pipeline: Arc<GraphicsPipeline>,
    pub color_attachments: SmallVec<[TextureHandle; 4]>,
    pub input_attachments: SmallVec<[TextureHandle; 4]>,
    pub depth_attachment: Option<TextureHandle>,
    /// (color attachment index as declared, clear color)
    pub clears: Vec<(usize, [f32; 4])>,
    pub buffer_inputs: Vec<BufferHandle>,
    // Declared color indices that were null and never stored
    null_colors: SmallVec<[usize; 4]>,
    callback: Option<Box<dyn RenderCallback>>,
}

impl GraphicsPass {
    pub fn new(name: &str, pipeline: Arc<GraphicsPipeline>) -> Self {
        Self {
            name: name.to_owned(),
            pipeline,
            color_attachments: SmallVec::new(),
            input_attachments: SmallVec::new(),
            depth_attachment: None,
            clears: Vec::new(),
            buffer_inputs: Vec::new(),
            null_colors: SmallVec::new(),
            callback: None,
        }
    }

    pub fn add_color_attachment(&mut self, handle: TextureHandle) -> &mut Self {
        if handle.is_null() {
            log::warn!("Pass \"{}\": ignoring null color attachment", self.name);
            self.null_colors.push(self.color_attachments.len() + self.null_colors.len());
        } else {
            self.color_attachments.push(handle);
        }
        self
    }

    pub fn add_input_attachment(&mut self, handle: TextureHandle) -> &mut Self {
        if handle.is_null() {
            log::warn!("Pass \"{}\": ignoring null input attachment", self.name);
        } else {
            self.input_attachments.push(handle);
        }
        self
    }

    pub fn set_depth_attachment(&mut self, handle: TextureHandle) -> &mut Self {
        if handle.is_null() {
            log::warn!("Pass \"{}\": ignoring null depth attachment", self.name);
        } else {
            self.depth_attachment = Some(handle);
        }
        self
    }

    /// Clear the `index`th color attachment to `color` when the render pass begins
    pub fn clear_color_attachment(&mut self, index: usize, color: [f32; 4]) -> &mut Self {
        self.clears.push((index, color));
        self
    }

    pub fn add_buffer_input(&mut self, handle: BufferHandle) -> &mut Self {
        if handle.is_null() {
            log::warn!("Pass \"{}\": ignoring null buffer input", self.name);
        } else {
            self.buffer_inputs.push(handle);
        }
        self
    }

    pub fn set_callback<C>(&mut self, callback: C) -> &mut Self
    where
        C: RenderCallback + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn record(
        &mut self,
        cmd: vk::CommandBuffer,
        device: &ash::Device,
        frame_index: u64,
    ) -> Result<()> {
        match self.callback.as_mut() {
            Some(callback) => callback.record(cmd, device, frame_index),
            None => Ok(()),
        }
    }

    /// The attachment a clear declared against color index `index` applies to.
    /// Indices count null attachments too, so a skipped handle does not shift later clears.
    pub fn cleared_attachment(&self, index: usize) -> Option<TextureHandle> {
        if self.null_colors.contains(&index) {
            return None;
        }
        let skipped = self.null_colors.iter().filter(|null| **null < index).count();
        self.color_attachments.get(index - skipped).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::graph_ctx::resource::{Handle, ResourceTable};
    use crate::renderer::resources::texture::Texture;

    #[test]
    fn test_null_handles_are_ignored() {
        let mut pass = GraphicsPass::new("Null", Arc::new(GraphicsPipeline::new()));
        pass.add_color_attachment(Handle::NULL)
            .add_input_attachment(Handle::NULL)
            .set_depth_attachment(Handle::NULL)
            .add_buffer_input(Handle::NULL);

        assert!(pass.color_attachments.is_empty());
        assert!(pass.input_attachments.is_empty());
        assert!(pass.depth_attachment.is_none());
        assert!(pass.buffer_inputs.is_empty());
    }

    #[test]
    fn test_clears_keep_declared_indices_after_null_color() {
        let mut textures = ResourceTable::<Texture>::new();
        let albedo = textures.create("albedo", true);
        let normal = textures.create("normal", true);

        let mut pass = GraphicsPass::new("Geometry", Arc::new(GraphicsPipeline::new()));
        pass.add_color_attachment(albedo)
            .add_color_attachment(Handle::NULL)
            .add_color_attachment(normal)
            .clear_color_attachment(2, [0.0; 4])
            .clear_color_attachment(1, [1.0; 4]);

        assert_eq!(pass.color_attachments.len(), 2);
        assert_eq!(pass.cleared_attachment(0), Some(albedo));
        assert_eq!(pass.cleared_attachment(1), None);
        assert_eq!(pass.cleared_attachment(2), Some(normal));
        assert_eq!(pass.cleared_attachment(3), None);
    }

    #[test]
    fn test_pass_variants() {
        let mut pass = GraphicsPass::new("Callback", Arc::new(GraphicsPipeline::new()));
        assert!(!pass.has_callback());

        pass.set_callback(|_: vk::CommandBuffer, _: &ash::Device, _: u64| -> Result<()> { Ok(()) });
        assert!(pass.has_callback());

        let pass = Pass::Graphics(pass);
        assert_eq!(pass.name(), "Callback");
        assert!(pass.as_graphics().is_some());
        assert!(Pass::Compute.as_graphics().is_none());
        assert!(Pass::RayTracing.as_graphics().is_none());
    }
}
