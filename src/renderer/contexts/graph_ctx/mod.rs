pub mod dependency;
pub mod framebuffer;
pub mod group;
pub mod pass;
pub mod render_pass;
pub mod resource;

use std::collections::HashSet;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::MemoryLocation;
use crate::renderer::config::GraphConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::contexts::frame_ctx::{should_execute, FrameStatus, RenderFrameContext};
use crate::renderer::contexts::graph_ctx::dependency::DependencyGraph;
use crate::renderer::contexts::graph_ctx::group::{group_passes, PassGroup};
use crate::renderer::contexts::graph_ctx::pass::{GraphicsPass, Pass};
use crate::renderer::contexts::graph_ctx::resource::{
    BufferHandle, Resource, ResourceTable, TextureHandle,
};
use crate::renderer::contexts::pipeline_ctx::state::PipelineState;
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::internals::buffer::AllocatedBuffer;
use crate::renderer::internals::image::{AllocatedImage, ImageCreateInfo};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::pipeline::GraphicsPipeline;
use crate::renderer::resources::texture::Texture;

/// Derives the pass groups of a graph without touching the device.
///
/// Native handles of the returned groups are null.
pub fn compile(
    passes: &[Pass],
    textures: &mut ResourceTable<Texture>,
    buffers: &mut ResourceTable<Buffer>,
    back_buffer: TextureHandle,
    target_extent: Option<vk::Extent2D>,
) -> Result<Vec<PassGroup>> {
    let graph = DependencyGraph::build(passes, textures, buffers);
    group_passes(&graph, passes)
        .into_iter()
        .map(|members| PassGroup::plan(members, passes, textures, back_buffer, target_extent))
        .collect()
}

/// Collaborator-owned and transient resources are never committed
pub fn should_commit<T>(resource: &Resource<T>) -> bool {
    !resource.transient && !resource.external
}

/// Bytes an upload into `slice` at `extent` copies. Fails when `len` cannot cover them.
pub fn texture_upload_size(slice: &Texture, extent: vk::Extent2D, len: usize) -> Result<u64> {
    let texel_size = slice
        .texel_size()
        .ok_or_else(|| eyre!("Uploads into {:?} textures are not supported", slice.format))?;
    let required = extent.width as u64 * extent.height as u64 * texel_size;
    if (len as u64) < required {
        return Err(eyre!(
            "Texture upload has {} bytes, {}x{} {:?} needs {}",
            len,
            extent.width,
            extent.height,
            slice.format,
            required,
        ));
    }
    Ok(required)
}

/// Responsibilities:
/// - Own the declared resources and passes
/// - Turn them into render passes, framebuffers and pipelines on `build`
/// - Record and present one frame per `execute`
pub struct RenderGraph {
    frame_ctx: Option<RenderFrameContext>,
    groups: Vec<PassGroup>,
    // Graph-allocated backing of transient attachments: (texture, slice, image)
    transient_images: Vec<(TextureHandle, usize, AllocatedImage)>,
    pipeline_ctx: RenderPipelineContext,
    committed_buffers: Vec<AllocatedBuffer>,
    committed_images: Vec<AllocatedImage>,
    transfer_ctx: TransferContext,

    textures: ResourceTable<Texture>,
    buffers: ResourceTable<Buffer>,
    passes: Vec<Pass>,
    back_buffer: TextureHandle,
    target: Option<Arc<RenderTarget>>,
    complete: bool,

    config: GraphConfig,
    device: Arc<RenderDevice>,
}

impl RenderGraph {
    pub fn new(device: Arc<RenderDevice>, config: GraphConfig) -> Result<Self> {
        if config.frames_in_flight == 0 {
            return Err(eyre!("A render graph needs at least one frame in flight"));
        }

        let pipeline_ctx = RenderPipelineContext::new(device.logical.clone())?;
        let transfer_ctx = TransferContext::new(
            device.graphics_queue.clone(),
            device.logical.clone(),
        )?;

        Ok(Self {
            frame_ctx: None,
            groups: Vec::new(),
            transient_images: Vec::new(),
            pipeline_ctx,
            committed_buffers: Vec::new(),
            committed_images: Vec::new(),
            transfer_ctx,
            textures: ResourceTable::new(),
            buffers: ResourceTable::new(),
            passes: Vec::new(),
            back_buffer: TextureHandle::NULL,
            target: None,
            complete: false,
            config,
            device,
        })
    }

    pub fn create_texture(&mut self, name: &str, transient: bool) -> TextureHandle {
        self.textures.create(name, transient)
    }

    pub fn create_buffer(&mut self, name: &str, transient: bool) -> BufferHandle {
        self.buffers.create(name, transient)
    }

    pub fn add_external_texture(&mut self, resource: Resource<Texture>) -> TextureHandle {
        self.textures.add_external(resource)
    }

    pub fn add_external_buffer(&mut self, resource: Resource<Buffer>) -> BufferHandle {
        self.buffers.add_external(resource)
    }

    pub fn texture_handle(&self, resource: &Resource<Texture>) -> TextureHandle {
        self.textures.handle_of(resource)
    }

    pub fn buffer_handle(&self, resource: &Resource<Buffer>) -> BufferHandle {
        self.buffers.handle_of(resource)
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&Resource<Texture>> {
        self.textures.get(handle)
    }

    pub fn texture_mut(&mut self, handle: TextureHandle) -> Option<&mut Resource<Texture>> {
        self.textures.get_mut(handle)
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&Resource<Buffer>> {
        self.buffers.get(handle)
    }

    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Option<&mut Resource<Buffer>> {
        self.buffers.get_mut(handle)
    }

    /// Registers the target's back buffer and makes it the presented attachment
    pub fn set_target(&mut self, target: Arc<RenderTarget>) -> TextureHandle {
        let handle = self.textures.add_external(target.back_buffer.clone());
        self.back_buffer = handle;
        self.target = Some(target);
        handle
    }

    pub fn back_buffer(&self) -> TextureHandle {
        self.back_buffer
    }

    /// Declares a graphics pass after all previously declared passes
    pub fn create_graphics_pass(
        &mut self,
        name: &str,
        pipeline: Arc<GraphicsPipeline>,
    ) -> &mut GraphicsPass {
        self.passes.push(Pass::Graphics(GraphicsPass::new(name, pipeline)));
        match self.passes.last_mut() {
            Some(Pass::Graphics(pass)) => pass,
            _ => unreachable!("a graphics pass was just pushed"),
        }
    }

    pub fn add_pass(&mut self, pass: Pass) {
        self.passes.push(pass);
    }

    pub fn groups(&self) -> &[PassGroup] {
        &self.groups
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Allocates GPU memory for every slice of a buffer and uploads `initial` into each.
    /// Slices without a size get `size`.
    pub fn commit_buffer(
        &mut self,
        handle: BufferHandle,
        initial: Option<&[u8]>,
        size: u64,
    ) -> Result<()> {
        let resource = self.buffers
            .get_mut(handle)
            .ok_or_else(|| eyre!("Buffer {:?} is not registered", handle))?;
        if !should_commit(resource) {
            log::debug!("Not committing buffer \"{}\": transient or external", resource.name);
            return Ok(());
        }
        if resource.slice_count() == 0 {
            return Err(eyre!("Buffer \"{}\" has no slices", resource.name));
        }

        let name = resource.name.clone();
        for slice in resource.slices_mut() {
            if slice.is_realized() {
                continue;
            }
            if slice.size == 0 {
                slice.size = size;
            }
            let mut usage = slice.usage;
            if initial.is_some() {
                usage |= vk::BufferUsageFlags::TRANSFER_DST;
            }

            let allocated = AllocatedBuffer::new(
                slice.size,
                usage,
                &name,
                MemoryLocation::GpuOnly,
                self.device.memory_allocator(),
                self.device.logical.clone(),
            )?;

            if let Some(data) = initial {
                let copy_size = slice.size.min(data.len() as u64);
                let mut staging = AllocatedBuffer::new(
                    copy_size,
                    vk::BufferUsageFlags::TRANSFER_SRC,
                    "Buffer staging",
                    MemoryLocation::CpuToGpu,
                    self.device.memory_allocator(),
                    self.device.logical.clone(),
                )?;
                staging.write(&data[..copy_size as usize], 0)?;

                self.transfer_ctx.immediate_submit(|cmd, device| {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: copy_size,
                    };
                    unsafe {
                        device.cmd_copy_buffer(cmd, staging.buffer, allocated.buffer, &[region]);
                    }
                    Ok(())
                })?;
            }

            slice.buffer = allocated.buffer;
            self.committed_buffers.push(allocated);
        }

        log::info!("Committed buffer \"{}\"", name);
        Ok(())
    }

    /// Creates an image and view for every slice of a texture, uploading `initial` if given
    pub fn commit_texture(
        &mut self,
        handle: TextureHandle,
        initial: Option<&[u8]>,
    ) -> Result<()> {
        let target_extent = self.target.as_ref().map(|t| t.extent);
        let resource = self.textures
            .get_mut(handle)
            .ok_or_else(|| eyre!("Texture {:?} is not registered", handle))?;
        if !should_commit(resource) {
            log::debug!("Not committing texture \"{}\": transient or external", resource.name);
            return Ok(());
        }
        if resource.slice_count() == 0 {
            return Err(eyre!("Texture \"{}\" has no slices", resource.name));
        }

        let name = resource.name.clone();
        for slice in resource.slices_mut() {
            if slice.is_realized() {
                continue;
            }
            let extent = slice
                .resolved_extent(target_extent)
                .ok_or_else(|| eyre!("Texture \"{}\" is swapchain-relative but no target is set", name))?;
            let upload = match initial {
                Some(data) => Some(&data[..texture_upload_size(slice, extent, data.len())? as usize]),
                None => None,
            };
            let mut usage = slice.usage;
            if upload.is_some() {
                usage |= vk::ImageUsageFlags::TRANSFER_DST;
            }

            let allocated = AllocatedImage::new(
                &ImageCreateInfo {
                    format: slice.format,
                    extent,
                    usage,
                    aspect: slice.aspect,
                    name: &name,
                },
                self.device.memory_allocator(),
                self.device.logical.clone(),
            )?;
            if let Some(data) = upload {
                allocated.upload(data, &self.transfer_ctx)?;
            }

            slice.image = allocated.image;
            slice.view = allocated.view;
            self.committed_images.push(allocated);
        }

        log::info!("Committed texture \"{}\"", name);
        Ok(())
    }

    /// Rebuilds every group from the current declarations.
    ///
    /// On failure the error is logged, everything created so far is torn down
    /// and `execute` becomes a no-op until the next successful build.
    pub fn build(&mut self) -> bool {
        self.destroy();

        match self.try_build() {
            Ok(()) => {
                self.complete = true;
                log::info!(
                    "Built render graph: {} passes in {} groups",
                    self.passes.len(),
                    self.groups.len(),
                );
                for (index, group) in self.groups.iter().enumerate() {
                    log::info!(
                        "Group {}: {} subpasses, {} attachments, {} framebuffers",
                        index,
                        group.layout.subpasses.len(),
                        group.layout.attachments.len(),
                        group.framebuffers.len(),
                    );
                }
                true
            }
            Err(e) => {
                log::error!("Failed to build render graph: {:?}", e);
                self.destroy();
                false
            }
        }
    }

    fn try_build(&mut self) -> Result<()> {
        let target_extent = self.target.as_ref().map(|t| t.extent);
        self.groups = compile(
            &self.passes,
            &mut self.textures,
            &mut self.buffers,
            self.back_buffer,
            target_extent,
        )?;
        self.allocate_transient_attachments(target_extent)?;

        let logical = self.device.logical.clone();
        for group in self.groups.iter_mut() {
            group.render_pass = group.layout.create_render_pass(&logical)?;
            group.realize_framebuffers(&self.textures, &logical)?;

            let mut pipelines = Vec::with_capacity(group.passes.len());
            for (index, subpass) in group.passes.iter().zip(group.layout.subpasses.iter()) {
                let pass = self.passes
                    .get(*index)
                    .and_then(Pass::as_graphics)
                    .ok_or_eyre("Grouped pass is not a graphics pass")?;
                let state = PipelineState::derive(
                    &pass.pipeline,
                    subpass.color_count,
                    subpass.depth_stencil.is_some(),
                    group.layout.extent,
                );
                pipelines.push((pass.pipeline.as_ref(), state));
            }
            group.pipelines = self.pipeline_ctx.create_group_pipelines(&pipelines, group.render_pass)?;
        }

        self.frame_ctx = Some(RenderFrameContext::new(
            &self.config,
            self.device.graphics_queue.clone(),
            logical,
        )?);

        Ok(())
    }

    /// Backs transient attachments that have no image yet with graph-owned images
    fn allocate_transient_attachments(&mut self, target_extent: Option<vk::Extent2D>) -> Result<()> {
        let read_as_input = self.groups
            .iter()
            .flat_map(|group| group.passes.iter())
            .filter_map(|index| self.passes.get(*index).and_then(Pass::as_graphics))
            .flat_map(|pass| pass.input_attachments.iter().copied())
            .collect::<HashSet<_>>();
        let mut attachments = self.groups
            .iter()
            .flat_map(|group| group.layout.attachments.iter().map(|a| a.handle))
            .collect::<Vec<_>>();
        attachments.dedup();

        for handle in attachments {
            let Some(resource) = self.textures.get_mut(handle) else {
                continue;
            };
            if !resource.transient || resource.external {
                continue;
            }

            let name = resource.name.clone();
            for (index, slice) in resource.slices_mut().iter_mut().enumerate() {
                if slice.is_realized() || self.transient_images.iter().any(|(h, i, _)| *h == handle && *i == index) {
                    continue;
                }
                let extent = slice
                    .resolved_extent(target_extent)
                    .ok_or_eyre("Swapchain-relative attachment without a target")?;

                let attachment_usage = if slice.is_depth() {
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                } else {
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                };
                let mut usage = attachment_usage | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
                if read_as_input.contains(&handle) {
                    usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
                }

                let image = AllocatedImage::new(
                    &ImageCreateInfo {
                        format: slice.format,
                        extent,
                        usage,
                        aspect: slice.aspect,
                        name: &name,
                    },
                    self.device.memory_allocator(),
                    self.device.logical.clone(),
                )?;
                slice.image = image.image;
                slice.view = image.view;
                self.transient_images.push((handle, index, image));
            }
        }

        Ok(())
    }

    /// Tears down groups, graph-owned attachments and the frame executor.
    /// Declarations stay, so `build` can be called again.
    pub fn destroy(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }

        self.frame_ctx = None;
        for group in self.groups.iter_mut() {
            group.destroy(&self.device.logical);
        }
        self.groups.clear();

        for (handle, index, _image) in self.transient_images.drain(..) {
            if let Some(slice) = self.textures.get_mut(handle).and_then(|r| r.slice_mut(index)) {
                slice.image = vk::Image::null();
                slice.view = vk::ImageView::null();
            }
        }

        self.complete = false;
    }

    /// Records and presents one frame
    pub fn execute(&mut self) -> Result<FrameStatus> {
        if !should_execute(self.complete, self.groups.len()) {
            return Ok(FrameStatus::Skipped);
        }
        let target = self.target
            .as_ref()
            .ok_or_eyre("Render graph has no presentation target")?;
        let frame_ctx = self.frame_ctx
            .as_mut()
            .ok_or_eyre("Render graph has no frame context")?;

        frame_ctx.execute(&self.groups, &mut self.passes, target)
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        self.destroy();
    }
}
