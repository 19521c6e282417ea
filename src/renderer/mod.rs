pub mod config;
pub mod contexts;
pub mod internals;
pub mod resources;

pub use crate::renderer::config::{GraphConfig, RenderConfig};
pub use crate::renderer::contexts::device_ctx::RenderDeviceContext;
pub use crate::renderer::contexts::frame_ctx::FrameStatus;
pub use crate::renderer::contexts::graph_ctx::pass::{GraphicsPass, Pass, RenderCallback};
pub use crate::renderer::contexts::graph_ctx::resource::{
    BufferHandle, Resource, TextureHandle,
};
pub use crate::renderer::contexts::graph_ctx::RenderGraph;
