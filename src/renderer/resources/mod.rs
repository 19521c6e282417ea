/// "Resources" are plain descriptions the caller hands to the graph.
/// They do not own GPU memory, with the exception of shaders and pipeline layouts.

pub mod buffer;
pub mod pipeline;
pub mod shader;
pub mod texture;
pub mod vertex;
