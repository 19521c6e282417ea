/// "Internals" are the allocation-owning objects the graph realizes "Resources" with.

pub mod buffer;
pub mod image;
