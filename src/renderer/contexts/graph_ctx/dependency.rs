use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use crate::renderer::contexts::graph_ctx::pass::Pass;
use crate::renderer::contexts::graph_ctx::resource::{ResourceTable, TextureHandle};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::texture::Texture;

/// Pass-to-pass dependencies derived from the attachments each pass reads and writes.
///
/// Edges always point from a lower declaration index to a higher one.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// `dependencies[p]` holds the passes whose output `p` reads
    pub dependencies: Vec<BTreeSet<usize>>,
    /// `successors[p]` holds the live passes that read the output of `p`
    pub successors: Vec<BTreeSet<usize>>,
    /// Live passes without dependencies, in discovery order
    pub begin_passes: Vec<usize>,
    /// Passes that contribute to an external attachment
    pub live: Vec<bool>,
}

impl DependencyGraph {
    /// Scans `passes` in declaration order, refreshing the access bookkeeping of every resource
    pub fn build(
        passes: &[Pass],
        textures: &mut ResourceTable<Texture>,
        buffers: &mut ResourceTable<Buffer>,
    ) -> Self {
        textures.reset_access();
        buffers.reset_access();

        let pass_count = passes.len();
        let mut dependencies = vec![BTreeSet::new(); pass_count];

        for (index, pass) in passes.iter().enumerate() {
            let Some(pass) = pass.as_graphics() else {
                continue;
            };
            for handle in pass.color_attachments.iter().chain(pass.depth_attachment.iter()) {
                if let Some(resource) = textures.get_mut(*handle) {
                    resource.access.last_write = Some(index);
                }
            }
            for handle in pass.input_attachments.iter() {
                if let Some(resource) = textures.get_mut(*handle) {
                    resource.access.last_read = Some(index);
                }
            }
            for handle in pass.buffer_inputs.iter() {
                if let Some(resource) = buffers.get_mut(*handle) {
                    resource.access.last_read = Some(index);
                }
            }
        }

        // Readers seen so far in the backward scan that no later write has claimed yet
        let mut pending_readers: HashMap<TextureHandle, Vec<usize>> = HashMap::new();

        for (index, pass) in passes.iter().enumerate().rev() {
            let Some(pass) = pass.as_graphics() else {
                continue;
            };
            for handle in pass.color_attachments.iter() {
                let Some(resource) = textures.get_mut(*handle) else {
                    continue;
                };
                resource.access.first_write = Some(index);
                if resource.access.first_read.is_some() {
                    for reader in pending_readers.remove(handle).unwrap_or_default() {
                        if reader != index {
                            dependencies[reader].insert(index);
                        }
                    }
                }
            }
            if let Some(handle) = pass.depth_attachment {
                if let Some(resource) = textures.get_mut(handle) {
                    resource.access.first_write = Some(index);
                }
            }
            for handle in pass.input_attachments.iter() {
                if let Some(resource) = textures.get_mut(*handle) {
                    resource.access.first_read = Some(index);
                    pending_readers.entry(*handle).or_default().push(index);
                }
            }
            for handle in pass.buffer_inputs.iter() {
                if let Some(resource) = buffers.get_mut(*handle) {
                    resource.access.first_read = Some(index);
                }
            }
        }

        // Everything that ends up in an external attachment seeds the walk
        let roots = passes
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(index, pass)| {
                let pass = pass.as_graphics()?;
                pass.color_attachments
                    .iter()
                    .any(|handle| textures.get(*handle).is_some_and(|r| r.external))
                    .then_some(index)
            })
            .collect::<Vec<_>>();

        let mut successors = vec![BTreeSet::new(); pass_count];
        let mut begin_passes = Vec::new();
        let mut visited = HashSet::new();
        let mut frontier = VecDeque::from(roots);

        while let Some(index) = frontier.pop_front() {
            if !visited.insert(index) {
                continue;
            }
            if dependencies[index].is_empty() {
                begin_passes.push(index);
            }
            for dependency in dependencies[index].iter() {
                successors[*dependency].insert(index);
                frontier.push_back(*dependency);
            }
        }

        let live = (0..pass_count).map(|i| visited.contains(&i)).collect::<Vec<_>>();
        for (index, pass) in passes.iter().enumerate() {
            if !live[index] {
                log::debug!("Culling pass \"{}\": it does not reach an external attachment", pass.name());
            }
        }
        log::debug!("Begin passes: {:?}", begin_passes);

        Self {
            dependencies,
            successors,
            begin_passes,
            live,
        }
    }

    pub fn pass_count(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::renderer::contexts::graph_ctx::pass::GraphicsPass;
    use crate::renderer::contexts::graph_ctx::resource::Resource;
    use crate::renderer::resources::pipeline::GraphicsPipeline;

    fn graphics(name: &str, colors: &[TextureHandle], inputs: &[TextureHandle]) -> Pass {
        let mut pass = GraphicsPass::new(name, Arc::new(GraphicsPipeline::new()));
        for handle in colors {
            pass.add_color_attachment(*handle);
        }
        for handle in inputs {
            pass.add_input_attachment(*handle);
        }
        Pass::Graphics(pass)
    }

    fn external(textures: &mut ResourceTable<Texture>, name: &str) -> TextureHandle {
        textures.add_external(Resource::new(name, false))
    }

    #[test]
    fn test_empty_graph() {
        let mut textures = ResourceTable::new();
        let mut buffers = ResourceTable::new();
        let graph = DependencyGraph::build(&[], &mut textures, &mut buffers);

        assert_eq!(graph.pass_count(), 0);
        assert!(graph.begin_passes.is_empty());
    }

    #[test]
    fn test_reader_depends_on_writer() {
        let mut textures = ResourceTable::new();
        let mut buffers = ResourceTable::new();
        let gbuffer = textures.create("gbuffer", true);
        let back_buffer = external(&mut textures, "back buffer");

        let passes = [
            graphics("Geometry", &[gbuffer], &[]),
            graphics("Lighting", &[back_buffer], &[gbuffer]),
        ];
        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);

        assert_eq!(graph.dependencies[1], BTreeSet::from([0]));
        assert_eq!(graph.successors[0], BTreeSet::from([1]));
        assert_eq!(graph.begin_passes, vec![0]);
        assert_eq!(graph.live, vec![true, true]);

        let access = textures.get(gbuffer).map(|r| r.access).unwrap_or_default();
        assert_eq!(access.first_write, Some(0));
        assert_eq!(access.last_write, Some(0));
        assert_eq!(access.first_read, Some(1));
        assert_eq!(access.last_read, Some(1));
    }

    #[test]
    fn test_every_reader_depends_on_latest_writer() {
        let mut textures = ResourceTable::new();
        let mut buffers = ResourceTable::new();
        let shadow = textures.create("shadow", true);
        let back_buffer = external(&mut textures, "back buffer");

        let passes = [
            graphics("Shadow", &[shadow], &[]),
            graphics("Opaque", &[back_buffer], &[shadow]),
            graphics("Transparent", &[back_buffer], &[shadow]),
        ];
        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);

        assert_eq!(graph.dependencies[1], BTreeSet::from([0]));
        assert_eq!(graph.dependencies[2], BTreeSet::from([0]));
        assert_eq!(graph.successors[0], BTreeSet::from([1, 2]));
        // Reached from both roots but scheduled once
        assert_eq!(graph.begin_passes, vec![0]);
    }

    #[test]
    fn test_passes_not_reaching_external_are_culled() {
        let mut textures = ResourceTable::new();
        let mut buffers = ResourceTable::new();
        let unused = textures.create("unused", true);
        let back_buffer = external(&mut textures, "back buffer");

        let passes = [
            graphics("Debug", &[unused], &[]),
            graphics("Present", &[back_buffer], &[]),
        ];
        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);

        assert_eq!(graph.live, vec![false, true]);
        assert_eq!(graph.begin_passes, vec![1]);
        assert!(graph.successors[0].is_empty());
    }

    #[test]
    fn test_non_graphics_passes_are_ignored() {
        let mut textures = ResourceTable::new();
        let mut buffers = ResourceTable::new();
        let back_buffer = external(&mut textures, "back buffer");

        let passes = [
            Pass::Compute,
            graphics("Present", &[back_buffer], &[]),
        ];
        let graph = DependencyGraph::build(&passes, &mut textures, &mut buffers);

        assert_eq!(graph.live, vec![false, true]);
        assert_eq!(graph.begin_passes, vec![1]);
    }

    #[test]
    fn test_access_is_recomputed_on_rebuild() {
        let mut textures = ResourceTable::new();
        let mut buffers = ResourceTable::new();
        let back_buffer = external(&mut textures, "back buffer");
        let passes = [graphics("Present", &[back_buffer], &[])];

        let _ = DependencyGraph::build(&passes, &mut textures, &mut buffers);
        let _ = DependencyGraph::build(&passes[..0], &mut textures, &mut buffers);

        let access = textures.get(back_buffer).map(|r| r.access).unwrap_or_default();
        assert_eq!(access.first_write, None);
        assert_eq!(access.last_write, None);
    }
}
