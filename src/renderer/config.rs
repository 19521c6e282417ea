/// Contains configuration options for the renderer like vsync and validation
pub struct RenderConfig {
    pub vsync: bool,
    /// Enables the Khronos validation layer and routes its messages into `log`
    pub validation: bool,
    pub graph: GraphConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            validation: cfg!(debug_assertions),
            graph: GraphConfig::default(),
        }
    }
}

/// Executor parameters of a render graph
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphConfig {
    /// Number of frames the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    pub fence_timeout_ns: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            fence_timeout_ns: u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert!(config.vsync);
        assert_eq!(config.validation, cfg!(debug_assertions));
        assert_eq!(config.graph.frames_in_flight, 3);
        assert_eq!(config.graph.fence_timeout_ns, u64::MAX);
    }
}
