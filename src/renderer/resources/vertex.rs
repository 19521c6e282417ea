use ash::vk;

/// The closed set of vertex attribute formats a pipeline description can declare
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexInputAttributeFormat {
    Float,
    Vector2,
    Vector3,
    Vector4,
}

impl VertexInputAttributeFormat {
    pub fn size(&self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Vector2 => 8,
            Self::Vector3 => 12,
            Self::Vector4 => 16,
        }
    }

    pub fn format(&self) -> vk::Format {
        match self {
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Vector2 => vk::Format::R32G32_SFLOAT,
            Self::Vector3 => vk::Format::R32G32B32_SFLOAT,
            Self::Vector4 => vk::Format::R32G32B32A32_SFLOAT,
        }
    }
}

/// Attributes of a single interleaved vertex binding, in memory order
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexInputDescription {
    pub attributes: Vec<(u32, VertexInputAttributeFormat)>,
}

impl VertexInputDescription {
    pub fn new(attributes: &[(u32, VertexInputAttributeFormat)]) -> Self {
        Self {
            attributes: attributes.to_vec(),
        }
    }

    pub fn stride(&self) -> u32 {
        self.attributes.iter().map(|(_, format)| format.size()).sum()
    }

    /// Native binding and attribute descriptions for this description bound at `binding`.
    /// Offsets accumulate in declaration order.
    pub fn describe(
        &self,
        binding: u32,
    ) -> (vk::VertexInputBindingDescription, Vec<vk::VertexInputAttributeDescription>) {
        let mut offset = 0;
        let attributes = self
            .attributes
            .iter()
            .map(|(location, format)| {
                let attribute = vk::VertexInputAttributeDescription {
                    location: *location,
                    binding,
                    format: format.format(),
                    offset,
                };
                offset += format.size();
                attribute
            })
            .collect::<Vec<_>>();

        let binding = vk::VertexInputBindingDescription {
            binding,
            stride: self.stride(),
            input_rate: vk::VertexInputRate::VERTEX,
        };

        (binding, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_accumulate_within_binding() {
        let description = VertexInputDescription::new(&[
            (0, VertexInputAttributeFormat::Vector3),
            (1, VertexInputAttributeFormat::Vector3),
            (2, VertexInputAttributeFormat::Vector2),
        ]);

        let (binding, attributes) = description.describe(1);

        assert_eq!(binding.binding, 1);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
        let offsets = attributes.iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
        assert!(attributes.iter().all(|a| a.binding == 1));
    }

    #[test]
    fn test_attribute_sizes_match_formats() {
        assert_eq!(VertexInputAttributeFormat::Float.size(), 4);
        assert_eq!(VertexInputAttributeFormat::Vector4.size(), 16);
        assert_eq!(
            VertexInputAttributeFormat::Vector4.format(),
            vk::Format::R32G32B32A32_SFLOAT
        );
    }
}
