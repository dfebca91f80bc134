use std::collections::HashMap;
use std::sync::Arc;

use vulkano::descriptor_set::layout::{
    DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType,
};
use vulkano::device::Device;
use vulkano::image::view::ImageViewType;
use vulkano::pipeline::layout::PushConstantRange;
use vulkano::shader::{ShaderModule, ShaderStages};

use crate::descriptor_set_manager::VulkanDescriptorKind;
use crate::error::{RenderGraphError, Result};

/// Image dimensionality as seen by the shader's `OpTypeImage`; needed to
/// distinguish `sampler2D` from `samplerCube` from a storage image, since
/// the *input declaration* a `RenderPass` exposes depends on it
/// (spec.md 4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageDimension {
    OneD,
    TwoD,
    ThreeD,
    Cube,
}

/// One reflected binding within a descriptor set.
#[derive(Debug, Clone)]
pub struct BindingInfo {
    pub name: String,
    pub binding: u32,
    pub descriptor_type: VulkanDescriptorKind,
    pub descriptor_count: u32,
    pub stage_flags: ShaderStages,
    pub image_dimension: Option<ImageDimension>,
}

/// All bindings declared at a single descriptor set index.
#[derive(Debug, Clone, Default)]
pub struct SetInfo {
    pub set: u32,
    pub bindings: Vec<BindingInfo>,
}

/// The fully-reflected shape of a shader program (spec.md 4.3): bindings
/// folded across stages, push constant ranges, cached GPU layouts and pool
/// sizing totals.
pub struct ShaderReflection {
    name: String,
    sets: Vec<SetInfo>,
    push_constant_ranges: Vec<PushConstantRange>,
    descriptor_set_layouts: Vec<Arc<DescriptorSetLayout>>,
    pool_sizes: HashMap<DescriptorType, u32>,
}

impl ShaderReflection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sets(&self) -> &[SetInfo] {
        &self.sets
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    pub fn descriptor_set_layout(&self, set: u32) -> Option<&Arc<DescriptorSetLayout>> {
        self.descriptor_set_layouts.get(set as usize)
    }

    pub fn descriptor_set_layouts(&self) -> &[Arc<DescriptorSetLayout>] {
        &self.descriptor_set_layouts
    }

    pub fn pool_sizes(&self) -> &HashMap<DescriptorType, u32> {
        &self.pool_sizes
    }

    pub fn binding(&self, set: u32, binding: u32) -> Option<&BindingInfo> {
        self.sets
            .get(set as usize)
            .and_then(|s| s.bindings.iter().find(|b| b.binding == binding))
    }

    pub fn binding_by_name(&self, name: &str) -> Option<(u32, &BindingInfo)> {
        self.sets.iter().find_map(|s| {
            s.bindings
                .iter()
                .find(|b| b.name == name)
                .map(|b| (s.set, b))
        })
    }

    /// Reflects and merges one or more compiled shader stages that together
    /// make up `name` (e.g. a vertex + fragment pair, or a single compute
    /// stage). A binding declared in more than one stage folds into a
    /// single entry with the union of `stage_flags` (spec.md 4.3): a
    /// uniform buffer used by both the vertex and fragment stage must not
    /// appear twice.
    pub fn reflect(
        device: Arc<Device>,
        name: &str,
        stages: &[(ShaderStages, Vec<u32>)],
    ) -> Result<ShaderReflection> {
        let mut merged: HashMap<(u32, u32), BindingInfo> = HashMap::new();
        let mut push_constant_ranges: Vec<PushConstantRange> = Vec::new();

        for (stage, spirv_words) in stages {
            let module = unsafe { ShaderModule::from_words(device.clone(), spirv_words) }
                .map_err(|e| RenderGraphError::ReflectionFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;

            let entry_point = module.entry_point("main").ok_or_else(|| {
                RenderGraphError::ReflectionFailed {
                    name: name.to_string(),
                    message: "no 'main' entry point".to_string(),
                }
            })?;
            let info = entry_point.info();

            for (&(set, binding), requirements) in &info.descriptor_binding_requirements {
                let descriptor_type = requirements
                    .descriptor_types
                    .first()
                    .copied()
                    .ok_or_else(|| RenderGraphError::ReflectionFailed {
                        name: name.to_string(),
                        message: format!("binding ({set},{binding}) has no descriptor type"),
                    })?;

                let image_dimension = image_dimension_of(descriptor_type, requirements.image_view_type);

                merged
                    .entry((set, binding))
                    .and_modify(|existing| {
                        existing.stage_flags = existing.stage_flags | *stage;
                    })
                    .or_insert(BindingInfo {
                        name: requirements
                            .variable_name
                            .clone()
                            .unwrap_or_else(|| format!("binding_{set}_{binding}")),
                        binding,
                        descriptor_type: VulkanDescriptorKind::from_vulkano(descriptor_type),
                        descriptor_count: requirements.descriptor_count.unwrap_or(1),
                        stage_flags: *stage,
                        image_dimension,
                    });
            }

            if let Some(range) = &info.push_constant_requirements {
                push_constant_ranges.push(PushConstantRange {
                    stages: *stage,
                    offset: range.offset,
                    size: range.size,
                });
            }
        }

        let max_set = merged.keys().map(|(s, _)| *s).max();
        let mut sets: Vec<SetInfo> = match max_set {
            Some(max_set) => (0..=max_set)
                .map(|set| SetInfo {
                    set,
                    bindings: Vec::new(),
                })
                .collect(),
            None => Vec::new(),
        };
        for ((set, _binding), info) in merged {
            sets[set as usize].bindings.push(info);
        }
        for set in &mut sets {
            set.bindings.sort_by_key(|b| b.binding);
        }

        let mut pool_sizes: HashMap<DescriptorType, u32> = HashMap::new();
        let mut descriptor_set_layouts = Vec::with_capacity(sets.len());
        for set in &sets {
            let mut layout_bindings = std::collections::BTreeMap::new();
            for binding in &set.bindings {
                let vk_type = binding.descriptor_type.to_vulkano();
                *pool_sizes.entry(vk_type).or_insert(0) += binding.descriptor_count;
                layout_bindings.insert(
                    binding.binding,
                    DescriptorSetLayoutBinding {
                        descriptor_count: binding.descriptor_count,
                        stages: binding.stage_flags,
                        ..DescriptorSetLayoutBinding::descriptor_type(vk_type)
                    },
                );
            }

            let layout = DescriptorSetLayout::new(
                device.clone(),
                DescriptorSetLayoutCreateInfo {
                    bindings: layout_bindings,
                    ..Default::default()
                },
            )
            .map_err(|e| RenderGraphError::ReflectionFailed {
                name: name.to_string(),
                message: format!("failed to create descriptor set layout: {e}"),
            })?;
            descriptor_set_layouts.push(layout);
        }

        Ok(ShaderReflection {
            name: name.to_string(),
            sets,
            push_constant_ranges,
            descriptor_set_layouts,
            pool_sizes,
        })
    }
}

/// Resolves a binding's `OpTypeImage` dimensionality from vulkano's
/// reflected `image_view_type` (spec.md 4.3/4.5's dimension mismatch edge
/// case: a `samplerCube` input given a `Texture2D` must fail validation).
/// Array view types fold onto their non-array counterpart since this core
/// only distinguishes cube from non-cube.
fn image_dimension_of(descriptor_type: DescriptorType, image_view_type: Option<ImageViewType>) -> Option<ImageDimension> {
    match descriptor_type {
        DescriptorType::CombinedImageSampler
        | DescriptorType::SampledImage
        | DescriptorType::StorageImage => Some(match image_view_type {
            Some(ImageViewType::Dim1d) | Some(ImageViewType::Dim1dArray) => ImageDimension::OneD,
            Some(ImageViewType::Dim3d) => ImageDimension::ThreeD,
            Some(ImageViewType::Cube) | Some(ImageViewType::CubeArray) => ImageDimension::Cube,
            _ => ImageDimension::TwoD,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_dimension_is_none_for_buffers() {
        assert_eq!(image_dimension_of(DescriptorType::UniformBuffer, None), None);
    }

    #[test]
    fn cube_view_type_is_distinguished_from_2d() {
        assert_eq!(
            image_dimension_of(DescriptorType::CombinedImageSampler, Some(ImageViewType::Cube)),
            Some(ImageDimension::Cube)
        );
        assert_eq!(
            image_dimension_of(DescriptorType::CombinedImageSampler, Some(ImageViewType::Dim2d)),
            Some(ImageDimension::TwoD)
        );
    }
}
