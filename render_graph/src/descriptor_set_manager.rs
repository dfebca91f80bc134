use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;
use vulkano::buffer::Subbuffer;
use vulkano::descriptor_set::layout::{DescriptorSetLayout, DescriptorType};
use vulkano::descriptor_set::{PersistentDescriptorSet, WriteDescriptorSet};
use vulkano::descriptor_set::allocator::StandardDescriptorSetAllocator;
use vulkano::image::view::ImageViewAbstract;
use vulkano::sampler::Sampler;

use crate::error::{DescriptorValidationError, DescriptorValidationKind, RenderGraphError, Result};
use crate::identity::ResourceIdentity;
use crate::reflection::{ImageDimension, ShaderReflection};

/// The descriptor type a binding expects, as reflected from the shader
/// (spec.md 4.3/4.5). A deliberately smaller enumeration than
/// `vulkano::descriptor_set::layout::DescriptorType`: this core only needs
/// to distinguish the handful of kinds a `RenderPass`/`ComputePass` input
/// can actually be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VulkanDescriptorKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    Sampler,
}

impl VulkanDescriptorKind {
    pub fn from_vulkano(ty: DescriptorType) -> Self {
        match ty {
            DescriptorType::UniformBuffer | DescriptorType::UniformBufferDynamic => {
                VulkanDescriptorKind::UniformBuffer
            }
            DescriptorType::StorageBuffer | DescriptorType::StorageBufferDynamic => {
                VulkanDescriptorKind::StorageBuffer
            }
            DescriptorType::CombinedImageSampler => VulkanDescriptorKind::CombinedImageSampler,
            DescriptorType::SampledImage => VulkanDescriptorKind::SampledImage,
            DescriptorType::StorageImage => VulkanDescriptorKind::StorageImage,
            DescriptorType::Sampler => VulkanDescriptorKind::Sampler,
            // Anything else (input attachments, texel buffers, acceleration
            // structures) is outside this core's scope; fold it onto the
            // nearest buffer-like kind so reflection never panics on an
            // exotic binding it merely isn't asked to bind a resource to.
            _ => VulkanDescriptorKind::StorageBuffer,
        }
    }

    pub fn to_vulkano(self) -> DescriptorType {
        match self {
            VulkanDescriptorKind::UniformBuffer => DescriptorType::UniformBuffer,
            VulkanDescriptorKind::StorageBuffer => DescriptorType::StorageBuffer,
            VulkanDescriptorKind::CombinedImageSampler => DescriptorType::CombinedImageSampler,
            VulkanDescriptorKind::SampledImage => DescriptorType::SampledImage,
            VulkanDescriptorKind::StorageImage => DescriptorType::StorageImage,
            VulkanDescriptorKind::Sampler => DescriptorType::Sampler,
        }
    }
}

/// The kind of resource a caller actually handed to `set_input` (spec.md
/// 4.5). Compared against a binding's `VulkanDescriptorKind` by
/// [`is_compatible`] during `validate`/`bake`. The `*Cube` variants carry
/// the same broad kind as their non-cube counterpart (a `samplerCube`
/// binding is still, fundamentally, a combined image sampler) but let
/// `validate` additionally catch a dimensionality mismatch against the
/// binding's reflected `image_dimension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResourceType {
    Buffer,
    CombinedImageSampler,
    CombinedImageSamplerCube,
    SampledImage,
    SampledImageCube,
    StorageImage,
    StorageImageCube,
    Sampler,
    TextureArray,
    Null,
}

impl DescriptorResourceType {
    fn image_dimension(self) -> Option<ImageDimension> {
        match self {
            DescriptorResourceType::CombinedImageSampler
            | DescriptorResourceType::SampledImage
            | DescriptorResourceType::StorageImage => Some(ImageDimension::TwoD),
            DescriptorResourceType::CombinedImageSamplerCube
            | DescriptorResourceType::SampledImageCube
            | DescriptorResourceType::StorageImageCube => Some(ImageDimension::Cube),
            _ => None,
        }
    }
}

/// Pure compatibility table (spec.md 4.5, 8 property 2): independent of any
/// live GPU state, so it's exercised directly by unit tests without a
/// device.
pub fn is_compatible(expected: VulkanDescriptorKind, got: DescriptorResourceType) -> bool {
    use DescriptorResourceType as R;
    use VulkanDescriptorKind as K;
    match (expected, got) {
        (_, R::Null) => true,
        (K::UniformBuffer, R::Buffer) => true,
        (K::StorageBuffer, R::Buffer) => true,
        (K::CombinedImageSampler, R::CombinedImageSampler) => true,
        (K::CombinedImageSampler, R::CombinedImageSamplerCube) => true,
        (K::CombinedImageSampler, R::TextureArray) => true,
        (K::SampledImage, R::SampledImage) => true,
        (K::SampledImage, R::SampledImageCube) => true,
        (K::SampledImage, R::TextureArray) => true,
        (K::StorageImage, R::StorageImage) => true,
        (K::StorageImage, R::StorageImageCube) => true,
        (K::Sampler, R::Sampler) => true,
        _ => false,
    }
}

/// One slot's worth of resource the caller has bound, with the identity
/// `prepare()` diffs against on the next frame (spec.md 4.5, 8 property 3).
#[derive(Clone)]
pub enum BoundResource {
    Buffer(Subbuffer<[u8]>),
    Image {
        view: Arc<dyn ImageViewAbstract>,
        sampler: Option<Arc<Sampler>>,
        kind: DescriptorResourceType,
    },
    TextureArray(Vec<(Arc<dyn ImageViewAbstract>, Arc<Sampler>)>),
    Sampler(Arc<Sampler>),
    Null,
}

impl BoundResource {
    fn resource_type(&self) -> DescriptorResourceType {
        match self {
            BoundResource::Buffer(_) => DescriptorResourceType::Buffer,
            BoundResource::Image { kind, .. } => *kind,
            BoundResource::TextureArray(_) => DescriptorResourceType::TextureArray,
            BoundResource::Sampler(_) => DescriptorResourceType::Sampler,
            BoundResource::Null => DescriptorResourceType::Null,
        }
    }

    fn identity(&self) -> ResourceIdentity {
        match self {
            BoundResource::Buffer(b) => ResourceIdentity::of(&b.clone().buffer()),
            BoundResource::Image { view, .. } => ResourceIdentity::of(view),
            BoundResource::TextureArray(views) => views
                .first()
                .map(|(v, _)| ResourceIdentity::of(v))
                .unwrap_or(ResourceIdentity::NULL),
            BoundResource::Sampler(s) => ResourceIdentity::of(s),
            BoundResource::Null => ResourceIdentity::NULL,
        }
    }
}

/// Lifecycle state the manager moves through (spec.md 4.5): inputs may only
/// be declared while `Constructed`, set while inputs are being assigned, and
/// the compatibility check only runs once all declared inputs have a
/// binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Constructed,
    InputsBeingSet,
    Baked,
}

struct Input {
    set: u32,
    binding: u32,
    name: String,
    expected: VulkanDescriptorKind,
    expected_dimension: Option<ImageDimension>,
    bound: Vec<Option<BoundResource>>,
}

/// Owns descriptor-set allocation and per-frame writes for a single
/// `RenderPass`/`ComputePass` (spec.md 4.5). Identity-based change
/// detection means `prepare()` only rewrites the bindings whose underlying
/// resource actually changed since the slot's descriptor set was last
/// written — property 3 of spec.md 8.
pub struct DescriptorSetManager {
    reflection: Arc<ShaderReflection>,
    frames_in_flight: u32,
    state: State,
    inputs: Vec<Input>,
    last_written_identity: HashMap<(u32, u32, u32), ResourceIdentity>,
    descriptor_sets: Vec<HashMap<u32, Arc<PersistentDescriptorSet>>>,
}

impl DescriptorSetManager {
    pub fn new(reflection: Arc<ShaderReflection>, frames_in_flight: u32) -> Self {
        let mut inputs = Vec::new();
        for set_info in reflection.sets() {
            for binding in &set_info.bindings {
                inputs.push(Input {
                    set: set_info.set,
                    binding: binding.binding,
                    name: binding.name.clone(),
                    expected: binding.descriptor_type,
                    expected_dimension: binding.image_dimension,
                    bound: vec![None; frames_in_flight as usize],
                });
            }
        }

        Self {
            reflection,
            frames_in_flight,
            state: State::Constructed,
            inputs,
            last_written_identity: HashMap::new(),
            descriptor_sets: (0..frames_in_flight).map(|_| HashMap::new()).collect(),
        }
    }

    /// Binds `resource` to every frame slot uniformly. Per spec.md 4.5,
    /// calling `set_input` again on an already-bound input simply overwrites
    /// the previous binding rather than erroring — baking hasn't happened
    /// yet, so there's nothing downstream to invalidate.
    pub fn set_input(&mut self, set: u32, binding: u32, resource: BoundResource) -> Result<()> {
        self.state = State::InputsBeingSet;
        let frames_in_flight = self.frames_in_flight;
        let input = self.find_input_mut(set, binding)?;
        input.bound = vec![Some(resource); frames_in_flight as usize];
        Ok(())
    }

    /// Binds a distinct resource per frame slot (spec.md 4.4's per-slot
    /// buffer sets feeding directly into per-slot descriptor bindings).
    pub fn set_input_per_slot(&mut self, set: u32, binding: u32, slot: u32, resource: BoundResource) -> Result<()> {
        self.state = State::InputsBeingSet;
        let input = self.find_input_mut(set, binding)?;
        input.bound[slot as usize] = Some(resource);
        Ok(())
    }

    fn find_input_mut(&mut self, set: u32, binding: u32) -> Result<&mut Input> {
        self.inputs
            .iter_mut()
            .find(|i| i.set == set && i.binding == binding)
            .ok_or_else(|| {
                RenderGraphError::Descriptor(DescriptorValidationError {
                    set,
                    binding,
                    name: String::new(),
                    kind: DescriptorValidationKind::Missing,
                })
            })
    }

    /// Checks every declared input has a compatible, non-null (in slot 0)
    /// binding. Returns the first violation found, per spec.md 4.5/7 (never
    /// panics, never aggregates every error at once).
    pub fn validate(&self) -> std::result::Result<(), DescriptorValidationError> {
        for input in &self.inputs {
            let first = input.bound[0].as_ref();
            match first {
                None => {
                    return Err(DescriptorValidationError {
                        set: input.set,
                        binding: input.binding,
                        name: input.name.clone(),
                        kind: DescriptorValidationKind::Missing,
                    })
                }
                Some(BoundResource::Null) => {
                    return Err(DescriptorValidationError {
                        set: input.set,
                        binding: input.binding,
                        name: input.name.clone(),
                        kind: DescriptorValidationKind::NullSlotZero,
                    })
                }
                Some(resource) => {
                    let got = resource.resource_type();
                    if !is_compatible(input.expected, got) {
                        return Err(DescriptorValidationError {
                            set: input.set,
                            binding: input.binding,
                            name: input.name.clone(),
                            kind: DescriptorValidationKind::Incompatible {
                                expected: input.expected,
                                got,
                            },
                        });
                    }
                    if let (Some(expected_dim), Some(got_dim)) = (input.expected_dimension, got.image_dimension()) {
                        if expected_dim != got_dim {
                            return Err(DescriptorValidationError {
                                set: input.set,
                                binding: input.binding,
                                name: input.name.clone(),
                                kind: DescriptorValidationKind::DimensionMismatch,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Allocates descriptor sets for every frame slot and performs the
    /// initial full write. Bindings left null past slot 0 are legal
    /// (spec.md 4.5's "later slots may still be unbound at bake time") and
    /// get the manager's fallback resource written in their place; the real
    /// resource is picked up on the first `prepare()` call that sees it set.
    pub fn bake(
        &mut self,
        allocator: &StandardDescriptorSetAllocator,
        fallback: &BoundResource,
    ) -> Result<()> {
        self.validate()?;

        for slot in 0..self.frames_in_flight {
            let by_set = self.writes_for_slot(slot, fallback, true);
            for (set, writes) in by_set {
                let layout = self
                    .reflection
                    .descriptor_set_layout(set)
                    .ok_or_else(|| RenderGraphError::Vulkan(format!("no layout for set {set}")))?;
                let descriptor_set = PersistentDescriptorSet::new(allocator, layout.clone(), writes)
                    .map_err(|e| RenderGraphError::Vulkan(format!("failed to bake descriptor set: {e}")))?;
                self.descriptor_sets[slot as usize].insert(set, descriptor_set);
            }
        }

        self.state = State::Baked;
        Ok(())
    }

    /// Rewrites only the bindings in `slot` whose bound resource identity
    /// differs from what was last written into that slot's descriptor set
    /// (spec.md 8 property 3: minimal writes, not a full rebuild every
    /// frame).
    pub fn prepare(
        &mut self,
        allocator: &StandardDescriptorSetAllocator,
        slot: u32,
        fallback: &BoundResource,
    ) -> Result<()> {
        if self.state != State::Baked {
            return Err(RenderGraphError::Vulkan(
                "prepare() called before bake()".into(),
            ));
        }

        let mut dirty_sets: SmallVec<[u32; 4]> = SmallVec::new();
        for input in &self.inputs {
            let resource = input.bound[slot as usize].as_ref().unwrap_or(fallback);
            let identity = resource.identity();
            let key = (slot, input.set, input.binding);
            let changed = self.last_written_identity.get(&key) != Some(&identity);
            if changed && !dirty_sets.contains(&input.set) {
                dirty_sets.push(input.set);
            }
        }

        if dirty_sets.is_empty() {
            return Ok(());
        }

        let by_set = self.writes_for_slot(slot, fallback, false);
        for set in dirty_sets {
            let Some(writes) = by_set.get(&set) else { continue };
            let layout = self
                .reflection
                .descriptor_set_layout(set)
                .ok_or_else(|| RenderGraphError::Vulkan(format!("no layout for set {set}")))?;
            let descriptor_set =
                PersistentDescriptorSet::new(allocator, layout.clone(), writes.clone())
                    .map_err(|e| RenderGraphError::Vulkan(format!("failed to rebuild descriptor set: {e}")))?;
            self.descriptor_sets[slot as usize].insert(set, descriptor_set);
        }

        Ok(())
    }

    pub fn descriptor_sets(&self, slot: u32) -> &HashMap<u32, Arc<PersistentDescriptorSet>> {
        &self.descriptor_sets[slot as usize]
    }

    fn writes_for_slot(
        &mut self,
        slot: u32,
        fallback: &BoundResource,
        record_identity: bool,
    ) -> HashMap<u32, Vec<WriteDescriptorSet>> {
        let mut by_set: HashMap<u32, Vec<WriteDescriptorSet>> = HashMap::new();
        for input in &self.inputs {
            let resource = input.bound[slot as usize].as_ref().unwrap_or(fallback);
            if record_identity {
                self.last_written_identity
                    .insert((slot, input.set, input.binding), resource.identity());
            }
            let write = to_write_descriptor_set(input.binding, resource, fallback);
            by_set.entry(input.set).or_default().push(write);
        }
        by_set
    }
}

fn to_write_descriptor_set(
    binding: u32,
    resource: &BoundResource,
    fallback: &BoundResource,
) -> WriteDescriptorSet {
    let resource = match resource {
        BoundResource::Null => fallback,
        other => other,
    };
    match resource {
        BoundResource::Buffer(buffer) => WriteDescriptorSet::buffer(binding, buffer.clone()),
        BoundResource::Image { view, sampler: Some(sampler), .. } => {
            WriteDescriptorSet::image_view_sampler(binding, view.clone(), sampler.clone())
        }
        BoundResource::Image { view, sampler: None, .. } => {
            WriteDescriptorSet::image_view(binding, view.clone())
        }
        BoundResource::TextureArray(views) => WriteDescriptorSet::image_view_sampler_array(
            binding,
            0,
            views.iter().map(|(v, s)| (v.clone(), s.clone())),
        ),
        BoundResource::Sampler(sampler) => WriteDescriptorSet::sampler(binding, sampler.clone()),
        BoundResource::Null => unreachable!("fallback substituted above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_satisfies_uniform_and_storage() {
        assert!(is_compatible(VulkanDescriptorKind::UniformBuffer, DescriptorResourceType::Buffer));
        assert!(is_compatible(VulkanDescriptorKind::StorageBuffer, DescriptorResourceType::Buffer));
    }

    #[test]
    fn image_kinds_do_not_satisfy_buffer_bindings() {
        assert!(!is_compatible(VulkanDescriptorKind::UniformBuffer, DescriptorResourceType::SampledImage));
        assert!(!is_compatible(VulkanDescriptorKind::StorageBuffer, DescriptorResourceType::CombinedImageSampler));
    }

    #[test]
    fn texture_array_satisfies_combined_and_sampled_image() {
        assert!(is_compatible(VulkanDescriptorKind::CombinedImageSampler, DescriptorResourceType::TextureArray));
        assert!(is_compatible(VulkanDescriptorKind::SampledImage, DescriptorResourceType::TextureArray));
        assert!(!is_compatible(VulkanDescriptorKind::StorageImage, DescriptorResourceType::TextureArray));
    }

    #[test]
    fn cube_image_satisfies_the_same_kind_as_its_2d_counterpart() {
        assert!(is_compatible(VulkanDescriptorKind::CombinedImageSampler, DescriptorResourceType::CombinedImageSamplerCube));
        assert!(is_compatible(VulkanDescriptorKind::SampledImage, DescriptorResourceType::SampledImageCube));
        assert!(is_compatible(VulkanDescriptorKind::StorageImage, DescriptorResourceType::StorageImageCube));
    }

    #[test]
    fn cube_and_2d_resource_types_report_distinct_dimensions() {
        assert_eq!(DescriptorResourceType::SampledImage.image_dimension(), Some(ImageDimension::TwoD));
        assert_eq!(DescriptorResourceType::SampledImageCube.image_dimension(), Some(ImageDimension::Cube));
        assert_eq!(DescriptorResourceType::Buffer.image_dimension(), None);
    }

    #[test]
    fn null_is_always_compatible() {
        for expected in [
            VulkanDescriptorKind::UniformBuffer,
            VulkanDescriptorKind::StorageBuffer,
            VulkanDescriptorKind::CombinedImageSampler,
            VulkanDescriptorKind::SampledImage,
            VulkanDescriptorKind::StorageImage,
            VulkanDescriptorKind::Sampler,
        ] {
            assert!(is_compatible(expected, DescriptorResourceType::Null));
        }
    }

    #[test]
    fn from_vulkano_round_trips_core_kinds() {
        for kind in [
            VulkanDescriptorKind::UniformBuffer,
            VulkanDescriptorKind::StorageBuffer,
            VulkanDescriptorKind::CombinedImageSampler,
            VulkanDescriptorKind::SampledImage,
            VulkanDescriptorKind::StorageImage,
            VulkanDescriptorKind::Sampler,
        ] {
            assert_eq!(VulkanDescriptorKind::from_vulkano(kind.to_vulkano()), kind);
        }
    }
}
