//! GPU-resource wrappers a `RenderPass`/`ComputePass` input can bind to
//! (spec.md 4.4). Each type carries a [`crate::identity::ResourceIdentity`]
//! derived from its own backing allocation so `DescriptorSetManager::prepare`
//! can tell "still the same buffer" from "a new one with the same contents"
//! without comparing bytes.

mod buffer;
mod image;
mod sampler;

pub use buffer::{IndexBuffer, StorageBuffer, StorageBufferSet, UniformBuffer, UniformBufferSet, VertexBuffer};
pub use image::{Texture2D, TextureCube};
pub use sampler::SamplerCache;
