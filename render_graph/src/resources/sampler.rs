use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use vulkano::device::Device;
use vulkano::sampler::{Filter, Sampler, SamplerAddressMode, SamplerCreateInfo, SamplerMipmapMode};

use crate::error::{RenderGraphError, Result};

/// A descriptor-set binding's identity depends on which `Sampler` it
/// references, but samplers are cheap, immutable and commonly reused
/// (e.g. "linear repeat" is shared by most material textures). This cache
/// avoids creating a near-duplicate `VkSampler` for every texture that
/// wants the same addressing/filtering combination.
#[derive(Default)]
pub struct SamplerCache {
    entries: Mutex<HashMap<SamplerKey, Arc<Sampler>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub mag_filter: FilterKey,
    pub min_filter: FilterKey,
    pub mipmap_mode: MipmapModeKey,
    pub address_mode: AddressModeKey,
    pub anisotropy: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MipmapModeKey {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressModeKey {
    Repeat,
    ClampToEdge,
    ClampToBorder,
}

impl SamplerKey {
    pub fn linear_repeat() -> Self {
        Self {
            mag_filter: FilterKey::Linear,
            min_filter: FilterKey::Linear,
            mipmap_mode: MipmapModeKey::Linear,
            address_mode: AddressModeKey::Repeat,
            anisotropy: None,
        }
    }

    pub fn nearest_clamp() -> Self {
        Self {
            mag_filter: FilterKey::Nearest,
            min_filter: FilterKey::Nearest,
            mipmap_mode: MipmapModeKey::Nearest,
            address_mode: AddressModeKey::ClampToEdge,
            anisotropy: None,
        }
    }
}

impl SamplerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device: Arc<Device>, key: SamplerKey) -> Result<Arc<Sampler>> {
        if let Some(sampler) = self.entries.lock().get(&key) {
            return Ok(sampler.clone());
        }

        let sampler = Sampler::new(
            device,
            SamplerCreateInfo {
                mag_filter: to_filter(key.mag_filter),
                min_filter: to_filter(key.min_filter),
                mipmap_mode: to_mipmap_mode(key.mipmap_mode),
                address_mode: [to_address_mode(key.address_mode); 3],
                anisotropy: key.anisotropy.map(|max| max as f32),
                ..Default::default()
            },
        )
        .map_err(|e| RenderGraphError::Vulkan(format!("failed to create sampler: {e}")))?;

        self.entries.lock().insert(key, sampler.clone());
        Ok(sampler)
    }
}

fn to_filter(key: FilterKey) -> Filter {
    match key {
        FilterKey::Nearest => Filter::Nearest,
        FilterKey::Linear => Filter::Linear,
    }
}

fn to_mipmap_mode(key: MipmapModeKey) -> SamplerMipmapMode {
    match key {
        MipmapModeKey::Nearest => SamplerMipmapMode::Nearest,
        MipmapModeKey::Linear => SamplerMipmapMode::Linear,
    }
}

fn to_address_mode(key: AddressModeKey) -> SamplerAddressMode {
    match key {
        AddressModeKey::Repeat => SamplerAddressMode::Repeat,
        AddressModeKey::ClampToEdge => SamplerAddressMode::ClampToEdge,
        AddressModeKey::ClampToBorder => SamplerAddressMode::ClampToBorder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_distinct_keys() {
        assert_ne!(SamplerKey::linear_repeat(), SamplerKey::nearest_clamp());
    }
}
