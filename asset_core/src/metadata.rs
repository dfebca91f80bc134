use std::path::PathBuf;

use crate::handle::AssetHandle;

/// spec.md 4.10: `{None,Scene,StaticMesh,MeshSource,Material,Texture,EnvironmentMap,Font}`.
/// `TextureCube` is folded into `EnvironmentMap` here since render_graph's
/// `TextureCube` resource is only ever used for environment maps in this
/// scope; a generic cube texture type is not in spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetType {
    None,
    Scene,
    StaticMesh,
    MeshSource,
    Material,
    Texture,
    EnvironmentMap,
    Font,
}

impl AssetType {
    pub fn from_str_name(name: &str) -> AssetType {
        match name {
            "Scene" => AssetType::Scene,
            "StaticMesh" => AssetType::StaticMesh,
            "MeshSource" => AssetType::MeshSource,
            "Material" => AssetType::Material,
            "Texture" => AssetType::Texture,
            "EnvironmentMap" => AssetType::EnvironmentMap,
            "Font" => AssetType::Font,
            _ => AssetType::None,
        }
    }

    pub fn as_str_name(self) -> &'static str {
        match self {
            AssetType::None => "None",
            AssetType::Scene => "Scene",
            AssetType::StaticMesh => "StaticMesh",
            AssetType::MeshSource => "MeshSource",
            AssetType::Material => "Material",
            AssetType::Texture => "Texture",
            AssetType::EnvironmentMap => "EnvironmentMap",
            AssetType::Font => "Font",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    None,
    Ready,
    Loading,
    Invalid,
}

/// spec.md 4.10. `relative_path` is relative to the asset root the registry
/// was loaded from; `is_memory_only` assets have no path (supplement 3 of
/// SPEC_FULL.md 10, grounded on `AddMemoryOnlyAsset`).
#[derive(Debug, Clone)]
pub struct AssetMetaData {
    pub handle: AssetHandle,
    pub asset_type: AssetType,
    pub relative_path: PathBuf,
    pub status: AssetStatus,
    pub is_data_loaded: bool,
    pub is_memory_only: bool,
}

impl AssetMetaData {
    pub fn new(handle: AssetHandle, asset_type: AssetType, relative_path: PathBuf) -> Self {
        Self {
            handle,
            asset_type,
            relative_path,
            status: AssetStatus::None,
            is_data_loaded: false,
            is_memory_only: false,
        }
    }

    /// Memory-only variant: no file backs this asset, so it can never be
    /// reported `Missing` and is dropped by `AssetRegistry::serialize`
    /// (spec.md 8 property 8).
    pub fn memory_only(handle: AssetHandle, asset_type: AssetType) -> Self {
        Self {
            handle,
            asset_type,
            relative_path: PathBuf::new(),
            status: AssetStatus::Ready,
            is_data_loaded: true,
            is_memory_only: true,
        }
    }

    /// A memory-only asset has no file path and cannot be "missing"; a
    /// non-memory record must carry a non-null handle.
    pub fn is_valid(&self) -> bool {
        !self.handle.is_null() && !self.is_memory_only
    }
}
