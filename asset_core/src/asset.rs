use std::path::PathBuf;
use std::sync::Arc;

use nalgebra::{Point3, Vector3};

use crate::handle::AssetHandle;
use crate::metadata::AssetType;

bitflags::bitflags! {
    /// spec.md 4.10 failure semantics: `Missing` (file absent),
    /// `Invalid` (parseable file, bad contents). Both can be cleared once
    /// `locate`/a fixed re-import resolves the problem.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AssetFlags: u8 {
        const MISSING = 0b01;
        const INVALID = 0b10;
    }
}

/// Decoded mesh data backing a `StaticMesh`, produced by importing a
/// `MeshSource` file (glTF). Kept intentionally thin — vertex/index upload
/// into GPU buffers is a caller concern (`render_graph::resources::buffer`),
/// out of scope per SPEC_FULL.md 0.
#[derive(Debug, Clone)]
pub struct MeshSourceData {
    pub positions: Vec<Point3<f32>>,
    pub normals: Vec<Vector3<f32>>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubmeshRange>,
}

#[derive(Debug, Clone, Copy)]
pub struct SubmeshRange {
    pub index_offset: u32,
    pub index_count: u32,
    pub material: Option<AssetHandle>,
}

#[derive(Debug, Clone)]
pub struct StaticMeshData {
    pub mesh_source: AssetHandle,
    pub submesh_materials: Vec<AssetHandle>,
}

#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
    pub mip_levels: u32,
}

#[derive(Debug, Clone)]
pub struct EnvironmentMapData {
    pub faces: [TextureData; 6],
}

#[derive(Debug, Clone)]
pub struct MaterialData {
    pub albedo_texture: Option<AssetHandle>,
    pub normal_texture: Option<AssetHandle>,
    pub metallic_roughness_texture: Option<AssetHandle>,
    pub albedo_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
}

#[derive(Debug, Clone)]
pub struct FontData {
    pub atlas: TextureData,
    pub source_path: PathBuf,
}

/// Tagged union over every decoded asset payload the manager handles
/// (spec.md 4.10). A `Ref<Asset>` in the original is this enum behind an
/// `Arc` in ours — polymorphism via `GetAssetType` becomes a `match`.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    StaticMesh(StaticMeshData),
    MeshSource(MeshSourceData),
    Texture(TextureData),
    EnvironmentMap(EnvironmentMapData),
    Material(MaterialData),
    Font(FontData),
}

impl AssetPayload {
    pub fn asset_type(&self) -> AssetType {
        match self {
            AssetPayload::StaticMesh(_) => AssetType::StaticMesh,
            AssetPayload::MeshSource(_) => AssetType::MeshSource,
            AssetPayload::Texture(_) => AssetType::Texture,
            AssetPayload::EnvironmentMap(_) => AssetType::EnvironmentMap,
            AssetPayload::Material(_) => AssetType::Material,
            AssetPayload::Font(_) => AssetType::Font,
        }
    }

    /// Reacts to `dependency`'s payload changing underneath this one
    /// (spec.md 4.10/8 property 7). A `StaticMesh` re-resolves its
    /// per-submesh material table against the reloaded `MeshSource`'s new
    /// submesh count; every other combination has nothing structural to
    /// fix up, since dependents reference materials/textures by handle and
    /// look them up live.
    pub fn on_dependency_updated(&mut self, dependency: AssetHandle, dependency_payload: &AssetPayload) {
        if let (AssetPayload::StaticMesh(mesh), AssetPayload::MeshSource(source)) = (self, dependency_payload) {
            if mesh.mesh_source == dependency {
                mesh.submesh_materials.resize(source.submeshes.len(), AssetHandle::NULL);
            }
        }
    }
}

/// A loaded asset: its handle, decoded payload, and failure flags
/// (`Asset.h`'s `Flags` bitset). `flags` defaults to `INVALID` until a
/// successful import clears it, mirroring the C++ default
/// `Flags = AssetFlag::Invalid`.
#[derive(Debug, Clone)]
pub struct Asset {
    pub handle: AssetHandle,
    pub payload: Option<AssetPayload>,
    flags: AssetFlags,
}

impl Asset {
    pub fn placeholder(handle: AssetHandle) -> Self {
        Self {
            handle,
            payload: None,
            flags: AssetFlags::INVALID,
        }
    }

    pub fn ready(handle: AssetHandle, payload: AssetPayload) -> Self {
        Self {
            handle,
            payload: Some(payload),
            flags: AssetFlags::empty(),
        }
    }

    pub fn missing(handle: AssetHandle) -> Self {
        Self {
            handle,
            payload: None,
            flags: AssetFlags::MISSING,
        }
    }

    pub fn invalid(handle: AssetHandle) -> Self {
        Self {
            handle,
            payload: None,
            flags: AssetFlags::INVALID,
        }
    }

    pub fn is_flag_set(&self, flag: AssetFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn set_flag(&mut self, flag: AssetFlags, value: bool) {
        self.flags.set(flag, value);
    }

    /// Neither `Missing` nor `Invalid` is set.
    pub fn is_valid(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn asset_type(&self) -> AssetType {
        self.payload
            .as_ref()
            .map(AssetPayload::asset_type)
            .unwrap_or(AssetType::None)
    }

    /// Fans a dependency's reload into this asset's own payload (spec.md
    /// 4.10). A no-op for placeholder/invalid assets, which have no
    /// payload to update yet.
    pub fn on_dependency_updated(&mut self, dependency: AssetHandle, dependency_payload: &AssetPayload) {
        if let Some(payload) = self.payload.as_mut() {
            payload.on_dependency_updated(dependency, dependency_payload);
        }
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_mesh_resizes_submesh_materials_to_match_reloaded_source() {
        let source_handle = AssetHandle::new();
        let mut mesh = Asset::ready(
            AssetHandle::new(),
            AssetPayload::StaticMesh(StaticMeshData {
                mesh_source: source_handle,
                submesh_materials: vec![AssetHandle::new()],
            }),
        );

        let reloaded_source = AssetPayload::MeshSource(MeshSourceData {
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
            submeshes: vec![
                SubmeshRange { index_offset: 0, index_count: 3, material: None },
                SubmeshRange { index_offset: 3, index_count: 3, material: None },
                SubmeshRange { index_offset: 6, index_count: 3, material: None },
            ],
        });

        mesh.on_dependency_updated(source_handle, &reloaded_source);

        match mesh.payload.unwrap() {
            AssetPayload::StaticMesh(data) => assert_eq!(data.submesh_materials.len(), 3),
            _ => panic!("expected static mesh payload"),
        }
    }

    #[test]
    fn static_mesh_ignores_updates_from_unrelated_handles() {
        let source_handle = AssetHandle::new();
        let unrelated_handle = AssetHandle::new();
        let mut mesh = Asset::ready(
            AssetHandle::new(),
            AssetPayload::StaticMesh(StaticMeshData {
                mesh_source: source_handle,
                submesh_materials: vec![AssetHandle::new(), AssetHandle::new()],
            }),
        );

        let reloaded_source = AssetPayload::MeshSource(MeshSourceData {
            positions: Vec::new(),
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
            submeshes: vec![SubmeshRange { index_offset: 0, index_count: 3, material: None }],
        });

        mesh.on_dependency_updated(unrelated_handle, &reloaded_source);

        match mesh.payload.unwrap() {
            AssetPayload::StaticMesh(data) => assert_eq!(data.submesh_materials.len(), 2),
            _ => panic!("expected static mesh payload"),
        }
    }
}
