use std::path::Path;
use std::sync::Arc;

use nalgebra::{Point3, Vector3};

use crate::asset::{Asset, AssetPayload, MeshSourceData, SubmeshRange, TextureData};
use crate::metadata::AssetMetaData;
use crate::metadata::AssetType;

/// Dispatches to a per-type decoder, mirroring `AssetImporter::TryLoadData`'s
/// type -> serializer lookup. A type with no decoder (`Scene`,
/// `EnvironmentMap`'s HDR-to-cubemap baking, `Material`'s YAML format) warns
/// and returns an invalid placeholder rather than failing the whole import
/// pass, matching the original's per-asset `continue`.
pub fn import(asset_root: &Path, metadata: &AssetMetaData) -> Asset {
    let full_path = asset_root.join(&metadata.relative_path);

    let result = match metadata.asset_type {
        AssetType::MeshSource => import_mesh_source(&full_path).map(AssetPayload::MeshSource),
        AssetType::Texture => import_texture(&full_path).map(AssetPayload::Texture),
        other => {
            log::warn!("no importer registered for asset type {:?}", other);
            return Asset::invalid(metadata.handle);
        }
    };

    match result {
        Ok(payload) => Asset::ready(metadata.handle, payload),
        Err(reason) => {
            log::warn!("import failed for '{}': {reason}", metadata.relative_path.display());
            Asset::invalid(metadata.handle)
        }
    }
}

fn import_mesh_source(path: &Path) -> Result<MeshSourceData, String> {
    let (document, buffers, _images) = gltf::import(path).map_err(|e| e.to_string())?;

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();
    let mut submeshes = Vec::new();

    for mesh in document.meshes() {
        for primitive in mesh.primitives() {
            let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

            let index_offset = indices.len() as u32;
            let vertex_offset = positions.len() as u32;

            if let Some(iter) = reader.read_positions() {
                positions.extend(iter.map(|p| Point3::new(p[0], p[1], p[2])));
            }
            if let Some(iter) = reader.read_normals() {
                normals.extend(iter.map(|n| Vector3::new(n[0], n[1], n[2])));
            }
            if let Some(iter) = reader.read_tex_coords(0) {
                uvs.extend(iter.into_f32());
            }
            if let Some(iter) = reader.read_indices() {
                indices.extend(iter.into_u32().map(|i| i + vertex_offset));
            }

            submeshes.push(SubmeshRange {
                index_offset,
                index_count: indices.len() as u32 - index_offset,
                material: None,
            });
        }
    }

    Ok(MeshSourceData { positions, normals, uvs, indices, submeshes })
}

fn import_texture(path: &Path) -> Result<TextureData, String> {
    let image = image::open(path).map_err(|e| e.to_string())?.to_rgba8();
    let (width, height) = image.dimensions();
    Ok(TextureData {
        width,
        height,
        pixels: Arc::from(image.into_raw().into_boxed_slice()),
        mip_levels: 1,
    })
}
