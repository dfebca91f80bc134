use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::asset::Asset;
use crate::dependency::DependencyGraph;
use crate::handle::AssetHandle;
use crate::loader_thread::AssetLoaderThread;
use crate::locate::{locate_missing_asset, LocateResult};
use crate::metadata::{AssetMetaData, AssetStatus, AssetType};
use crate::registry::AssetRegistry;

/// Result of `get_asset_async` (spec.md 4.10): `ready` is false while the
/// load is still in flight on the background thread, in which case `asset`
/// is a placeholder of the expected type.
pub struct AsyncAssetResult {
    pub asset: Asset,
    pub ready: bool,
}

/// Shared interface both the editor and a future runtime/pack-based
/// implementation sit behind (`Iris::AssetManagerBase`). Only the editor
/// implementation is in scope here; the runtime variant is explicitly out
/// of scope per spec.md 4.10.
pub trait AssetManagerBase {
    fn shutdown(&mut self);
    fn get_asset_type(&self, handle: AssetHandle) -> AssetType;
    fn get_asset(&self, handle: AssetHandle) -> Option<Asset>;
    fn get_asset_async(&self, handle: AssetHandle) -> AsyncAssetResult;
    fn add_memory_only_asset(&self, asset: Asset, asset_type: AssetType, name: &str);
    fn reload_data(&self, handle: AssetHandle) -> bool;
    fn is_asset_handle_valid(&self, handle: AssetHandle) -> bool;
    fn is_memory_asset(&self, handle: AssetHandle) -> bool;
    fn is_asset_loaded(&self, handle: AssetHandle) -> bool;
    fn is_asset_valid(&self, handle: AssetHandle) -> bool;
    fn is_asset_missing(&self, handle: AssetHandle) -> bool;
    fn remove_asset(&self, handle: AssetHandle);
    fn register_dependency(&self, handle: AssetHandle, dependency: AssetHandle);
    fn sync_with_asset_thread(&self);
    fn all_assets_with_type(&self, asset_type: AssetType) -> Vec<AssetHandle>;
}

struct LoadedAssets {
    loaded: HashMap<AssetHandle, Asset>,
    memory_only: HashMap<AssetHandle, Asset>,
}

/// The editor-side `AssetManagerBase` implementation (spec.md 4.10): scans
/// the asset root on construction to import untracked files, keeps a
/// registry of handle->metadata, and hands off actual decoding to a
/// background `AssetLoaderThread`.
pub struct EditorAssetManager {
    asset_root: PathBuf,
    registry: AssetRegistry,
    assets: Mutex<LoadedAssets>,
    dependencies: DependencyGraph,
    loader: AssetLoaderThread,
}

impl EditorAssetManager {
    /// Loads (or creates) the registry at `asset_root/registry_file_name`,
    /// then scans for files not yet tracked (`ProcessDirectory`'s
    /// import-on-scan behavior).
    pub fn new(asset_root: impl Into<PathBuf>, registry_file_name: &str) -> Self {
        let asset_root = asset_root.into();
        let registry_path = asset_root.join(registry_file_name);

        let registry = match std::fs::read_to_string(&registry_path) {
            Ok(text) => match AssetRegistry::deserialize(&text) {
                Ok(registry) => registry,
                Err(e) => {
                    log::error!("asset registry appears to be corrupted: {e}");
                    AssetRegistry::new()
                }
            },
            Err(_) => AssetRegistry::new(),
        };

        let manager = Self {
            asset_root,
            registry,
            assets: Mutex::new(LoadedAssets { loaded: HashMap::new(), memory_only: HashMap::new() }),
            dependencies: DependencyGraph::new(),
            loader: AssetLoaderThread::spawn(),
        };

        manager.resolve_missing_entries();
        manager
    }

    fn resolve_missing_entries(&self) {
        for meta in self.registry.snapshot() {
            let full_path = self.asset_root.join(&meta.relative_path);
            if full_path.exists() {
                continue;
            }

            log::warn!("missing asset '{}' detected in registry, trying to locate...", meta.relative_path.display());
            match locate_missing_asset(&self.asset_root, &meta.relative_path) {
                LocateResult::Found(path) => {
                    let relative = path.strip_prefix(&self.asset_root).unwrap_or(&path).to_path_buf();
                    log::warn!("found likely match '{}'", relative.display());
                    let mut updated = meta.clone();
                    updated.relative_path = relative;
                    self.registry.insert(updated);
                }
                LocateResult::Ambiguous(candidates) => {
                    log::warn!("{} candidates found for '{}', flagging for user resolution", candidates.len(), meta.relative_path.display());
                }
                LocateResult::NotFound => {
                    log::error!("failed to locate a potential match for '{}'", meta.relative_path.display());
                }
            }
        }
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn metadata(&self, handle: AssetHandle) -> Option<AssetMetaData> {
        self.registry.get(handle)
    }

    /// Registers a new file-backed asset under a fresh handle and persists
    /// the registry immediately, matching `ImportAsset`.
    pub fn import_asset(&self, relative_path: impl Into<PathBuf>, asset_type: AssetType) -> AssetHandle {
        let relative_path = relative_path.into();
        if let Some(existing) = self.registry.handle_for_path(&relative_path) {
            return existing;
        }

        let handle = AssetHandle::new();
        self.registry.insert(AssetMetaData::new(handle, asset_type, relative_path));
        handle
    }

    fn asset_type_from_registry(&self, handle: AssetHandle) -> AssetType {
        self.metadata(handle).map(|m| m.asset_type).unwrap_or(AssetType::None)
    }

    /// Applies one finished load: updates the registry and `loaded` map,
    /// then, if it was a reload, fans `on_dependency_updated` out to every
    /// registered dependent exactly once (spec.md 4.10, 8 property 7).
    /// Factored out of `sync_with_asset_thread` so a test can drive it with
    /// a hand-built `LoadedAsset` instead of the real loader thread.
    fn apply_loaded_asset(&self, loaded: crate::loader_thread::LoadedAsset) {
        let handle = loaded.asset.handle;
        let reloaded = loaded.reloaded;
        self.registry.set_data_loaded(handle, true);
        self.registry.set_status(
            handle,
            if loaded.asset.is_valid() { AssetStatus::Ready } else { AssetStatus::Invalid },
        );
        let payload = loaded.asset.payload.clone();
        self.assets.lock().loaded.insert(handle, loaded.asset);

        if !reloaded {
            return;
        }
        let Some(payload) = payload else { return };
        for dependent in self.dependencies.dependents_of(handle) {
            let mut assets = self.assets.lock();
            if let Some(dependent_asset) = assets.loaded.get_mut(&dependent) {
                dependent_asset.on_dependency_updated(handle, &payload);
                log::debug!("notified {dependent} of dependency {handle} reload");
            }
        }
    }
}

impl AssetManagerBase for EditorAssetManager {
    fn shutdown(&mut self) {
        self.registry.clear();
        let mut assets = self.assets.lock();
        assets.loaded.clear();
        assets.memory_only.clear();
    }

    fn get_asset_type(&self, handle: AssetHandle) -> AssetType {
        self.asset_type_from_registry(handle)
    }

    /// Synchronous path: returns the cached asset if `is_data_loaded`,
    /// otherwise enqueues a background load, marks the registry entry
    /// `Loading`, and returns a placeholder — matching spec.md 4.10's
    /// concurrency contract verbatim.
    fn get_asset(&self, handle: AssetHandle) -> Option<Asset> {
        if let Some(asset) = self.assets.lock().memory_only.get(&handle) {
            return Some(asset.clone());
        }

        let meta = self.registry.get(handle)?;
        if meta.is_data_loaded {
            return self.assets.lock().loaded.get(&handle).cloned();
        }

        self.registry.set_status(handle, AssetStatus::Loading);
        self.loader.enqueue(meta, self.asset_root.clone(), false);
        Some(Asset::placeholder(handle))
    }

    fn get_asset_async(&self, handle: AssetHandle) -> AsyncAssetResult {
        if let Some(asset) = self.assets.lock().memory_only.get(&handle) {
            return AsyncAssetResult { asset: asset.clone(), ready: true };
        }

        match self.registry.get(handle) {
            Some(meta) if meta.is_data_loaded => {
                let asset = self.assets.lock().loaded.get(&handle).cloned();
                match asset {
                    Some(asset) => AsyncAssetResult { asset, ready: true },
                    None => AsyncAssetResult { asset: Asset::placeholder(handle), ready: false },
                }
            }
            Some(meta) => {
                self.registry.set_status(handle, AssetStatus::Loading);
                self.loader.enqueue(meta, self.asset_root.clone(), false);
                AsyncAssetResult { asset: Asset::placeholder(handle), ready: false }
            }
            None => AsyncAssetResult { asset: Asset::placeholder(handle), ready: false },
        }
    }

    fn add_memory_only_asset(&self, asset: Asset, asset_type: AssetType, name: &str) {
        let handle = asset.handle;
        self.registry.insert(AssetMetaData {
            handle,
            asset_type,
            relative_path: PathBuf::from(name),
            status: AssetStatus::Ready,
            is_data_loaded: true,
            is_memory_only: true,
        });
        self.assets.lock().memory_only.insert(handle, asset);
    }

    /// Triggers a fresh import of `handle`'s file, then — once applied via
    /// `sync_with_asset_thread` — fans out `on_dependency_updated` to every
    /// registered dependent exactly once (spec.md 8 property 7).
    fn reload_data(&self, handle: AssetHandle) -> bool {
        let Some(meta) = self.registry.get(handle) else { return false };
        if meta.is_memory_only {
            return false;
        }
        self.registry.set_data_loaded(handle, false);
        self.registry.set_status(handle, AssetStatus::Loading);
        self.loader.enqueue(meta, self.asset_root.clone(), true);
        true
    }

    fn is_asset_handle_valid(&self, handle: AssetHandle) -> bool {
        self.is_memory_asset(handle) || self.registry.get(handle).map(|m| m.is_valid()).unwrap_or(false)
    }

    fn is_memory_asset(&self, handle: AssetHandle) -> bool {
        self.assets.lock().memory_only.contains_key(&handle)
    }

    fn is_asset_loaded(&self, handle: AssetHandle) -> bool {
        self.assets.lock().loaded.contains_key(&handle)
    }

    fn is_asset_valid(&self, handle: AssetHandle) -> bool {
        self.assets
            .lock()
            .loaded
            .get(&handle)
            .map(Asset::is_valid)
            .unwrap_or(true)
    }

    fn is_asset_missing(&self, handle: AssetHandle) -> bool {
        match self.registry.get(handle) {
            Some(meta) if !meta.is_memory_only => !self.asset_root.join(&meta.relative_path).exists(),
            _ => false,
        }
    }

    fn remove_asset(&self, handle: AssetHandle) {
        self.registry.remove(handle);
        let mut assets = self.assets.lock();
        assets.loaded.remove(&handle);
        assets.memory_only.remove(&handle);
        self.dependencies.remove_asset(handle);
    }

    fn register_dependency(&self, handle: AssetHandle, dependency: AssetHandle) {
        self.dependencies.register(handle, dependency);
    }

    /// Drains the loader thread's return channel and applies each finished
    /// load (spec.md 4.10, 8 property 7).
    fn sync_with_asset_thread(&self) {
        for loaded in self.loader.retrieve_ready_assets() {
            self.apply_loaded_asset(loaded);
        }
    }

    fn all_assets_with_type(&self, asset_type: AssetType) -> Vec<AssetHandle> {
        self.registry.handles_of_type(asset_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_in(dir: &Path) -> EditorAssetManager {
        EditorAssetManager::new(dir, "AssetRegistry.iar")
    }

    #[test]
    fn get_asset_returns_placeholder_and_marks_loading_when_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tex.png"), b"").unwrap();
        let manager = manager_in(dir.path());
        let handle = manager.import_asset("tex.png", AssetType::Texture);

        let asset = manager.get_asset(handle).unwrap();
        assert!(!asset.is_valid());
        assert_eq!(manager.metadata(handle).unwrap().status, AssetStatus::Loading);
    }

    #[test]
    fn memory_only_assets_are_never_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        let handle = AssetHandle::new();
        manager.add_memory_only_asset(Asset::ready(handle, crate::asset::AssetPayload::Texture(crate::asset::TextureData {
            width: 1,
            height: 1,
            pixels: std::sync::Arc::from(vec![255u8, 255, 255, 255].into_boxed_slice()),
            mip_levels: 1,
        })), AssetType::Texture, "procedural-white");

        assert!(!manager.is_asset_missing(handle));
        assert!(manager.is_memory_asset(handle));
    }

    #[test]
    fn reload_fanout_updates_every_dependent_exactly_once() {
        use crate::asset::{AssetPayload, MeshSourceData, StaticMeshData, SubmeshRange};
        use crate::loader_thread::LoadedAsset;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());

        let source_handle = manager.import_asset("source.gltf", AssetType::MeshSource);
        let mesh_a = AssetHandle::new();
        let mesh_b = AssetHandle::new();

        {
            let mut assets = manager.assets.lock();
            assets.loaded.insert(
                mesh_a,
                Asset::ready(
                    mesh_a,
                    AssetPayload::StaticMesh(StaticMeshData { mesh_source: source_handle, submesh_materials: vec![] }),
                ),
            );
            assets.loaded.insert(
                mesh_b,
                Asset::ready(
                    mesh_b,
                    AssetPayload::StaticMesh(StaticMeshData { mesh_source: source_handle, submesh_materials: vec![] }),
                ),
            );
        }

        manager.register_dependency(mesh_a, source_handle);
        manager.register_dependency(mesh_a, source_handle); // duplicate registration must not double-notify
        manager.register_dependency(mesh_b, source_handle);

        let reloaded_source = Asset::ready(
            source_handle,
            AssetPayload::MeshSource(MeshSourceData {
                positions: Vec::new(),
                normals: Vec::new(),
                uvs: Vec::new(),
                indices: Vec::new(),
                submeshes: vec![
                    SubmeshRange { index_offset: 0, index_count: 3, material: None },
                    SubmeshRange { index_offset: 3, index_count: 3, material: None },
                ],
            }),
        );
        manager.apply_loaded_asset(LoadedAsset { asset: reloaded_source, reloaded: true });

        for mesh in [mesh_a, mesh_b] {
            let assets = manager.assets.lock();
            match &assets.loaded.get(&mesh).unwrap().payload {
                Some(AssetPayload::StaticMesh(data)) => assert_eq!(data.submesh_materials.len(), 2),
                _ => panic!("expected static mesh payload for {mesh}"),
            }
        }
    }

    #[test]
    fn removing_an_asset_drops_it_from_registry_and_dependency_graph() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_in(dir.path());
        let handle = manager.import_asset("mesh.gltf", AssetType::MeshSource);
        let dependent = manager.import_asset("static.mesh", AssetType::StaticMesh);
        manager.register_dependency(dependent, handle);

        manager.remove_asset(handle);
        assert!(!manager.is_asset_handle_valid(handle));
        assert!(manager.dependencies.dependents_of(handle).is_empty());
    }
}
