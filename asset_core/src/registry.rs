use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{AssetError, Result};
use crate::handle::AssetHandle;
use crate::metadata::{AssetMetaData, AssetStatus, AssetType};

/// Handle -> metadata map (spec.md 4.10), guarded by a single mutex — reads
/// and writes are short, matching `Iris::AssetRegistry`'s
/// `std::scoped_lock` around every access.
#[derive(Default, Debug)]
pub struct AssetRegistry {
    entries: Mutex<BTreeMap<AssetHandle, AssetMetaData>>,
}

#[derive(Serialize, Deserialize)]
struct RegistryFile {
    #[serde(rename = "Assets")]
    assets: Vec<RegistryEntry>,
}

#[derive(Serialize, Deserialize)]
struct RegistryEntry {
    #[serde(rename = "Handle")]
    handle: u64,
    #[serde(rename = "FilePath")]
    file_path: String,
    #[serde(rename = "Type")]
    asset_type: String,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, handle: AssetHandle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    pub fn insert(&self, metadata: AssetMetaData) {
        self.entries.lock().insert(metadata.handle, metadata);
    }

    pub fn remove(&self, handle: AssetHandle) -> Option<AssetMetaData> {
        self.entries.lock().remove(&handle)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn get(&self, handle: AssetHandle) -> Option<AssetMetaData> {
        self.entries.lock().get(&handle).cloned()
    }

    pub fn set_status(&self, handle: AssetHandle, status: AssetStatus) {
        if let Some(meta) = self.entries.lock().get_mut(&handle) {
            meta.status = status;
        }
    }

    pub fn set_data_loaded(&self, handle: AssetHandle, loaded: bool) {
        if let Some(meta) = self.entries.lock().get_mut(&handle) {
            meta.is_data_loaded = loaded;
        }
    }

    pub fn handle_for_path(&self, path: &Path) -> Option<AssetHandle> {
        self.entries
            .lock()
            .values()
            .find(|meta| meta.relative_path == path)
            .map(|meta| meta.handle)
    }

    pub fn handles_of_type(&self, asset_type: AssetType) -> Vec<AssetHandle> {
        self.entries
            .lock()
            .values()
            .filter(|meta| meta.asset_type == asset_type)
            .map(|meta| meta.handle)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<AssetMetaData> {
        self.entries.lock().values().cloned().collect()
    }

    /// Parses a registry file. A missing or corrupt `Assets` key is fatal
    /// (spec.md 4.10); an entry whose `Type` doesn't resolve to a known
    /// `AssetType` is skipped with a warning rather than aborting the whole
    /// load, matching `EditorAssetManager::LoadAssetRegistry`'s per-entry
    /// `continue`.
    pub fn deserialize(text: &str) -> Result<Self> {
        let raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| AssetError::RegistryParse { line: 0, reason: e.to_string() })?;

        let assets = raw
            .get("Assets")
            .ok_or(AssetError::RegistryCorrupt("Assets"))?;

        let entries: Vec<RegistryEntry> = serde_yaml::from_value(assets.clone())
            .map_err(|e| AssetError::RegistryParse { line: 0, reason: e.to_string() })?;

        let registry = Self::new();
        for entry in entries {
            let asset_type = AssetType::from_str_name(&entry.asset_type);
            if asset_type == AssetType::None {
                log::warn!("registry entry '{}' has unknown type '{}', skipping", entry.file_path, entry.asset_type);
                continue;
            }
            if entry.handle == 0 {
                log::warn!("registry entry '{}' has a null handle, skipping", entry.file_path);
                continue;
            }

            let metadata = AssetMetaData::new(
                AssetHandle::from_raw(entry.handle),
                asset_type,
                entry.file_path.into(),
            );
            registry.insert(metadata);
        }

        Ok(registry)
    }

    /// Emits entries in ascending handle order (the original's `std::map`
    /// re-sort before emitting), dropping memory-only entries (supplement 3
    /// of SPEC_FULL.md 10).
    pub fn serialize(&self) -> String {
        let entries = self.entries.lock();
        let assets: Vec<RegistryEntry> = entries
            .values()
            .filter(|meta| !meta.is_memory_only)
            .map(|meta| RegistryEntry {
                handle: meta.handle.raw(),
                file_path: meta.relative_path.to_string_lossy().replace('\\', "/"),
                asset_type: meta.asset_type.as_str_name().to_string(),
            })
            .collect();

        let file = RegistryFile { assets };
        serde_yaml::to_string(&file).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_sorts_by_handle_ascending() {
        let registry = AssetRegistry::new();
        registry.insert(AssetMetaData::new(AssetHandle::from_raw(20), AssetType::Texture, "b.png".into()));
        registry.insert(AssetMetaData::new(AssetHandle::from_raw(10), AssetType::StaticMesh, "a.mesh".into()));

        let text = registry.serialize();
        let reloaded = AssetRegistry::deserialize(&text).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(AssetHandle::from_raw(10)));
        assert!(reloaded.contains(AssetHandle::from_raw(20)));

        let ordered_handles: Vec<u64> = text
            .match_indices("Handle:")
            .map(|(idx, _)| text[idx..].split_whitespace().nth(1).unwrap().parse::<u64>().unwrap())
            .collect();
        assert_eq!(ordered_handles, vec![10, 20]);
    }

    #[test]
    fn memory_only_entries_are_dropped_on_serialize() {
        let registry = AssetRegistry::new();
        registry.insert(AssetMetaData::memory_only(AssetHandle::from_raw(5), AssetType::Texture));
        let text = registry.serialize();
        assert!(!text.contains('5'));
    }

    #[test]
    fn missing_assets_key_is_a_fatal_error() {
        let err = AssetRegistry::deserialize("NotAssets: []").unwrap_err();
        assert!(matches!(err, AssetError::RegistryCorrupt("Assets")));
    }

    #[test]
    fn unknown_type_entries_are_skipped_not_fatal() {
        let text = "Assets:\n  - Handle: 1\n    FilePath: x.bin\n    Type: SomeUnknownType\n";
        let registry = AssetRegistry::deserialize(text).unwrap();
        assert_eq!(registry.len(), 0);
    }
}
