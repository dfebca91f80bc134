use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::handle::AssetHandle;

/// Tracks "asset A depends on asset B" edges (a mesh on its `MeshSource`, a
/// material on its textures) so that reloading B can notify every dependent
/// exactly once (spec.md 4.10, 8 property 7), regardless of how many times
/// the same dependency was registered.
#[derive(Default)]
pub struct DependencyGraph {
    // dependency -> dependents
    dependents: Mutex<HashMap<AssetHandle, HashSet<AssetHandle>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, dependent: AssetHandle, dependency: AssetHandle) {
        self.dependents
            .lock()
            .entry(dependency)
            .or_default()
            .insert(dependent);
    }

    pub fn unregister(&self, dependent: AssetHandle, dependency: AssetHandle) {
        if let Some(set) = self.dependents.lock().get_mut(&dependency) {
            set.remove(&dependent);
        }
    }

    pub fn remove_asset(&self, handle: AssetHandle) {
        let mut map = self.dependents.lock();
        map.remove(&handle);
        for set in map.values_mut() {
            set.remove(&handle);
        }
    }

    /// Returns every dependent of `dependency`, each appearing exactly once
    /// even though a `HashSet` already forbids duplicate registration —
    /// callers (`AssetManager::reload_data`) walk this list and invoke
    /// `on_dependency_updated` on each.
    pub fn dependents_of(&self, dependency: AssetHandle) -> Vec<AssetHandle> {
        self.dependents
            .lock()
            .get(&dependency)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependent_notified_once_despite_duplicate_registration() {
        let graph = DependencyGraph::new();
        let mesh = AssetHandle::from_raw(1);
        let source = AssetHandle::from_raw(2);
        graph.register(mesh, source);
        graph.register(mesh, source);

        assert_eq!(graph.dependents_of(source).len(), 1);
    }

    #[test]
    fn multiple_dependents_all_reported() {
        let graph = DependencyGraph::new();
        let source = AssetHandle::from_raw(9);
        let material_a = AssetHandle::from_raw(1);
        let material_b = AssetHandle::from_raw(2);
        graph.register(material_a, source);
        graph.register(material_b, source);

        let mut dependents = graph.dependents_of(source);
        dependents.sort();
        assert_eq!(dependents, vec![material_a, material_b]);
    }

    #[test]
    fn removing_asset_clears_both_directions() {
        let graph = DependencyGraph::new();
        let a = AssetHandle::from_raw(1);
        let b = AssetHandle::from_raw(2);
        graph.register(a, b);
        graph.remove_asset(a);
        assert!(graph.dependents_of(b).is_empty());
    }
}
