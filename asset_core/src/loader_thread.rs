use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use crate::asset::Asset;
use crate::importer;
use crate::metadata::AssetMetaData;

/// Request sent to the loader thread. Carries a metadata snapshot rather
/// than a live registry reference, so the loader thread never touches the
/// registry lock (spec.md 4.10's "request carries a metadata snapshot").
pub enum LoaderRequest {
    Load { metadata: AssetMetaData, asset_root: PathBuf, reload: bool },
    Shutdown,
}

pub struct LoadedAsset {
    pub asset: Asset,
    pub reloaded: bool,
}

/// A request/return channel pair plus the `JoinHandle` for the background
/// thread, grounded on `TextureLoader`'s `loop_until_exit`/`main` polling
/// loop and its `mpsc::{Receiver<LoaderRequest>, Sender<...>}` channels —
/// only the threading pattern is borrowed, since that example's GPU upload
/// calls are gfx-hal specific and out of scope here: this loader decodes
/// into CPU-side `Asset` payloads only, matching spec.md 4.10's "decode the
/// file off the main thread" wording (GPU upload is a caller concern).
pub struct AssetLoaderThread {
    request_tx: Sender<LoaderRequest>,
    return_rx: Receiver<LoadedAsset>,
    handle: Option<JoinHandle<()>>,
}

impl AssetLoaderThread {
    pub fn spawn() -> Self {
        let (request_tx, request_rx) = mpsc::channel::<LoaderRequest>();
        let (return_tx, return_rx) = mpsc::channel::<LoadedAsset>();

        let handle = std::thread::Builder::new()
            .name("asset-loader".into())
            .spawn(move || run(request_rx, return_tx))
            .expect("failed to spawn asset loader thread");

        Self {
            request_tx,
            return_rx,
            handle: Some(handle),
        }
    }

    pub fn enqueue(&self, metadata: AssetMetaData, asset_root: PathBuf, reload: bool) {
        // The receiving thread only ever stops in response to `Shutdown`,
        // so a send failure here means the thread already panicked.
        let _ = self.request_tx.send(LoaderRequest::Load { metadata, asset_root, reload });
    }

    /// Drains every asset that finished loading since the last call,
    /// matching `retrieve_ready_assets()`'s "synchronization point" role —
    /// the main thread calls this once per frame or tick, never blocking.
    pub fn retrieve_ready_assets(&self) -> Vec<LoadedAsset> {
        self.return_rx.try_iter().collect()
    }
}

impl Drop for AssetLoaderThread {
    fn drop(&mut self) {
        let _ = self.request_tx.send(LoaderRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(request_rx: Receiver<LoaderRequest>, return_tx: Sender<LoadedAsset>) {
    for request in request_rx.iter() {
        match request {
            LoaderRequest::Load { metadata, asset_root, reload } => {
                let asset = importer::import(&asset_root, &metadata);
                if return_tx.send(LoadedAsset { asset, reloaded: reload }).is_err() {
                    break;
                }
            }
            LoaderRequest::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::AssetHandle;
    use crate::metadata::AssetType;
    use std::time::{Duration, Instant};

    #[test]
    fn missing_file_returns_an_invalid_asset_without_blocking() {
        let loader = AssetLoaderThread::spawn();
        let metadata = AssetMetaData::new(AssetHandle::new(), AssetType::Texture, "does-not-exist.png".into());
        loader.enqueue(metadata, PathBuf::from("/nonexistent/asset/root"), false);

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut results = Vec::new();
        while results.is_empty() && Instant::now() < deadline {
            results = loader.retrieve_ready_assets();
            if results.is_empty() {
                std::thread::yield_now();
            }
        }

        assert_eq!(results.len(), 1);
        assert!(!results[0].asset.is_valid());
    }
}
