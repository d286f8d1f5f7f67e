//! Run-scoped registry metadata cache

use super::RegistryClient;
use crate::error::Result;
use crate::types::PackageMetadata;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

type Slot = Arc<OnceCell<Arc<PackageMetadata>>>;

/// Metadata keyed by registry URL, alive for one run and never evicted.
///
/// Concurrent requests for the same URL share one in-flight fetch. A failed
/// fetch leaves the slot empty and the next caller tries again.
#[derive(Default)]
pub struct MetadataCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached metadata for `url`, fetching it through `client` once
    pub async fn get_or_fetch(
        &self,
        url: &str,
        client: &dyn RegistryClient,
    ) -> Result<Arc<PackageMetadata>> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(url.to_string()).or_default().clone()
        };

        if let Some(metadata) = slot.get() {
            debug!("metadata cache hit: {}", url);
            return Ok(metadata.clone());
        }

        let metadata = slot
            .get_or_try_init(|| async {
                debug!("metadata cache miss: {}", url);
                client.fetch(url).await.map(Arc::new)
            })
            .await?;
        Ok(metadata.clone())
    }

    /// Number of URLs with metadata stored
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
