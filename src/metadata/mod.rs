//! Registry metadata retrieval

pub mod cache;
pub mod npm;

use crate::error::Result;
use crate::types::PackageMetadata;
use async_trait::async_trait;

pub use cache::MetadataCache;
pub use npm::NpmRegistryClient;

/// Source of package metadata, keyed by registry document URL.
///
/// A missing package must surface as `AuditError::MetadataFetch` with a
/// code (`E404` or the registry's own), so callers can tell it apart from
/// transport failures.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PackageMetadata>;
}
