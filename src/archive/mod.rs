//! Durable chunk archive
//!
//! Optional persistence collaborator: sealed chunks can be flushed to and
//! reloaded from durable storage. The contract is lossless round-tripping,
//! not a mandated on-disk format; the implementation here stores the
//! binary chunk codec under an object store.

pub mod codec;

use crate::schema::MetricIdentity;
use crate::store::SealedChunk;
use crate::{Error, Result};

use async_trait::async_trait;
use object_store::path::Path;
use object_store::ObjectStore;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Persistence seam for sealed chunks. Chunks round-trip losslessly:
/// sample order and values are preserved exactly.
#[async_trait]
pub trait ChunkArchive: Send + Sync {
    /// Persist a sealed chunk, returning its storage location.
    async fn write_chunk(&self, identity: &MetricIdentity, chunk: &SealedChunk) -> Result<String>;

    /// Reload a previously written chunk by location.
    async fn read_chunk(&self, location: &str) -> Result<SealedChunk>;
}

/// Archive over any `object_store` backend (in-memory, local filesystem).
pub struct ObjectStoreArchive {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectStoreArchive {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Chunk location: prefix / metric name / identity hash / chunk id.
    /// The identity hash keeps distinct label sets of one metric apart.
    fn location(&self, identity: &MetricIdentity, chunk: &SealedChunk) -> String {
        format!("{}/chunk_{}.pvk", self.series_dir(identity), chunk.id())
    }

    fn series_dir(&self, identity: &MetricIdentity) -> String {
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        format!("{}/{}/{:016x}", self.prefix, identity.name(), hasher.finish())
    }

    /// Read back the identity manifest for a series directory, written
    /// alongside the first chunk so a reloader can map directories back to
    /// identities.
    pub async fn read_manifest(&self, series_dir: &str) -> Result<MetricIdentity> {
        let path = format!("{}/series.json", series_dir);
        let data = self
            .store
            .get(&Path::from(path.as_str()))
            .await?
            .bytes()
            .await
            .map_err(Error::from)?;
        let identity: MetricIdentity = serde_json::from_slice(&data)?;
        Ok(identity)
    }

    async fn write_manifest(&self, identity: &MetricIdentity) -> Result<String> {
        let dir = self.series_dir(identity);
        let path = format!("{}/series.json", dir);
        let data = serde_json::to_vec(identity)?;
        self.store
            .put(&Path::from(path.as_str()), data.into())
            .await?;
        Ok(dir)
    }
}

#[async_trait]
impl ChunkArchive for ObjectStoreArchive {
    async fn write_chunk(&self, identity: &MetricIdentity, chunk: &SealedChunk) -> Result<String> {
        self.write_manifest(identity).await?;
        let location = self.location(identity, chunk);
        let encoded = codec::encode(chunk);
        debug!(
            location = %location,
            samples = chunk.len(),
            size_bytes = encoded.len(),
            "Writing chunk to archive"
        );
        self.store
            .put(&Path::from(location.as_str()), encoded.into())
            .await?;
        Ok(location)
    }

    async fn read_chunk(&self, location: &str) -> Result<SealedChunk> {
        let data = self
            .store
            .get(&Path::from(location))
            .await?
            .bytes()
            .await
            .map_err(Error::from)?;
        codec::decode(&data)
    }
}
