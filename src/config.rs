//! Component factory for environment-based configuration
//!
//! Provides factory methods to create the archive's object store backend
//! from environment variables, enabling easy switching between development
//! and durable configurations.

use crate::Result;
use object_store::{local::LocalFileSystem, memory::InMemory, ObjectStore};
use std::sync::Arc;
use tracing::info;

pub struct ComponentFactory;

impl ComponentFactory {
    /// Create the archive object store from environment.
    ///
    /// Environment variables:
    /// - ARCHIVE_BACKEND: "memory" (default) or "local"
    /// - ARCHIVE_ROOT: filesystem root directory (required for local)
    pub fn create_object_store() -> Result<Arc<dyn ObjectStore>> {
        let backend = std::env::var("ARCHIVE_BACKEND").unwrap_or_else(|_| "memory".to_string());

        match backend.as_str() {
            "memory" => {
                info!("Using in-memory archive store (development mode)");
                Ok(Arc::new(InMemory::new()))
            }
            "local" => {
                let root = std::env::var("ARCHIVE_ROOT").map_err(|_| {
                    crate::Error::Config(
                        "ARCHIVE_ROOT required when ARCHIVE_BACKEND=local".to_string(),
                    )
                })?;
                info!("Using local filesystem archive store: root={}", root);
                let store = LocalFileSystem::new_with_prefix(&root)
                    .map_err(crate::Error::from)?;
                Ok(Arc::new(store))
            }
            _ => Err(crate::Error::Config(format!(
                "Unknown ARCHIVE_BACKEND: {}. Use 'memory' or 'local'",
                backend
            ))),
        }
    }
}
