//! # PulseVault
//!
//! A metrics ingestion and time-series query engine.
//!
//! PulseVault is the core of a cloud-native monitoring system: append-only
//! ingestion of time-stamped samples, in-memory indexing by metric identity,
//! windowed aggregation, and concurrent read/write access under continuous
//! ingestion load. HTTP surfaces, dashboards, and alert delivery are
//! external collaborators that call into this crate.
//!
//! ## Architecture
//!
//! - **Series Index**: sharded map from metric identity (name + labels) to
//!   an opaque series handle, with matcher-based lookup
//! - **Sample Store**: per-series active chunk plus immutable sealed chunks,
//!   bounded lateness window, memory-bounded with backpressure
//! - **Ingester**: validates and routes samples, per-item batch results
//! - **Query Engine**: range scans with windowed sum/avg/max/min/rate
//! - **Compactor**: periodic retention, chunk merging, idle-series sweep
//! - **Archive**: optional lossless chunk persistence over object storage

pub mod archive;
pub mod clock;
pub mod compactor;
pub mod config;
pub mod index;
pub mod ingester;
pub mod query;
pub mod schema;
pub mod store;
pub mod telemetry;

mod error;

pub use error::{Error, Result};

/// Configuration for the PulseVault engine
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Sample store configuration
    pub store: store::StoreConfig,
    /// Retention/compaction configuration
    pub compactor: compactor::CompactorConfig,
}

impl Config {
    /// Validate all component configurations at startup.
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.compactor.validate()?;
        Ok(())
    }
}

/// Re-exports for convenience
pub mod prelude {
    pub use crate::archive::{ChunkArchive, ObjectStoreArchive};
    pub use crate::clock::BoundedClock;
    pub use crate::compactor::{Compactor, CompactorConfig};
    pub use crate::index::{SeriesId, SeriesIndex};
    pub use crate::ingester::Ingester;
    pub use crate::query::{Aggregation, QueryEngine, QueryPoint, QueryRequest};
    pub use crate::schema::{Label, LabelMatcher, MetricIdentity, Sample, TimeRange};
    pub use crate::store::{SampleStore, StoreConfig};
    pub use crate::{Config, Error, Result};
}
