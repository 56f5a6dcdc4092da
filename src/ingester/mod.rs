//! Ingestion pipeline
//!
//! The ingester is the write-side entry point:
//! - Validates identities and sample values at the boundary
//! - Resolves series handles through the index
//! - Appends through the sample store
//! - Tracks accepted/rejected/backpressured counters
//!
//! Batched ingestion reports a per-item result so malformed or late
//! entries never block well-formed siblings.

use crate::index::{SeriesId, SeriesIndex};
use crate::schema::{MetricIdentity, Sample};
use crate::store::SampleStore;
use crate::{Error, Result};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Running counters for the ingest path.
#[derive(Debug, Default)]
pub struct IngestStats {
    accepted: AtomicU64,
    rejected_late: AtomicU64,
    rejected_invalid: AtomicU64,
    backpressured: AtomicU64,
}

/// Point-in-time snapshot of [`IngestStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStatsSnapshot {
    pub accepted: u64,
    pub rejected_late: u64,
    pub rejected_invalid: u64,
    pub backpressured: u64,
}

impl IngestStats {
    fn record(&self, result: &Result<SeriesId>) {
        match result {
            Ok(_) => self.accepted.fetch_add(1, Ordering::Relaxed),
            Err(Error::TooLate { .. }) => self.rejected_late.fetch_add(1, Ordering::Relaxed),
            Err(Error::Backpressure) => self.backpressured.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.rejected_invalid.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_late: self.rejected_late.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            backpressured: self.backpressured.load(Ordering::Relaxed),
        }
    }
}

/// Write-side pipeline: validate, resolve, append.
pub struct Ingester {
    index: Arc<SeriesIndex>,
    store: Arc<SampleStore>,
    stats: IngestStats,
}

impl Ingester {
    pub fn new(index: Arc<SeriesIndex>, store: Arc<SampleStore>) -> Self {
        Self {
            index,
            store,
            stats: IngestStats::default(),
        }
    }

    /// Ingest one sample. Returns the series handle on success so callers
    /// can correlate later queries.
    ///
    /// The identity is already structurally valid (its constructor enforces
    /// that); the store enforces value finiteness, lateness, and memory
    /// backpressure.
    pub fn ingest(&self, identity: &MetricIdentity, sample: Sample) -> Result<SeriesId> {
        let result = self.ingest_inner(identity, sample);
        self.stats.record(&result);

        match &result {
            Err(Error::TooLate { timestamp, horizon }) => {
                debug!(
                    identity = %identity,
                    timestamp,
                    horizon,
                    "Dropped late sample"
                );
            }
            Err(Error::Backpressure) => {
                warn!(identity = %identity, "Ingestion throttled by memory bound");
            }
            _ => {}
        }

        result
    }

    /// Ingest a batch with per-item results. Item failures never abort the
    /// rest of the batch.
    pub fn ingest_batch(
        &self,
        items: impl IntoIterator<Item = (MetricIdentity, Sample)>,
    ) -> Vec<Result<SeriesId>> {
        items
            .into_iter()
            .map(|(identity, sample)| self.ingest(&identity, sample))
            .collect()
    }

    fn ingest_inner(&self, identity: &MetricIdentity, sample: Sample) -> Result<SeriesId> {
        // Resolve only after the cheap value check so invalid samples never
        // create a series as a side effect.
        if !sample.value.is_finite() {
            return Err(Error::Validation(format!(
                "sample value must be finite, got {}",
                sample.value
            )));
        }
        loop {
            let id = self.index.resolve(identity);
            self.store.append(id, sample)?;
            // The idle sweep can retire the handle between resolve and
            // append, stranding the sample in a shard no lookup reaches.
            // Acknowledge only once the handle is confirmed live; otherwise
            // redo under the fresh handle the next resolve allocates (the
            // stranded shard drains through retention).
            if self.index.identity(id).is_some() {
                return Ok(id);
            }
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::BoundedClock;
    use crate::schema::Label;
    use crate::store::StoreConfig;

    fn pipeline() -> (Ingester, Arc<BoundedClock>) {
        let clock = Arc::new(BoundedClock::default());
        let index = Arc::new(SeriesIndex::new());
        let store = Arc::new(SampleStore::new(StoreConfig::default(), Arc::clone(&clock)).unwrap());
        (Ingester::new(index, store), clock)
    }

    fn cpu(host: &str) -> MetricIdentity {
        MetricIdentity::new("cpu", vec![Label::new("host", host)]).unwrap()
    }

    #[test]
    fn ingest_resolves_one_handle_per_identity() {
        let (ingester, clock) = pipeline();
        let ts = clock.now_micros();

        let a1 = ingester.ingest(&cpu("a"), Sample::new(ts, 1.0)).unwrap();
        let a2 = ingester.ingest(&cpu("a"), Sample::new(ts + 1, 2.0)).unwrap();
        let b = ingester.ingest(&cpu("b"), Sample::new(ts + 2, 3.0)).unwrap();

        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(ingester.stats().accepted, 3);
    }

    #[test]
    fn invalid_value_does_not_create_a_series() {
        let (ingester, clock) = pipeline();
        let ts = clock.now_micros();

        let err = ingester.ingest(&cpu("a"), Sample::new(ts, f64::NAN)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(ingester.index.series_count(), 0);
        assert_eq!(ingester.stats().rejected_invalid, 1);
    }

    #[test]
    fn batch_reports_per_item_results() {
        let (ingester, clock) = pipeline();
        let ts = clock.now_micros();
        let stale = ts - 3_600_000_000; // 1 hour old, far past the window

        let results = ingester.ingest_batch(vec![
            (cpu("a"), Sample::new(ts, 1.0)),
            (cpu("a"), Sample::new(stale, 2.0)),
            (cpu("b"), Sample::new(ts, f64::INFINITY)),
            (cpu("b"), Sample::new(ts + 1, 4.0)),
        ]);

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::TooLate { .. })));
        assert!(matches!(results[2], Err(Error::Validation(_))));
        assert!(results[3].is_ok(), "failed items must not block siblings");

        let stats = ingester.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.rejected_late, 1);
        assert_eq!(stats.rejected_invalid, 1);
    }

    #[test]
    fn ingest_after_a_sweep_acks_a_fresh_reachable_handle() {
        let (ingester, clock) = pipeline();
        let ts = clock.now_micros();
        let first = ingester.ingest(&cpu("a"), Sample::new(ts, 1.0)).unwrap();

        // Drain and sweep the series, store first then index, the order
        // the retention cycle uses.
        ingester.store.seal_active(first);
        ingester.store.drop_expired_chunks(first, ts + 1);
        assert!(ingester.store.remove_if_idle(first));
        assert!(ingester.index.remove(first).is_some());

        // The next write must not be acknowledged under the dead handle.
        let second = ingester.ingest(&cpu("a"), Sample::new(ts + 1, 2.0)).unwrap();
        assert_ne!(first, second);
        assert!(ingester.index.identity(second).is_some());
    }

    #[test]
    fn backpressure_is_counted_separately() {
        let clock = Arc::new(BoundedClock::default());
        let index = Arc::new(SeriesIndex::new());
        let mut config = StoreConfig::default();
        config.chunk_max_samples = 1_000_000;
        // Room for exactly one unsealed sample.
        config.max_unsealed_bytes = crate::store::SAMPLE_SIZE_BYTES;
        let store = Arc::new(SampleStore::new(config, Arc::clone(&clock)).unwrap());
        let ingester = Ingester::new(index, store);

        let ts = clock.now_micros();
        ingester.ingest(&cpu("a"), Sample::new(ts, 1.0)).unwrap();
        // Series "b" has nothing to force-seal, so the pressure held by "a"
        // throttles this write.
        let err = ingester.ingest(&cpu("b"), Sample::new(ts, 1.0)).unwrap_err();
        assert!(matches!(err, Error::Backpressure));

        let stats = ingester.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.backpressured, 1);
    }
}
