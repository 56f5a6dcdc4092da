//! Retention and compaction manager
//!
//! Runs on a periodic trigger, independent of the request path:
//! - Seals active chunks that outlived their time span
//! - Deletes sealed chunks entirely older than the retention horizon
//!   (with a clock-skew safety margin)
//! - Merges adjacent small sealed chunks into larger ones
//! - Sweeps idle series (no chunks left) out of the store and index
//!
//! Cycle errors are logged and retried next cycle; they are never fatal.

use crate::clock::BoundedClock;
use crate::index::SeriesIndex;
use crate::store::SampleStore;
use crate::{Error, Result};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Retention/compaction configuration
#[derive(Debug, Clone)]
pub struct CompactorConfig {
    /// Chunks entirely older than `now - retention_horizon` are deleted
    pub retention_horizon: Duration,
    /// Cycle interval
    pub check_interval: Duration,
    /// Sealed chunks smaller than this are merge candidates
    pub compaction_min_samples: usize,
    /// Remove series handles once no chunks remain
    pub sweep_idle_series: bool,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            retention_horizon: Duration::from_secs(24 * 3600), // 1 day
            check_interval: Duration::from_secs(60),           // Check every minute
            compaction_min_samples: 256,
            sweep_idle_series: true,
        }
    }
}

impl CompactorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention_horizon.is_zero() {
            return Err(Error::Config(
                "retention_horizon must be positive".to_string(),
            ));
        }
        if self.check_interval.is_zero() {
            return Err(Error::Config("check_interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// Outcome of one cycle, surfaced to logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub chunks_dropped: usize,
    pub chunks_merged: usize,
    pub series_swept: usize,
}

/// Retention/compaction service
pub struct Compactor {
    config: CompactorConfig,
    store: Arc<SampleStore>,
    index: Arc<SeriesIndex>,
    clock: Arc<BoundedClock>,
    /// Completed cycle counter, for observability
    cycles: AtomicU64,
    /// Cancellation token for graceful shutdown
    shutdown: CancellationToken,
}

impl Compactor {
    pub fn new(
        config: CompactorConfig,
        store: Arc<SampleStore>,
        index: Arc<SeriesIndex>,
        clock: Arc<BoundedClock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            index,
            clock,
            cycles: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        })
    }

    /// Get a cancellation token that can be used to trigger graceful shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the main service loop. Returns when the shutdown token is cancelled.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.check_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_cycle() {
                        Ok(report) => {
                            debug!(
                                chunks_dropped = report.chunks_dropped,
                                chunks_merged = report.chunks_merged,
                                series_swept = report.series_swept,
                                "Retention cycle complete"
                            );
                        }
                        Err(e) => {
                            // Never fatal: the next cycle retries.
                            error!("Retention cycle failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    info!("Compactor shutting down gracefully");
                    break;
                }
            }
        }
    }

    /// Run a single retention/compaction cycle.
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let retention_micros = self.config.retention_horizon.as_micros() as i64;
        let cutoff = self.clock.retention_cutoff_micros(retention_micros);

        let mut report = CycleReport::default();
        for id in self.store.series_ids() {
            // Seal stale actives first so long-idle series become evictable.
            self.store.seal_if_expired(id);

            report.chunks_dropped += self.store.drop_expired_chunks(id, cutoff);
            report.chunks_merged += self
                .store
                .compact_series(id, self.config.compaction_min_samples);

            if self.config.sweep_idle_series && self.store.remove_if_idle(id) {
                if let Some(identity) = self.index.remove(id) {
                    // A writer holding the handle can re-create the shard
                    // between the two removals; put the identity back so
                    // its data stays reachable through lookups.
                    if self.store.contains(id) && self.index.restore(id, identity) {
                        debug!(series = %id, "Sweep raced a writer, handle restored");
                    } else {
                        report.series_swept += 1;
                    }
                }
            }
        }

        self.cycles.fetch_add(1, Ordering::Relaxed);
        Ok(report)
    }

    pub fn completed_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }
}
