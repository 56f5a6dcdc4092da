//! Append-only sample store
//!
//! Per-series storage: one mutable active chunk plus a list of immutable
//! sealed chunks. Writers to the same series serialize on the series lock;
//! writers to different series never contend (dashmap-sharded outer map).
//! Readers snapshot under a brief read lock and iterate outside it, holding
//! `Arc` references so retention cannot free a chunk mid-scan.

mod chunk;

pub use chunk::{ActiveChunk, ChunkId, SealedChunk, SAMPLE_SIZE_BYTES};

use crate::clock::BoundedClock;
use crate::index::SeriesId;
use crate::schema::{Sample, TimeRange, TimestampMicros};
use crate::{Error, Result};

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sample store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Samples older than `now - lateness_window` are rejected
    pub lateness_window: Duration,
    /// Seal the active chunk at this many samples
    pub chunk_max_samples: usize,
    /// Seal the active chunk after it has been open this long
    pub chunk_max_span: Duration,
    /// Total memory bound across all unsealed chunks
    pub max_unsealed_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lateness_window: Duration::from_secs(300), // 5 minutes
            chunk_max_samples: 1024,
            chunk_max_span: Duration::from_secs(2 * 3600), // 2 hours
            max_unsealed_bytes: 64 * 1024 * 1024,          // 64 MB
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lateness_window.is_zero() {
            return Err(Error::Config("lateness_window must be positive".to_string()));
        }
        if self.chunk_max_samples == 0 {
            return Err(Error::Config("chunk_max_samples must be positive".to_string()));
        }
        if self.chunk_max_span.is_zero() {
            return Err(Error::Config("chunk_max_span must be positive".to_string()));
        }
        if self.max_unsealed_bytes == 0 {
            return Err(Error::Config("max_unsealed_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Per-series state guarded by a single lock: the series' write path
/// serializes here, independent of every other series.
struct SeriesInner {
    active: ActiveChunk,
    /// Sealed chunks in seal order (which is also write order)
    sealed: Vec<Arc<SealedChunk>>,
    /// Set by the idle sweep after it decides to drop the series; any writer
    /// that raced the sweep re-creates the shard instead of writing here.
    retired: bool,
}

struct SeriesShard {
    inner: RwLock<SeriesInner>,
}

impl SeriesShard {
    fn new(opened_at: TimestampMicros) -> Self {
        Self {
            inner: RwLock::new(SeriesInner {
                active: ActiveChunk::new(opened_at),
                sealed: Vec::new(),
                retired: false,
            }),
        }
    }
}

/// Append-only, chunked sample store for all series.
pub struct SampleStore {
    config: StoreConfig,
    clock: Arc<BoundedClock>,
    series: DashMap<SeriesId, Arc<SeriesShard>>,
    /// Bytes held by unsealed (active) chunks across all series
    unsealed_bytes: AtomicUsize,
}

impl SampleStore {
    pub fn new(config: StoreConfig, clock: Arc<BoundedClock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            series: DashMap::new(),
            unsealed_bytes: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Append one sample to a series.
    ///
    /// Rejects non-finite values and samples older than the lateness window
    /// (a sample at exactly `now - lateness_window` is accepted). Returns
    /// `Backpressure` when the unsealed-memory bound cannot be met even
    /// after force-sealing this series' active chunk.
    pub fn append(&self, id: SeriesId, sample: Sample) -> Result<()> {
        if !sample.value.is_finite() {
            return Err(Error::Validation(format!(
                "sample value must be finite, got {}",
                sample.value
            )));
        }

        let lateness_micros = self.config.lateness_window.as_micros() as i64;
        let horizon = self.clock.lateness_cutoff_micros(lateness_micros);
        if sample.timestamp < horizon {
            return Err(Error::TooLate {
                timestamp: sample.timestamp,
                horizon,
            });
        }

        loop {
            let shard = Arc::clone(
                self.series
                    .entry(id)
                    .or_insert_with(|| Arc::new(SeriesShard::new(self.clock.now_micros())))
                    .value(),
            );

            let mut inner = shard.inner.write();
            if inner.retired {
                // Lost a race with the idle sweep: drop the stale entry and
                // start over with a fresh shard.
                drop(inner);
                self.series.remove_if(&id, |_, v| Arc::ptr_eq(v, &shard));
                continue;
            }

            let now = self.clock.now_micros();
            if self.should_rotate(&inner.active, now) {
                self.seal_locked(&mut inner, now);
            }

            if self.over_memory_bound() {
                // Force an early seal; if the active chunk is already empty
                // the pressure comes from other series and this write must
                // wait its turn.
                if !inner.active.is_empty() {
                    self.seal_locked(&mut inner, now);
                }
                if self.over_memory_bound() {
                    return Err(Error::Backpressure);
                }
            }

            inner.active.push(sample);
            self.unsealed_bytes
                .fetch_add(SAMPLE_SIZE_BYTES, Ordering::Relaxed);
            return Ok(());
        }
    }

    /// Lazy, timestamp-ordered scan over `[range.start, range.end)`,
    /// merging sealed chunks with a snapshot of the active chunk and
    /// resolving exact-timestamp collisions last-write-wins.
    pub fn scan(&self, id: SeriesId, range: TimeRange) -> SeriesScan {
        let Some(shard) = self.series.get(&id).map(|e| Arc::clone(e.value())) else {
            return SeriesScan::empty(range);
        };

        // Snapshot under the read lock, iterate outside it.
        let (sealed, active_samples) = {
            let inner = shard.inner.read();
            let sealed: Vec<Arc<SealedChunk>> = inner
                .sealed
                .iter()
                .filter(|c| c.overlaps(&range))
                .map(Arc::clone)
                .collect();
            (sealed, inner.active.snapshot())
        };

        let mut sources = sealed;
        if !active_samples.is_empty() {
            // The active view is ordered and deduped like a sealed chunk; it
            // sits last in write order so it wins ties against sealed data.
            let view = SealedChunk::from_write_ordered(ChunkId::new(), active_samples);
            if view.overlaps(&range) {
                sources.push(Arc::new(view));
            }
        }

        SeriesScan::new(sources, range)
    }

    /// Seal the series' active chunk if non-empty. Returns true if a chunk
    /// was sealed.
    pub fn seal_active(&self, id: SeriesId) -> bool {
        let Some(shard) = self.series.get(&id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        let mut inner = shard.inner.write();
        if inner.retired || inner.active.is_empty() {
            return false;
        }
        let now = self.clock.now_micros();
        self.seal_locked(&mut inner, now);
        true
    }

    /// Seal the active chunk if it has been open longer than the chunk span.
    /// Keeps retention able to make progress on series that stopped writing.
    pub fn seal_if_expired(&self, id: SeriesId) -> bool {
        let Some(shard) = self.series.get(&id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        let mut inner = shard.inner.write();
        if inner.retired || inner.active.is_empty() {
            return false;
        }
        let now = self.clock.now_micros();
        let span_micros = self.config.chunk_max_span.as_micros() as i64;
        if now - inner.active.opened_at() < span_micros {
            return false;
        }
        self.seal_locked(&mut inner, now);
        true
    }

    /// Drop sealed chunks whose entire timestamp range is strictly before
    /// the cutoff. Returns the number of chunks dropped. In-flight scans
    /// holding `Arc` references keep their chunks alive until they finish.
    pub fn drop_expired_chunks(&self, id: SeriesId, cutoff: TimestampMicros) -> usize {
        let Some(shard) = self.series.get(&id).map(|e| Arc::clone(e.value())) else {
            return 0;
        };
        let mut inner = shard.inner.write();
        let before = inner.sealed.len();
        inner.sealed.retain(|c| !c.entirely_before(cutoff));
        let dropped = before - inner.sealed.len();
        if dropped > 0 {
            debug!(series = %id, dropped, cutoff, "Dropped expired chunks");
        }
        dropped
    }

    /// Merge adjacent runs of small sealed chunks into larger ones. A pure
    /// storage-layout transform: sample order and values are preserved, and
    /// compacting already-compacted chunks is a no-op. Returns the number of
    /// merges performed.
    pub fn compact_series(&self, id: SeriesId, min_chunk_samples: usize) -> usize {
        let Some(shard) = self.series.get(&id).map(|e| Arc::clone(e.value())) else {
            return 0;
        };
        let mut inner = shard.inner.write();

        let mut merges = 0;
        let mut out: Vec<Arc<SealedChunk>> = Vec::with_capacity(inner.sealed.len());
        let mut run: Vec<Arc<SealedChunk>> = Vec::new();

        for chunk in inner.sealed.drain(..) {
            if chunk.len() < min_chunk_samples {
                run.push(chunk);
            } else {
                flush_run(&mut out, &mut run, &mut merges);
                out.push(chunk);
            }
        }
        flush_run(&mut out, &mut run, &mut merges);

        inner.sealed = out;
        merges
    }

    /// Remove the series if it holds no data. Returns true if removed.
    /// Writers that race the removal re-create the shard (see `append`).
    pub fn remove_if_idle(&self, id: SeriesId) -> bool {
        let Some(shard) = self.series.get(&id).map(|e| Arc::clone(e.value())) else {
            return false;
        };
        {
            let mut inner = shard.inner.write();
            if !inner.active.is_empty() || !inner.sealed.is_empty() {
                return false;
            }
            inner.retired = true;
        }
        self.series.remove_if(&id, |_, v| Arc::ptr_eq(v, &shard));
        true
    }

    /// Sealed chunks of a series in seal order (archive flush path).
    pub fn sealed_chunks(&self, id: SeriesId) -> Vec<Arc<SealedChunk>> {
        match self.series.get(&id) {
            Some(entry) => entry.value().inner.read().sealed.clone(),
            None => Vec::new(),
        }
    }

    /// Adopt a chunk reloaded from the archive, appended in write order.
    pub fn adopt_sealed(&self, id: SeriesId, chunk: SealedChunk) {
        let shard = Arc::clone(
            self.series
                .entry(id)
                .or_insert_with(|| Arc::new(SeriesShard::new(self.clock.now_micros())))
                .value(),
        );
        shard.inner.write().sealed.push(Arc::new(chunk));
    }

    /// Handles of all series currently holding a shard, sorted.
    pub fn series_ids(&self) -> Vec<SeriesId> {
        let mut out: Vec<SeriesId> = self.series.iter().map(|e| *e.key()).collect();
        out.sort();
        out
    }

    pub fn contains(&self, id: SeriesId) -> bool {
        self.series.contains_key(&id)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn unsealed_bytes(&self) -> usize {
        self.unsealed_bytes.load(Ordering::Relaxed)
    }

    fn over_memory_bound(&self) -> bool {
        self.unsealed_bytes.load(Ordering::Relaxed) + SAMPLE_SIZE_BYTES
            > self.config.max_unsealed_bytes
    }

    fn should_rotate(&self, active: &ActiveChunk, now: TimestampMicros) -> bool {
        if active.is_empty() {
            return false;
        }
        let span_micros = self.config.chunk_max_span.as_micros() as i64;
        active.len() >= self.config.chunk_max_samples || now - active.opened_at() >= span_micros
    }

    /// Seal the active chunk under the series write lock, releasing its
    /// unsealed-memory accounting and opening a fresh chunk.
    fn seal_locked(&self, inner: &mut SeriesInner, now: TimestampMicros) {
        let active = std::mem::replace(&mut inner.active, ActiveChunk::new(now));
        if active.is_empty() {
            return;
        }
        self.unsealed_bytes
            .fetch_sub(active.size_bytes(), Ordering::Relaxed);
        let sealed = active.seal();
        debug!(
            chunk = %sealed.id(),
            samples = sealed.len(),
            "Sealed chunk"
        );
        inner.sealed.push(Arc::new(sealed));
    }
}

fn flush_run(out: &mut Vec<Arc<SealedChunk>>, run: &mut Vec<Arc<SealedChunk>>, merges: &mut usize) {
    match run.len() {
        0 => {}
        1 => out.push(run.pop().unwrap_or_else(|| unreachable!())),
        _ => {
            let parts: Vec<&SealedChunk> = run.iter().map(|c| c.as_ref()).collect();
            out.push(Arc::new(SealedChunk::merge(&parts)));
            run.clear();
            *merges += 1;
        }
    }
}

/// Lazy iterator over a scan snapshot: k-way merge of ordered chunks with
/// last-write-wins on exact-timestamp ties (later source index wins).
pub struct SeriesScan {
    /// Chunks in write order; the active-chunk view, if any, is last
    sources: Vec<Arc<SealedChunk>>,
    cursors: Vec<usize>,
    range: TimeRange,
}

impl SeriesScan {
    fn new(sources: Vec<Arc<SealedChunk>>, range: TimeRange) -> Self {
        let cursors = sources
            .iter()
            .map(|chunk| {
                chunk
                    .samples()
                    .partition_point(|s| s.timestamp < range.start)
            })
            .collect();
        Self {
            sources,
            cursors,
            range,
        }
    }

    fn empty(range: TimeRange) -> Self {
        Self {
            sources: Vec::new(),
            cursors: Vec::new(),
            range,
        }
    }
}

impl Iterator for SeriesScan {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        // Smallest in-range timestamp across cursors; on ties the
        // latest-written source (highest index) supplies the value.
        let mut chosen: Option<(TimestampMicros, usize)> = None;
        for (idx, chunk) in self.sources.iter().enumerate() {
            let cursor = self.cursors[idx];
            let Some(sample) = chunk.samples().get(cursor) else {
                continue;
            };
            if sample.timestamp >= self.range.end {
                continue;
            }
            chosen = match chosen {
                Some((ts, _)) if sample.timestamp > ts => chosen,
                // `>=` so a later source wins the tie
                _ => Some((sample.timestamp, idx)),
            };
        }

        let (ts, winner) = chosen?;
        let sample = self.sources[winner].samples()[self.cursors[winner]];
        // Advance every cursor sitting on the emitted timestamp.
        for (idx, chunk) in self.sources.iter().enumerate() {
            if let Some(s) = chunk.samples().get(self.cursors[idx]) {
                if s.timestamp == ts {
                    self.cursors[idx] += 1;
                }
            }
        }
        Some(sample)
    }
}
