//! Sample chunks: mutable active chunk and immutable sealed chunks

use crate::schema::{Sample, TimeRange, TimestampMicros};
use std::fmt;
use uuid::Uuid;

/// In-memory cost of one sample, used for the unsealed-memory accounting.
pub const SAMPLE_SIZE_BYTES: usize = std::mem::size_of::<Sample>();

/// Unique chunk identifier, stable across archive round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(Uuid);

impl ChunkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ChunkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// The single writable chunk of a series. Samples are kept in write order;
/// sorting and duplicate resolution happen at seal time.
#[derive(Debug)]
pub struct ActiveChunk {
    samples: Vec<Sample>,
    /// Wall-clock micros when the chunk was opened, for time-span rotation
    opened_at: TimestampMicros,
}

impl ActiveChunk {
    pub fn new(opened_at: TimestampMicros) -> Self {
        Self {
            samples: Vec::new(),
            opened_at,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.samples.len() * SAMPLE_SIZE_BYTES
    }

    pub fn opened_at(&self) -> TimestampMicros {
        self.opened_at
    }

    /// Snapshot of the samples written so far, in write order. Readers take
    /// this copy under the series lock so they never observe a torn write.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.clone()
    }

    /// Seal into an immutable chunk: stable-sort by timestamp and collapse
    /// exact-timestamp duplicates keeping the most recent write.
    pub fn seal(self) -> SealedChunk {
        SealedChunk::from_write_ordered(ChunkId::new(), self.samples)
    }
}

/// An immutable, time-ordered block of samples for one series.
///
/// Invariant: samples are strictly increasing by timestamp (duplicates were
/// collapsed last-write-wins at seal time).
#[derive(Debug, Clone)]
pub struct SealedChunk {
    id: ChunkId,
    samples: Vec<Sample>,
}

impl SealedChunk {
    /// Build from samples in write order: stable-sort, then keep the last
    /// write for each timestamp.
    pub fn from_write_ordered(id: ChunkId, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        dedup_last_write(&mut samples);
        Self { id, samples }
    }

    /// Rebuild from already-ordered samples (archive decode path).
    pub fn from_ordered(id: ChunkId, samples: Vec<Sample>) -> Self {
        debug_assert!(samples.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        Self { id, samples }
    }

    /// Merge chunks in write order into one chunk. Later chunks win on
    /// exact-timestamp collisions. Merging a single chunk, or re-merging an
    /// already-merged chunk, reproduces the same logical sample set.
    pub fn merge(parts: &[&SealedChunk]) -> SealedChunk {
        let total: usize = parts.iter().map(|c| c.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in parts {
            samples.extend_from_slice(&chunk.samples);
        }
        SealedChunk::from_write_ordered(ChunkId::new(), samples)
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.samples.len() * SAMPLE_SIZE_BYTES
    }

    pub fn min_timestamp(&self) -> Option<TimestampMicros> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn max_timestamp(&self) -> Option<TimestampMicros> {
        self.samples.last().map(|s| s.timestamp)
    }

    pub fn overlaps(&self, range: &TimeRange) -> bool {
        match (self.min_timestamp(), self.max_timestamp()) {
            (Some(min), Some(max)) => range.overlaps_closed(min, max),
            _ => false,
        }
    }

    /// Whether every sample is strictly before the cutoff (retention check).
    pub fn entirely_before(&self, cutoff: TimestampMicros) -> bool {
        match self.max_timestamp() {
            Some(max) => max < cutoff,
            None => true,
        }
    }
}

/// Collapse runs of equal timestamps keeping the last element of each run.
/// Input must be stably sorted by timestamp so the last element of a run is
/// the most recent write.
fn dedup_last_write(samples: &mut Vec<Sample>) {
    if samples.len() < 2 {
        return;
    }
    let mut write = 0;
    for read in 0..samples.len() {
        let last_of_run =
            read + 1 == samples.len() || samples[read + 1].timestamp != samples[read].timestamp;
        if last_of_run {
            samples[write] = samples[read];
            write += 1;
        }
    }
    samples.truncate(write);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, value: f64) -> Sample {
        Sample::new(ts, value)
    }

    #[test]
    fn seal_sorts_and_keeps_most_recent_write() {
        let mut active = ActiveChunk::new(0);
        active.push(sample(30, 3.0));
        active.push(sample(10, 1.0));
        active.push(sample(30, 9.0)); // overwrites the first ts=30 write
        active.push(sample(20, 2.0));

        let sealed = active.seal();
        let got: Vec<(i64, f64)> = sealed.samples().iter().map(|s| (s.timestamp, s.value)).collect();
        assert_eq!(got, vec![(10, 1.0), (20, 2.0), (30, 9.0)]);
        assert_eq!(sealed.min_timestamp(), Some(10));
        assert_eq!(sealed.max_timestamp(), Some(30));
    }

    #[test]
    fn merge_preserves_order_and_last_write_wins_across_chunks() {
        let first =
            SealedChunk::from_write_ordered(ChunkId::new(), vec![sample(10, 1.0), sample(20, 2.0)]);
        let second =
            SealedChunk::from_write_ordered(ChunkId::new(), vec![sample(15, 1.5), sample(20, 7.0)]);

        let merged = SealedChunk::merge(&[&first, &second]);
        let got: Vec<(i64, f64)> = merged.samples().iter().map(|s| (s.timestamp, s.value)).collect();
        assert_eq!(got, vec![(10, 1.0), (15, 1.5), (20, 7.0)]);
    }

    #[test]
    fn merge_is_idempotent() {
        let first =
            SealedChunk::from_write_ordered(ChunkId::new(), vec![sample(10, 1.0), sample(20, 2.0)]);
        let second =
            SealedChunk::from_write_ordered(ChunkId::new(), vec![sample(30, 3.0)]);

        let once = SealedChunk::merge(&[&first, &second]);
        let twice = SealedChunk::merge(&[&once]);
        assert_eq!(once.samples(), twice.samples());
    }

    #[test]
    fn retention_check_uses_strict_inequality() {
        let chunk =
            SealedChunk::from_write_ordered(ChunkId::new(), vec![sample(10, 1.0), sample(20, 2.0)]);
        assert!(chunk.entirely_before(21));
        assert!(!chunk.entirely_before(20));
    }

    #[test]
    fn overlap_is_against_half_open_range() {
        let chunk =
            SealedChunk::from_write_ordered(ChunkId::new(), vec![sample(10, 1.0), sample(20, 2.0)]);
        assert!(chunk.overlaps(&TimeRange::new(20, 30)));
        assert!(!chunk.overlaps(&TimeRange::new(21, 30)));
        assert!(chunk.overlaps(&TimeRange::new(0, 11)));
        assert!(!chunk.overlaps(&TimeRange::new(0, 10)));
    }
}
