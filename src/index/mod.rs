//! Series index mapping metric identities to series handles
//!
//! The index is the only global contention point in the write path, so it
//! is a sharded concurrent map (dashmap): resolves for different identities
//! never serialize against each other, and concurrent resolves for the same
//! identity return the same handle (at-most-one-creation).

use crate::schema::{LabelMatcher, MetricIdentity};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque handle bound 1:1 to a metric identity for the process lifetime.
/// Never reused for a different identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesId(u64);

impl SeriesId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Construct a handle from a raw id. Store-level tests use this to
    /// exercise the store without an index.
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "series-{}", self.0)
    }
}

/// Sharded concurrent index: identity -> handle, plus a reverse map for
/// query-time matcher evaluation.
pub struct SeriesIndex {
    forward: DashMap<MetricIdentity, SeriesId>,
    reverse: DashMap<SeriesId, Arc<MetricIdentity>>,
    next_id: AtomicU64,
}

impl SeriesIndex {
    pub fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Return the existing handle for this identity or atomically create one.
    ///
    /// The dashmap entry holds the shard lock across the create, so two
    /// concurrent resolves for the same identity cannot both allocate.
    pub fn resolve(&self, identity: &MetricIdentity) -> SeriesId {
        // Fast path: read-only lookup avoids taking the shard write lock.
        if let Some(existing) = self.forward.get(identity) {
            return *existing;
        }

        match self.forward.entry(identity.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let id = SeriesId(self.next_id.fetch_add(1, Ordering::Relaxed));
                // Reverse entry is published before the forward entry becomes
                // visible, so a lookup never sees a handle without an identity.
                self.reverse.insert(id, Arc::new(identity.clone()));
                entry.insert(id);
                id
            }
        }
    }

    /// Handles for all series whose name matches exactly and whose labels
    /// satisfy every matcher. Sorted by handle for deterministic output.
    pub fn lookup(&self, name: &str, matchers: &[LabelMatcher]) -> Vec<SeriesId> {
        let mut out: Vec<SeriesId> = self
            .reverse
            .iter()
            .filter(|entry| {
                let identity = entry.value();
                identity.name() == name && matchers.iter().all(|m| m.matches(identity))
            })
            .map(|entry| *entry.key())
            .collect();
        out.sort();
        out
    }

    /// Identity bound to a handle, if still registered.
    pub fn identity(&self, id: SeriesId) -> Option<Arc<MetricIdentity>> {
        self.reverse.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// All registered handles, sorted.
    pub fn series_ids(&self) -> Vec<SeriesId> {
        let mut out: Vec<SeriesId> = self.reverse.iter().map(|entry| *entry.key()).collect();
        out.sort();
        out
    }

    /// Drop a handle from the index, returning its identity. Used by the
    /// idle-series sweep after the store has confirmed no chunks remain. A
    /// later write for the same identity allocates a fresh handle.
    pub fn remove(&self, id: SeriesId) -> Option<Arc<MetricIdentity>> {
        let (_, identity) = self.reverse.remove(&id)?;
        self.forward.remove(identity.as_ref());
        Some(identity)
    }

    /// Re-register a removed handle whose series turned out to still hold
    /// data (a writer raced the sweep). Refuses if a fresh resolve already
    /// re-registered the identity under a new handle.
    pub fn restore(&self, id: SeriesId, identity: Arc<MetricIdentity>) -> bool {
        match self.forward.entry((*identity).clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                self.reverse.insert(id, identity);
                entry.insert(id);
                true
            }
        }
    }

    pub fn series_count(&self) -> usize {
        self.reverse.len()
    }
}

impl Default for SeriesIndex {
    fn default() -> Self {
        Self::new()
    }
}
