//! Archive round-trip tests: sealed chunks flushed to durable storage and
//! reloaded must reproduce an identical ordered sample sequence.

use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use pulsevault::prelude::*;
use std::sync::Arc;

fn populated_store() -> (Arc<SeriesIndex>, Arc<SampleStore>, SeriesId, i64) {
    let clock = Arc::new(BoundedClock::default());
    let base = clock.now_micros();
    let index = Arc::new(SeriesIndex::new());
    let store = Arc::new(SampleStore::new(StoreConfig::default(), clock).unwrap());

    let identity = MetricIdentity::new("cpu", vec![Label::new("host", "a")]).unwrap();
    let id = index.resolve(&identity);
    for (offset, value) in [(0, 1.0), (10, -2.5), (20, 1.0e-12), (30, 4.0)] {
        store.append(id, Sample::new(base + offset, value)).unwrap();
    }
    store.seal_active(id);

    (index, store, id, base)
}

#[tokio::test]
async fn memory_archive_round_trip_is_lossless() {
    let (index, store, id, _base) = populated_store();
    let archive = ObjectStoreArchive::new(Arc::new(InMemory::new()), "chunks");
    let identity = index.identity(id).unwrap();

    let sealed = store.sealed_chunks(id);
    assert_eq!(sealed.len(), 1);

    let location = archive.write_chunk(&identity, &sealed[0]).await.unwrap();
    let reloaded = archive.read_chunk(&location).await.unwrap();

    assert_eq!(reloaded.id(), sealed[0].id());
    assert_eq!(reloaded.samples(), sealed[0].samples());
}

#[tokio::test]
async fn local_filesystem_archive_round_trip_is_lossless() {
    let (index, store, id, _base) = populated_store();
    let dir = tempfile::tempdir().unwrap();
    let fs = LocalFileSystem::new_with_prefix(dir.path()).unwrap();
    let archive = ObjectStoreArchive::new(Arc::new(fs), "chunks");
    let identity = index.identity(id).unwrap();

    let sealed = store.sealed_chunks(id);
    let location = archive.write_chunk(&identity, &sealed[0]).await.unwrap();
    let reloaded = archive.read_chunk(&location).await.unwrap();

    assert_eq!(reloaded.samples(), sealed[0].samples());
}

#[tokio::test]
async fn reloaded_chunk_adopted_into_a_fresh_store_scans_identically() {
    let (index, store, id, _base) = populated_store();
    let archive = ObjectStoreArchive::new(Arc::new(InMemory::new()), "chunks");
    let identity = index.identity(id).unwrap();

    let original: Vec<Sample> = store.scan(id, TimeRange::new(0, i64::MAX)).collect();
    let sealed = store.sealed_chunks(id);
    let location = archive.write_chunk(&identity, &sealed[0]).await.unwrap();

    // Rebuild the engine as if after a restart.
    let clock = Arc::new(BoundedClock::default());
    let fresh_index = Arc::new(SeriesIndex::new());
    let fresh_store = Arc::new(SampleStore::new(StoreConfig::default(), clock).unwrap());
    let fresh_id = fresh_index.resolve(&identity);

    let reloaded = archive.read_chunk(&location).await.unwrap();
    fresh_store.adopt_sealed(fresh_id, reloaded);

    let restored: Vec<Sample> = fresh_store
        .scan(fresh_id, TimeRange::new(0, i64::MAX))
        .collect();
    assert_eq!(restored, original);
}
