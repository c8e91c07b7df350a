//! Cross-handle scenarios: several caches (standing in for separate
//! processes) sharing one directory, coordinated only by file locks.

use std::sync::{Arc, Barrier};
use std::thread;

use npu_cache::{CacheKey, DiskCache, FileStore, PosixFileStore, SetOutcome, SkipReason};
use npu_config::CacheConfig;

fn key(name: &str) -> CacheKey {
    CacheKey::parse(name).unwrap()
}

#[test]
fn concurrent_sets_store_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path(), 1 << 20);
    let blob: Arc<Vec<u8>> = Arc::new((0..64 * 1024).map(|i| (i % 253) as u8).collect());
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let config = config.clone();
            let blob = Arc::clone(&blob);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let cache = DiskCache::new(&config);
                barrier.wait();
                cache.set(&key("shared"), &blob)
            })
        })
        .collect();

    let outcomes: Vec<SetOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let stored = outcomes
        .iter()
        .filter(|o| matches!(o, SetOutcome::Stored { .. }))
        .count();
    assert_eq!(stored, 1, "outcomes: {outcomes:?}");
    for outcome in &outcomes {
        assert!(
            matches!(
                outcome,
                SetOutcome::Stored { .. }
                    | SetOutcome::Skipped(SkipReason::AlreadyCached)
                    | SetOutcome::Skipped(SkipReason::Locked)
            ),
            "unexpected outcome {outcome:?}"
        );
    }

    let cache = DiskCache::new(&config);
    let read = cache.get(&key("shared")).unwrap();
    assert_eq!(&*read, blob.as_slice());
}

#[test]
fn readers_never_see_partial_writes() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path(), 1 << 24);
    let blob: Arc<Vec<u8>> = Arc::new(vec![0x5a; 1 << 20]);
    let barrier = Arc::new(Barrier::new(5));

    let writer = {
        let config = config.clone();
        let blob = Arc::clone(&blob);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let cache = DiskCache::new(&config);
            barrier.wait();
            cache.set(&key("big"), &blob)
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let config = config.clone();
            let blob = Arc::clone(&blob);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let cache = DiskCache::new(&config);
                barrier.wait();
                for _ in 0..200 {
                    if let Some(read) = cache.get(&key("big")) {
                        assert_eq!(read.len(), blob.len());
                        assert!(read.iter().all(|&b| b == 0x5a));
                    }
                }
            })
        })
        .collect();

    let outcome = writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    // A reader can lock the freshly created empty file before the writer
    // does, in which case the writer backs off and removes it.
    let cache = DiskCache::new(&config);
    match outcome {
        SetOutcome::Stored { .. } => {}
        SetOutcome::Skipped(SkipReason::Locked) => {
            assert!(matches!(cache.set(&key("big"), &blob), SetOutcome::Stored { .. }));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(cache.get(&key("big")).unwrap().len(), blob.len());
}

#[test]
fn entry_being_written_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskCache::new(&CacheConfig::new(dir.path(), 1 << 20));

    let _writer = PosixFileStore
        .open_exclusive(&dir.path().join("pending"), true)
        .unwrap();
    assert!(cache.get(&key("pending")).is_none());
    assert!(dir.path().join("pending").exists());
    assert_eq!(
        cache.set(&key("pending"), b"late"),
        SetOutcome::Skipped(SkipReason::AlreadyCached)
    );
}

#[test]
fn blob_held_by_one_handle_blocks_eviction_by_another() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path(), 120);
    let reader = DiskCache::new(&config);
    let writer = DiskCache::new(&config);

    writer.set(&key("a"), &[1u8; 30]);
    let held = reader.get(&key("a")).unwrap();

    writer.set(&key("b"), &[2u8; 30]);
    writer.set(&key("c"), &[3u8; 30]);

    assert!(dir.path().join("a").exists());
    assert_eq!(&*held, &[1u8; 30][..]);

    drop(held);
    writer.set(&key("d"), &[4u8; 30]);
    assert!(writer.size() <= 120);
}

#[test]
fn handles_agree_on_directory_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path(), 1 << 20);
    let first = DiskCache::new(&config);
    let second = DiskCache::new(&config);

    first.set(&key("x"), b"from first");
    assert_eq!(&*second.get(&key("x")).unwrap(), b"from first");
    assert_eq!(first.size(), second.size());
    assert_eq!(second.entries().len(), 1);
}
