//! Concurrency and Lock Safety Tests
//!
//! Tests for:
//! - Concurrent writers to one array set never lose hyperslices
//! - Operations on different sets proceed independently
//! - Lock timeouts surface as `StorageUnavailable`
//! - A binary read stream keeps its set locked until dropped

use hyperstore::{ArrayError, ArrayStore, Attribute, ByteOrder, Config, Dimension, ScalarType};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_test_store(lock_timeout_ms: u64) -> (ArrayStore, TempDir) {
    let temp = TempDir::new().unwrap();
    let mut config = Config::with_data_dir(temp.path());
    config.storage.lock_timeout_ms = lock_timeout_ms;
    config.storage.performance.num_threads = 4;
    let store = ArrayStore::new(config).unwrap();
    (store, temp)
}

fn start_vector(store: &ArrayStore, id: &str, len: i64) {
    store
        .start_array(
            id,
            0,
            vec![Dimension::new("row", 0, len)],
            vec![Attribute::new("value", ScalarType::Int64)],
        )
        .unwrap();
}

// ============================================================================
// Concurrent Write Tests
// ============================================================================

#[test]
fn test_concurrent_writers_same_set() {
    let (store, _temp) = create_test_store(0);
    let id = store.create_arrayset(Some("shared")).unwrap();
    start_vector(&store, &id, 40);

    let store = Arc::new(store);
    let mut handles = vec![];
    for worker in 0..8i64 {
        let store = Arc::clone(&store);
        let id = id.clone();
        handles.push(thread::spawn(move || {
            let begin = worker * 5;
            let values: Vec<i64> = (begin..begin + 5).map(|v| v * 10).collect();
            store
                .write_json(&id, 0, 0, &format!("{begin}:{}", begin + 5), &json!(values))
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let expected: Vec<i64> = (0..40).map(|v| v * 10).collect();
    assert_eq!(store.read_json(&id, "0/0/...").unwrap(), json!([expected]));

    let stats = store.metadata(&id, None, Some(&[(0, 0)][..])).unwrap();
    let wire = serde_json::to_value(stats).unwrap();
    assert_eq!(wire["statistics"][0]["min"], json!(0));
    assert_eq!(wire["statistics"][0]["max"], json!(390));
}

#[test]
fn test_concurrent_sets_are_independent() {
    let (store, _temp) = create_test_store(0);
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let id = store.create_arrayset(Some(&format!("set-{worker}"))).unwrap();
                start_vector(&store, &id, 3);
                barrier.wait();
                store.write_json(&id, 0, 0, "...", &json!([worker, worker, worker])).unwrap();
                store.read_json(&id, "0/0/...").unwrap()
            })
        })
        .collect();

    for (worker, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), json!([[worker, worker, worker]]));
    }
    assert_eq!(store.list_arraysets().unwrap().len(), 4);
}

#[test]
fn test_concurrent_table_sorts_agree() {
    let (store, _temp) = create_test_store(0);
    let id = store.create_arrayset(Some("sorted")).unwrap();
    start_vector(&store, &id, 6);
    store.write_json(&id, 0, 0, "...", &json!([5, 3, 9, 1, 3, 0])).unwrap();

    let store = Arc::new(store);
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let id = id.clone();
            thread::spawn(move || {
                store
                    .table_unsorted_indices(&id, 0, "0-6", None, Some("0:ascending"), None)
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(
            handle.join().unwrap(),
            hyperstore::Encoded::Json(json!([5, 3, 1, 4, 0, 2]))
        );
    }
}

// ============================================================================
// Lock Timeout Tests
// ============================================================================

#[test]
fn test_held_lock_times_out() {
    let (store, _temp) = create_test_store(50);
    let id = store.create_arrayset(Some("busy")).unwrap();
    start_vector(&store, &id, 2);

    let held = store.open(&id).unwrap();
    let result = store.read_json(&id, "0/0/...");
    assert!(matches!(result, Err(ArrayError::StorageUnavailable(_))));

    drop(held);
    assert!(store.read_json(&id, "0/0/...").is_ok());
}

#[test]
fn test_timeout_does_not_block_other_sets() {
    let (store, _temp) = create_test_store(50);
    let busy = store.create_arrayset(Some("busy")).unwrap();
    let idle = store.create_arrayset(Some("idle")).unwrap();
    start_vector(&store, &idle, 2);

    let _held = store.open(&busy).unwrap();
    assert_eq!(store.array_indices(&idle).unwrap(), vec![0]);
}

#[test]
fn test_stream_holds_lock_until_dropped() {
    let (store, _temp) = create_test_store(50);
    let id = store.create_arrayset(Some("streamed")).unwrap();
    start_vector(&store, &id, 4);
    store.write_json(&id, 0, 0, "...", &json!([1, 2, 3, 4])).unwrap();

    let mut stream = store
        .read_stream(&id, "0/0/0:2|2:4", ByteOrder::Little)
        .unwrap();
    let first = stream.next().unwrap().unwrap();
    assert_eq!(first, [1i64.to_le_bytes(), 2i64.to_le_bytes()].concat());

    assert!(matches!(
        store.write_json(&id, 0, 0, "0", &json!(9)),
        Err(ArrayError::StorageUnavailable(_))
    ));

    let second = stream.next().unwrap().unwrap();
    assert_eq!(second, [3i64.to_le_bytes(), 4i64.to_le_bytes()].concat());
    assert!(stream.next().is_none());
    drop(stream);

    store.write_json(&id, 0, 0, "0", &json!(9)).unwrap();
}

#[test]
fn test_error_releases_lock() {
    let (store, _temp) = create_test_store(50);
    let id = store.create_arrayset(Some("errors")).unwrap();
    start_vector(&store, &id, 2);

    assert!(matches!(
        store.write_json(&id, 0, 3, "...", &json!([1, 2])),
        Err(ArrayError::InvalidAttribute { attribute: 3, .. })
    ));
    store.write_json(&id, 0, 0, "...", &json!([1, 2])).unwrap();
}
