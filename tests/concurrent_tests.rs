// Concurrent Access Tests for HadroDB
// These tests verify thread-safety of a DB shared through Arc

use hadrodb::{DataType, Error, Field, Options, Schema, Value, DB};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn schema() -> Schema {
    Schema::new(vec![Field::new("thread", DataType::Integer), Field::new("seq", DataType::Integer)])
        .unwrap()
}

/// Test concurrent writes from multiple threads
#[test]
fn test_concurrent_writes() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), schema(), Options::default()).unwrap());

    let num_threads = 8;
    let writes_per_thread = 200;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..writes_per_thread {
                    let key = format!("t{}_k{}", thread_id, i);
                    db.set_values(key.as_bytes(), vec![(thread_id as i64).into(), (i as i64).into()])
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(db.len().unwrap(), num_threads * writes_per_thread);
    for thread_id in 0..num_threads {
        for i in (0..writes_per_thread).step_by(17) {
            let key = format!("t{}_k{}", thread_id, i);
            let row = db.get(key.as_bytes()).unwrap();
            assert_eq!(row.get(1).and_then(Value::as_i64), Some(i as i64));
        }
    }

    // Every frame must be intact and aligned after interleaved appends.
    db.close().unwrap();
    let db = DB::open(dir.path(), schema(), Options::default()).unwrap();
    assert_eq!(db.recovery_stats().frames_replayed as usize, num_threads * writes_per_thread);
    assert_eq!(db.recovery_stats().truncated_bytes, 0);
}

/// Readers never observe a key whose index entry points at unwritten data
#[test]
fn test_concurrent_reads_during_writes() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), schema(), Options::default()).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let db = Arc::clone(&db);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..2000i64 {
                db.set_values(b"counter", vec![0i64.into(), i.into()]).unwrap();
                if i % 10 == 0 {
                    db.delete(b"flicker").unwrap();
                } else {
                    db.set_values(b"flicker", vec![1i64.into(), i.into()]).unwrap();
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last = -1i64;
                while !done.load(Ordering::SeqCst) {
                    if let Ok(row) = db.get(b"counter") {
                        let seq = row.get(1).and_then(Value::as_i64).unwrap();
                        assert!(seq >= last, "counter went backwards: {} < {}", seq, last);
                        last = seq;
                    }
                    match db.get(b"flicker") {
                        Ok(_) | Err(Error::KeyNotFound) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(db.get(b"counter").unwrap().get(1).and_then(Value::as_i64), Some(1999));
}

/// Scans and compaction interleaved with writers stay consistent
#[test]
fn test_concurrent_scan_and_compact() {
    let dir = TempDir::new().unwrap();
    let options = Options::default().scan_block_size(64);
    let db = Arc::new(DB::open(dir.path(), schema(), options).unwrap());

    let writers: Vec<_> = (0..4i64)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for i in 0..300i64 {
                    let key = format!("t{}_k{}", t, i % 25);
                    db.set_values(key.as_bytes(), vec![t.into(), i.into()]).unwrap();
                }
            })
        })
        .collect();

    let maintenance = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            for _ in 0..5 {
                let rows = db.scan_all().unwrap();
                let mut keys: Vec<&Vec<u8>> = rows.iter().map(|(k, _)| k).collect();
                let total = keys.len();
                keys.sort();
                keys.dedup();
                assert_eq!(keys.len(), total, "scan yielded a key twice");
                db.compact().unwrap();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    maintenance.join().unwrap();

    assert_eq!(db.len().unwrap(), 100);
    for t in 0..4i64 {
        for k in 0..25i64 {
            let row = db.get(format!("t{}_k{}", t, k).as_bytes()).unwrap();
            assert_eq!(row.get(1).and_then(Value::as_i64), Some(275 + k));
        }
    }
}

/// Closing while other threads still hold the handle fails them cleanly
#[test]
fn test_close_while_shared() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(DB::open(dir.path(), schema(), Options::default()).unwrap());
    db.set_values(b"k", vec![0i64.into(), 0i64.into()]).unwrap();

    let other = Arc::clone(&db);
    db.close().unwrap();

    let handle = thread::spawn(move || {
        assert!(matches!(other.get(b"k"), Err(Error::Closed)));
        assert!(matches!(other.close(), Ok(())));
    });
    handle.join().unwrap();
}
