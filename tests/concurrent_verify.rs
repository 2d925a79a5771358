//! Concurrency checks against the embedded store: parallel writers on
//! disjoint streams, competing writers on one stream, and readers running
//! against an active writer.

use rand::Rng;
use std::sync::Arc;
use std::thread;
use tributary::{
    EventData, EventStore, Head, ReadOutcome, StoreOptions, WriteOutcome, EXPECTED_NO_STREAM,
};

fn open_store(dir: &tempfile::TempDir) -> Arc<EventStore> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Arc::new(
        EventStore::open(
            dir.path(),
            StoreOptions::default().with_chunk_capacity(32 * 1024),
        )
        .unwrap(),
    )
}

#[test]
fn parallel_writers_on_disjoint_streams() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = open_store(&dir);

    const WRITERS: usize = 8;
    const EVENTS: i64 = 50;

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let stream = format!("stream-{w}");
                for n in 0..EVENTS {
                    let payload = format!("{stream}:{n}").into_bytes();
                    let outcome = store
                        .append_to_stream(&stream, n - 1, vec![EventData::new("E", payload)])
                        .unwrap();
                    assert_eq!(outcome, WriteOutcome::Completed { first_event_number: n });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for w in 0..WRITERS {
        let stream = format!("stream-{w}");
        assert_eq!(store.stream_head(&stream), Head::At(EVENTS - 1));
        for n in 0..EVENTS {
            match store.read_event(&stream, n).unwrap() {
                ReadOutcome::Success { data, .. } => {
                    assert_eq!(data, format!("{stream}:{n}").into_bytes());
                }
                other => panic!("expected success at {stream} v{n}, got {other:?}"),
            }
        }
    }
}

#[test]
fn competing_writers_never_double_allocate_a_version() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = open_store(&dir);

    const WRITERS: usize = 4;
    const PER_WRITER: usize = 25;

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..PER_WRITER {
                    // Optimistic retry loop: observe the head, present it.
                    loop {
                        let expected = match store.stream_head("contended") {
                            Head::At(head) => head,
                            Head::Absent => EXPECTED_NO_STREAM,
                            Head::Deleted => panic!("stream was never deleted"),
                        };
                        let payload = format!("{w}:{n}").into_bytes();
                        match store
                            .append_to_stream(
                                "contended",
                                expected,
                                vec![EventData::new("E", payload)],
                            )
                            .unwrap()
                        {
                            WriteOutcome::Completed { .. } => break,
                            WriteOutcome::WrongExpectedVersion { .. } => continue,
                            other => panic!("unexpected outcome {other:?}"),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Every successful write took exactly one version.
    let total = (WRITERS * PER_WRITER) as i64;
    assert_eq!(store.stream_head("contended"), Head::At(total - 1));

    // Each writer's events appear exactly once, in the writer's own order.
    let mut seen: Vec<Vec<usize>> = vec![Vec::new(); WRITERS];
    for version in 0..total {
        match store.read_event("contended", version).unwrap() {
            ReadOutcome::Success { data, .. } => {
                let text = String::from_utf8(data).unwrap();
                let (w, n) = text.split_once(':').unwrap();
                seen[w.parse::<usize>().unwrap()].push(n.parse().unwrap());
            }
            other => panic!("expected success at v{version}, got {other:?}"),
        }
    }
    for (w, order) in seen.iter().enumerate() {
        let expected: Vec<usize> = (0..PER_WRITER).collect();
        assert_eq!(order, &expected, "writer {w} events out of order or lost");
    }
}

#[test]
fn readers_run_against_an_active_writer() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = open_store(&dir);

    const EVENTS: i64 = 200;

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for n in 0..EVENTS {
                let payload = format!("live:{n}").into_bytes();
                store
                    .append_to_stream("live", n - 1, vec![EventData::new("E", payload)])
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                loop {
                    let head = match store.stream_head("live") {
                        Head::At(head) => head,
                        Head::Absent => continue,
                        Head::Deleted => panic!("stream was never deleted"),
                    };
                    // Anything at or below the observed head must be stable.
                    for n in [0, rng.gen_range(0..=head), head] {
                        match store.read_event("live", n).unwrap() {
                            ReadOutcome::Success { data, .. } => {
                                assert_eq!(data, format!("live:{n}").into_bytes());
                            }
                            other => panic!("committed v{n} unreadable: {other:?}"),
                        }
                    }
                    if head == EVENTS - 1 {
                        return;
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}
