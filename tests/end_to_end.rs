//! Full-stack checks over real sockets: several client sessions against
//! one server, and data written over the wire surviving a restart.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tributary::{
    ClientSession, EventData, EventStore, Head, OperationResult, ReadEventResult, ReadOutcome,
    Server, StoreOptions, EXPECTED_NO_STREAM,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn session(server: &Server) -> ClientSession {
    ClientSession::new(server.local_addr())
        .with_response_timeout(Duration::from_secs(2))
        .with_reconnect_delay(Duration::from_millis(50))
}

#[test]
fn concurrent_sessions_on_disjoint_streams() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    let store = Arc::new(EventStore::open(dir.path(), StoreOptions::default()).unwrap());
    let server = Server::start("127.0.0.1:0".parse().unwrap(), Arc::clone(&store)).unwrap();

    const SESSIONS: usize = 4;
    const EVENTS: i64 = 30;

    let handles: Vec<_> = (0..SESSIONS)
        .map(|s| {
            let mut client = session(&server);
            thread::spawn(move || {
                let stream = format!("session-{s}");
                for n in 0..EVENTS {
                    let payload = format!("{stream}:{n}").into_bytes();
                    let completed = client
                        .write_events(&stream, n - 1, vec![EventData::new("E", payload)])
                        .unwrap();
                    assert_eq!(completed.result, OperationResult::Success);
                    assert_eq!(completed.first_event_number, n);
                }
                for n in 0..EVENTS {
                    let read = client.read_event(&stream, n).unwrap();
                    assert_eq!(read.result, ReadEventResult::Success);
                    assert_eq!(read.data, format!("{stream}:{n}").into_bytes());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    server.shutdown();
    for s in 0..SESSIONS {
        assert_eq!(store.stream_head(&format!("session-{s}")), Head::At(EVENTS - 1));
    }
}

#[test]
fn wire_writes_survive_a_restart() {
    init_tracing();
    let dir = tempfile::TempDir::new().unwrap();
    {
        let store = Arc::new(EventStore::open(dir.path(), StoreOptions::default()).unwrap());
        let server = Server::start("127.0.0.1:0".parse().unwrap(), Arc::clone(&store)).unwrap();

        let mut client = session(&server);
        for n in 0..5i64 {
            let completed = client
                .write_events(
                    "durable",
                    n - 1,
                    vec![EventData::new("E", format!("v{n}").into_bytes())],
                )
                .unwrap();
            assert_eq!(completed.result, OperationResult::Success);
        }

        client.close();
        server.shutdown();
        store.flush().unwrap();
    }

    // Give connection threads a moment to observe the closed sockets and
    // drop their store handles; the flush above already made every
    // acknowledged write durable.
    thread::sleep(Duration::from_millis(100));
    let reopened = EventStore::open(dir.path(), StoreOptions::default()).unwrap();
    assert_eq!(reopened.stream_head("durable"), Head::At(4));
    for n in 0..5i64 {
        match reopened.read_event("durable", n).unwrap() {
            ReadOutcome::Success { data, .. } => assert_eq!(data, format!("v{n}").into_bytes()),
            other => panic!("expected success at v{n}, got {other:?}"),
        }
    }
}
