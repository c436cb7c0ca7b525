//! Server Tests
//!
//! End-to-end tests over real TCP connections:
//! - GET / SET / DELETE scenarios through the client
//! - Opaque and CAS echo, unknown opcodes
//! - Malformed and truncated frames stay contained to their connection
//! - Start / stop lifecycle and connection limits

use std::io::{Read, Write};
use std::net::{Shutdown as SocketShutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use memkv::network::dispatch;
use memkv::protocol::{encode_request, read_response, write_request, Request, Response, Status};
use memkv::{CacheError, Client, Config, MemoryStore, Server, Storage};

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config() -> Config {
    Config::builder()
        .host("127.0.0.1")
        .port(0)
        .accept_poll_interval_ms(10)
        .build()
        .unwrap()
}

fn start_server(config: Config) -> (Server, Arc<MemoryStore>, SocketAddr) {
    let store = Arc::new(MemoryStore::new());
    let server = Server::new(config, store.clone());
    let addr = server.start().unwrap();
    (server, store, addr)
}

/// Start a server, run `test` against it, stop it
fn with_server<F>(test: F)
where
    F: FnOnce(&Server, &MemoryStore, &mut Client),
{
    let (server, store, addr) = start_server(test_config());
    let mut client = Client::connect(addr).unwrap();

    test(&server, &store, &mut client);

    server.stop().unwrap();
}

/// Poll `condition` for up to two seconds
fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// True once the peer has closed the socket
fn is_closed_by_peer(stream: &mut TcpStream) -> bool {
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = [0u8; 1];
    match stream.read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted
        ),
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_set() {
    with_server(|_, store, client| {
        client.set("foo", "my value").unwrap();

        assert_eq!(store.get(b"foo"), Some(Bytes::from("my value")));
    });
}

#[test]
fn test_set_and_get() {
    with_server(|_, _, client| {
        client.set("foo", "my value").unwrap();

        assert_eq!(client.get("foo").unwrap(), Some(Bytes::from("my value")));
    });
}

#[test]
fn test_get_not_existing() {
    with_server(|_, _, client| {
        assert_eq!(client.get("missing").unwrap(), None);
    });
}

#[test]
fn test_get_not_existing_status() {
    with_server(|_, _, client| {
        let response = client.execute(&Request::get("missing")).unwrap();

        assert_eq!(response.status, Status::KeyNotFound);
        assert_eq!(response.value, None);
    });
}

#[test]
fn test_set_twice() {
    with_server(|_, _, client| {
        client.set("foo", "my value").unwrap();
        assert_eq!(client.get("foo").unwrap(), Some(Bytes::from("my value")));

        client.set("foo", "my other value").unwrap();
        assert_eq!(client.get("foo").unwrap(), Some(Bytes::from("my other value")));
    });
}

#[test]
fn test_set_empty_value() {
    with_server(|_, _, client| {
        client.set("empty", Bytes::new()).unwrap();

        assert_eq!(client.get("empty").unwrap(), Some(Bytes::new()));
    });
}

#[test]
fn test_binary_key_and_value() {
    with_server(|_, _, client| {
        let key = Bytes::from(vec![0x00u8, 0x01, 0xFF, 0xFE, 0x80]);
        let value: Bytes = (0..=255u8).collect::<Vec<_>>().into();

        client.set(key.clone(), value.clone()).unwrap();

        assert_eq!(client.get(key).unwrap(), Some(value));
    });
}

#[test]
fn test_delete_existing() {
    with_server(|_, store, client| {
        client.set("foo", "my value").unwrap();
        client.delete("foo").unwrap();

        assert_eq!(client.get("foo").unwrap(), None);
        assert!(store.is_empty());
    });
}

#[test]
fn test_delete_non_existing() {
    with_server(|_, _, client| {
        let response = client.execute(&Request::delete("foo")).unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.value, None);

        assert_eq!(client.get("foo").unwrap(), None);
    });
}

// =============================================================================
// Correlation / Unknown Opcode Tests
// =============================================================================

#[test]
fn test_opaque_and_cas_echoed() {
    with_server(|_, _, client| {
        let request = Request::set("k", "v").with_opaque(0xDEADBEEF).with_cas(0x0102030405060708);
        let response = client.execute(&request).unwrap();

        assert_eq!(response.opcode, 0x01);
        assert_eq!(response.opaque, 0xDEADBEEF);
        assert_eq!(response.cas, 0x0102030405060708);

        let request = Request::get("k").with_opaque(17).with_cas(99);
        let response = client.execute(&request).unwrap();

        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.opaque, 17);
        assert_eq!(response.cas, 99);
        assert_eq!(response.value, Some(Bytes::from("v")));
    });
}

#[test]
fn test_set_ignores_cas() {
    with_server(|_, _, client| {
        client.set("k", "first").unwrap();

        let request = Request::set("k", "second").with_cas(12345);
        let response = client.execute(&request).unwrap();

        assert_eq!(response.status, Status::Ok);
        assert_eq!(client.get("k").unwrap(), Some(Bytes::from("second")));
    });
}

#[test]
fn test_unknown_opcode_answered_and_connection_continues() {
    with_server(|_, _, client| {
        client.set("counter", "1").unwrap();

        // INCREMENT with its 20 bytes of extras
        let request = Request::new(0x05)
            .with_extras(vec![0u8; 20])
            .with_key("counter")
            .with_opaque(55);
        let response = client.execute(&request).unwrap();

        assert_eq!(response.status, Status::UnknownCommand);
        assert_eq!(response.opcode, 0x05);
        assert_eq!(response.opaque, 55);
        assert_eq!(response.value, None);

        // Stream is still in sync
        assert_eq!(client.get("counter").unwrap(), Some(Bytes::from("1")));
    });
}

#[test]
fn test_back_to_back_frames_in_one_write() {
    let (server, _, addr) = start_server(test_config());
    let mut stream = TcpStream::connect(addr).unwrap();

    let mut buffer = Vec::new();
    write_request(&mut buffer, &Request::set("a", "1").with_opaque(1)).unwrap();
    write_request(&mut buffer, &Request::get("a").with_opaque(2)).unwrap();
    write_request(&mut buffer, &Request::delete("a").with_opaque(3)).unwrap();
    write_request(&mut buffer, &Request::get("a").with_opaque(4)).unwrap();
    stream.write_all(&buffer).unwrap();

    let expected = [
        (1, Status::Ok, None),
        (2, Status::Ok, Some(Bytes::from("1"))),
        (3, Status::Ok, None),
        (4, Status::KeyNotFound, None),
    ];
    for (opaque, status, value) in expected {
        let response = read_response(&mut stream).unwrap();
        assert_eq!(response.opaque, opaque);
        assert_eq!(response.status, status);
        assert_eq!(response.value, value);
    }

    server.stop().unwrap();
}

// =============================================================================
// Malformed Frame Tests
// =============================================================================

#[test]
fn test_truncated_frame_closes_only_that_connection() {
    let (server, _, addr) = start_server(test_config());
    let mut client = Client::connect(addr).unwrap();
    client.set("foo", "my value").unwrap();

    let mut bad = TcpStream::connect(addr).unwrap();
    let frame = encode_request(&Request::set("x", "partial")).unwrap();
    bad.write_all(&frame[..frame.len() - 3]).unwrap();
    bad.shutdown(SocketShutdown::Write).unwrap();

    // No partial response, just a close
    assert!(is_closed_by_peer(&mut bad));

    assert_eq!(client.get("foo").unwrap(), Some(Bytes::from("my value")));
    assert_eq!(client.get("x").unwrap(), None);

    server.stop().unwrap();
}

#[test]
fn test_bad_magic_closes_connection() {
    let (server, _, addr) = start_server(test_config());

    let mut bad = TcpStream::connect(addr).unwrap();
    let mut frame = encode_request(&Request::get("foo")).unwrap().to_vec();
    frame[0] = 0x42;
    bad.write_all(&frame).unwrap();

    assert!(is_closed_by_peer(&mut bad));

    let mut client = Client::connect(addr).unwrap();
    assert_eq!(client.get("foo").unwrap(), None);

    server.stop().unwrap();
}

#[test]
fn test_oversized_body_closes_connection() {
    let config = Config::builder()
        .host("127.0.0.1")
        .port(0)
        .max_body_size(64)
        .build()
        .unwrap();
    let (server, store, addr) = start_server(config);

    let mut client = Client::connect(addr).unwrap();
    assert!(client.set("big", vec![0u8; 128]).is_err());
    assert_eq!(store.get(b"big"), None);

    let mut client = Client::connect(addr).unwrap();
    client.set("small", "fits").unwrap();
    assert_eq!(client.get("small").unwrap(), Some(Bytes::from("fits")));

    server.stop().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_clients() {
    let (server, store, addr) = start_server(test_config());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                let mut client = Client::connect(addr).unwrap();
                for j in 0..50 {
                    let key = format!("key{}_{}", i, j);
                    client.set(key.clone(), format!("value{}_{}", i, j)).unwrap();
                    assert_eq!(
                        client.get(key).unwrap(),
                        Some(Bytes::from(format!("value{}_{}", i, j)))
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.len(), 8 * 50);

    // Visible from a fresh connection
    let mut client = Client::connect(addr).unwrap();
    assert_eq!(client.get("key7_49").unwrap(), Some(Bytes::from("value7_49")));

    server.stop().unwrap();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_start_and_stop() {
    let (server, _, addr) = start_server(test_config());

    assert!(server.is_running());
    assert_eq!(server.local_addr(), Some(addr));

    server.stop().unwrap();

    assert!(!server.is_running());
    assert_eq!(server.local_addr(), None);
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn test_start_twice_fails() {
    let (server, _, _) = start_server(test_config());

    assert!(matches!(server.start(), Err(CacheError::AlreadyRunning)));

    server.stop().unwrap();
}

#[test]
fn test_stop_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let server = Server::new(test_config(), store);

    // Never started
    server.stop().unwrap();

    server.start().unwrap();
    server.stop().unwrap();
    server.stop().unwrap();
}

#[test]
fn test_restart_after_stop() {
    let (server, store, _) = start_server(test_config());
    store.put(b"kept".to_vec(), Bytes::from("across restarts"));
    server.stop().unwrap();

    let addr = server.start().unwrap();
    let mut client = Client::connect(addr).unwrap();
    assert_eq!(client.get("kept").unwrap(), Some(Bytes::from("across restarts")));

    server.stop().unwrap();
}

#[test]
fn test_bind_failure_reported() {
    let (server, _, addr) = start_server(test_config());

    let config = Config::builder()
        .host("127.0.0.1")
        .port(addr.port())
        .build()
        .unwrap();
    let other = Server::new(config, Arc::new(MemoryStore::new()));

    assert!(matches!(other.start(), Err(CacheError::Io(_))));
    assert!(!other.is_running());

    server.stop().unwrap();
}

#[test]
fn test_join_returns_after_stop() {
    let (server, _, _) = start_server(test_config());
    let server = Arc::new(server);

    let joiner = {
        let server = Arc::clone(&server);
        thread::spawn(move || server.join())
    };

    server.stop().unwrap();
    joiner.join().unwrap();
}

#[test]
fn test_open_connection_closes_after_next_request_once_stopped() {
    let (server, _, addr) = start_server(test_config());
    let mut client = Client::connect(addr).unwrap();
    client.set("foo", "bar").unwrap();

    server.stop().unwrap();

    // The request already in flight is answered...
    assert_eq!(client.get("foo").unwrap(), Some(Bytes::from("bar")));
    // ...then the handler notices shutdown and closes
    assert!(client.get("foo").is_err());
}

#[test]
fn test_connection_limit() {
    let config = Config::builder()
        .host("127.0.0.1")
        .port(0)
        .max_connections(1)
        .accept_poll_interval_ms(10)
        .build()
        .unwrap();
    let (server, _, addr) = start_server(config);

    let mut first = Client::connect(addr).unwrap();
    first.set("k", "v").unwrap();
    assert_eq!(server.active_connections(), 1);

    let mut second = Client::connect(addr).unwrap();
    assert!(second.get("k").is_err());

    // The admitted connection is unaffected
    assert_eq!(first.get("k").unwrap(), Some(Bytes::from("v")));

    drop(first);
    assert!(eventually(|| server.active_connections() == 0));

    let mut third = Client::connect(addr).unwrap();
    assert_eq!(third.get("k").unwrap(), Some(Bytes::from("v")));

    server.stop().unwrap();
}

// =============================================================================
// Dispatch Tests
// =============================================================================

#[test]
fn test_dispatch_without_network() {
    let store = MemoryStore::new();

    let set = Request::set("foo", "my value").with_opaque(1);
    assert_eq!(dispatch(&store, &set), Response::ok(&set, None));

    let get = Request::get("foo").with_opaque(2);
    assert_eq!(
        dispatch(&store, &get),
        Response::ok(&get, Some(Bytes::from("my value")))
    );

    let delete = Request::delete("foo").with_opaque(3);
    assert_eq!(dispatch(&store, &delete), Response::ok(&delete, None));
    assert_eq!(dispatch(&store, &delete), Response::ok(&delete, None));

    assert_eq!(dispatch(&store, &get), Response::not_found(&get));

    let flush = Request::new(0x08).with_opaque(4);
    assert_eq!(dispatch(&store, &flush), Response::unknown_command(&flush));
}
