//! Reference Server Tests
//!
//! End-to-end tests of StorageClient against the in-memory server, plus a few
//! raw-socket checks of the server's framing.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;

use common::{connect, RunningServer, IO_TIMEOUT};
use stowage::{ServerConfig, StowageError};

fn read_frame(stream: &mut TcpStream) -> String {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).unwrap();
    let len: usize = std::str::from_utf8(&header).unwrap().trim().parse().unwrap();
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();
    String::from_utf8(payload).unwrap()
}

fn raw_connection(server: &RunningServer) -> TcpStream {
    let stream = TcpStream::connect(server.addr).unwrap();
    stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
    stream
}

// =============================================================================
// Object Lifecycle
// =============================================================================

#[test]
fn test_put_get_delete_binary_object() {
    let server = RunningServer::start();
    let client = connect(server.addr);

    let key = "3_1718000000000_photo.png";
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    client.put(key, &payload).unwrap();
    assert_eq!(client.get(key).unwrap(), payload);

    client.delete(key).unwrap();
    assert_eq!(client.get(key).unwrap_err().status(), Some(404));
    assert!(server.store.is_empty());
}

#[test]
fn test_empty_object() {
    let server = RunningServer::start();
    let client = connect(server.addr);

    client.put("empty", b"").unwrap();
    assert_eq!(client.get("empty").unwrap(), Vec::<u8>::new());
}

#[test]
fn test_duplicate_put_and_missing_delete() {
    let server = RunningServer::start();
    let client = connect(server.addr);

    client.put("once", b"first").unwrap();
    let err = client.put("once", b"second").unwrap_err();
    assert!(matches!(err, StowageError::Storage { status: 404, expected: 201 }));
    assert_eq!(client.get("once").unwrap(), b"first");

    let err = client.delete("never").unwrap_err();
    assert!(matches!(err, StowageError::Storage { status: 404, expected: 204 }));
}

#[test]
fn test_search_by_name_and_content() {
    let server = RunningServer::start();
    let client = connect(server.addr);

    client.put("1_100_notes.txt", b"meeting notes").unwrap();
    client.put("1_200_budget.xls", b"numbers").unwrap();
    client.put("2_300_todo.txt", b"chores").unwrap();

    assert_eq!(
        client.search(".txt").unwrap(),
        vec!["1_100_notes.txt", "2_300_todo.txt"]
    );
    // Stored payloads are base64 text; "bnVtYmVycw==" is "numbers"
    assert_eq!(client.search("bnVtYmVycw").unwrap(), vec!["1_200_budget.xls"]);
    assert!(client.search("nothing-matches").unwrap().is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_many_callers_share_one_client() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 20;

    let server = RunningServer::start();
    let client = connect(server.addr);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let client = client.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    let key = format!("{}_{}_file{}.bin", t, i, i);
                    let payload = format!("owner {} object {}", t, i).into_bytes();
                    client.put(&key, &payload).unwrap();
                    assert_eq!(client.get(&key).unwrap(), payload);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(server.store.len(), THREADS * PER_THREAD);
}

// =============================================================================
// Raw Protocol
// =============================================================================

#[test]
fn test_server_frames_are_space_padded() {
    let server = RunningServer::start();
    let mut stream = raw_connection(&server);

    stream.write_all(b"PUT k aGk=\n").unwrap();
    let mut raw = [0u8; 11];
    stream.read_exact(&mut raw).unwrap();
    assert_eq!(&raw, b"3       201");
}

#[test]
fn test_server_verbs_are_case_insensitive() {
    let server = RunningServer::start();
    let mut stream = raw_connection(&server);

    stream.write_all(b"put k aGk=\n").unwrap();
    assert_eq!(read_frame(&mut stream), "201");
    stream.write_all(b"Get k\n").unwrap();
    assert_eq!(read_frame(&mut stream), "200\naGk=");
    stream.write_all(b"delete k\n").unwrap();
    assert_eq!(read_frame(&mut stream), "204");
}

#[test]
fn test_server_rejects_malformed_commands() {
    let server = RunningServer::start();
    let mut stream = raw_connection(&server);

    for line in ["POST k aGk=\n", "GET\n", "PUT onlykey\n", "GET two words\n"] {
        stream.write_all(line.as_bytes()).unwrap();
        assert_eq!(read_frame(&mut stream), "400", "line {:?}", line);
    }

    // The connection stays usable
    stream.write_all(b"GET missing\n").unwrap();
    assert_eq!(read_frame(&mut stream), "404");
}

#[test]
fn test_server_drops_overlong_command_line() {
    let config = ServerConfig::builder()
        .listen_addr("127.0.0.1:0")
        .max_line_length(32)
        .build();
    let server = RunningServer::with_config(config);
    let mut stream = raw_connection(&server);

    // No terminator within the cap
    let mut line = b"PUT big ".to_vec();
    line.extend(std::iter::repeat(b'A').take(200));
    stream.write_all(&line).unwrap();

    assert_eq!(read_frame(&mut stream), "400");
    let mut rest = [0u8; 16];
    assert!(!matches!(stream.read(&mut rest), Ok(n) if n > 0));

    // Other connections are unaffected
    let client = connect(server.addr);
    client.put("small", b"ok").unwrap();
    assert_eq!(client.get("small").unwrap(), b"ok");
}
