//! Minimal stand-in Redis servers for unit-testing the Dispatcher/Monitor's
//! protocol handling without a live cluster. Each helper speaks just enough
//! RESP to satisfy one canned exchange; none of this ships outside `cfg(test)`.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Accepts exactly one connection, reads whatever the client sends, replies
/// with `reply` verbatim, then closes. Good for a single command/response.
pub(crate) fn one_shot_reply(reply: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(&reply);
        }
    });
    addr
}

/// Accepts exactly one connection and closes it immediately without
/// replying, simulating a connection-level failure mid-command.
pub(crate) fn one_shot_close() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            drop(stream);
        }
    });
    addr
}

/// Serves `reply` on every connection it accepts, counting how many
/// connections it has seen so far. Used to verify a seed node is queried at
/// most once when concurrent refreshes collapse.
pub(crate) fn counting_reply(reply: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let count = Arc::new(AtomicUsize::new(0));
    let count_for_thread = Arc::clone(&count);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            count_for_thread.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(&reply);
        }
    });
    (addr, count)
}

/// RESP-encodes a single-master `CLUSTER SLOTS` reply covering `start..=end`.
pub(crate) fn cluster_slots_reply(start: u16, end: u16, host: &str, port: u16) -> Vec<u8> {
    format!(
        "*1\r\n*3\r\n:{start}\r\n:{end}\r\n*2\r\n${}\r\n{host}\r\n:{port}\r\n",
        host.len()
    )
    .into_bytes()
}

/// RESP-encodes a simple error reply, e.g. `-MOVED 1234 10.0.0.2:6380`.
pub(crate) fn error_reply(message: &str) -> Vec<u8> {
    format!("-{message}\r\n").into_bytes()
}

/// RESP-encodes a simple status reply, e.g. `+OK`.
pub(crate) fn status_reply(message: &str) -> Vec<u8> {
    format!("+{message}\r\n").into_bytes()
}

pub(crate) fn split_addr(addr: &str) -> (String, u16) {
    let (host, port) = addr.rsplit_once(':').unwrap();
    (host.to_string(), port.parse().unwrap())
}
