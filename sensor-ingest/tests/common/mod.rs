//! Shared helpers for integration tests: frame builders and a loopback fake
//! sensor that speaks the auth / poll protocol.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sensor_ingest::config::{ProtocolConfig, SessionTiming};
use sensor_ingest::packet::checksum;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TS: i64 = 1_700_000_000_000_000;

pub fn climate_frame(ts: i64, temperature: f32, pressure: i16) -> Vec<u8> {
    let mut buf = Vec::with_capacity(15);
    buf.extend_from_slice(&ts.to_be_bytes());
    buf.extend_from_slice(&temperature.to_be_bytes());
    buf.extend_from_slice(&pressure.to_be_bytes());
    buf.push(checksum(&buf));
    buf
}

pub fn motion_frame(ts: i64, x: i32, y: i32, z: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(21);
    buf.extend_from_slice(&ts.to_be_bytes());
    for v in [x, y, z] {
        buf.extend_from_slice(&v.to_be_bytes());
    }
    buf.push(checksum(&buf));
    buf
}

/// Short delays so reconnect scenarios finish quickly.
pub fn quick_timing() -> SessionTiming {
    SessionTiming {
        connect_timeout: Duration::from_millis(500),
        io_timeout: Duration::from_millis(500),
        settle_delay: Duration::from_millis(30),
        backoff: Duration::from_millis(150),
    }
}

/// Frame source: `(connection index, poll index) -> bytes to send back`.
pub type FrameFn = dyn Fn(usize, usize) -> Vec<u8> + Send + Sync;

/// A loopback endpoint that checks the auth token, pushes some stale bytes,
/// then answers each poll command with the frame `frames` returns.
pub struct FakeSensor {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    accepted_at: Arc<Mutex<Vec<Instant>>>,
}

impl FakeSensor {
    pub async fn spawn<F>(frames: F) -> Self
    where
        F: Fn(usize, usize) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let accepted_at = Arc::new(Mutex::new(Vec::new()));
        let frames: Arc<FrameFn> = Arc::new(frames);

        {
            let connections = Arc::clone(&connections);
            let accepted_at = Arc::clone(&accepted_at);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let conn = connections.fetch_add(1, Ordering::SeqCst);
                    accepted_at.lock().unwrap().push(Instant::now());
                    tokio::spawn(serve(stream, conn, Arc::clone(&frames)));
                }
            });
        }

        Self {
            addr,
            connections,
            accepted_at,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn accepted_at(&self) -> Vec<Instant> {
        self.accepted_at.lock().unwrap().clone()
    }
}

async fn serve(mut stream: TcpStream, conn: usize, frames: Arc<FrameFn>) {
    let protocol = ProtocolConfig::default();

    let mut token = vec![0u8; protocol.auth_token.len()];
    if stream.read_exact(&mut token).await.is_err() {
        return;
    }
    assert_eq!(token, protocol.auth_token.as_bytes(), "bad auth token");

    // Backlog the client must discard before its first poll.
    if stream.write_all(b"\x00\xffstale").await.is_err() {
        return;
    }

    let mut cmd = vec![0u8; protocol.poll_command.len()];
    let mut poll = 0;
    while stream.read_exact(&mut cmd).await.is_ok() {
        assert_eq!(cmd, protocol.poll_command.as_bytes(), "bad poll command");
        let frame = frames(conn, poll);
        // Split every frame so the client has to loop over partial reads.
        let (head, tail) = frame.split_at(frame.len() / 2);
        if stream.write_all(head).await.is_err() {
            return;
        }
        let _ = stream.flush().await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        if stream.write_all(tail).await.is_err() {
            return;
        }
        poll += 1;
    }
}
