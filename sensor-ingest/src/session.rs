//! TCP session with one sensor endpoint.
//!
//! [`Session`] is a thin wrapper around `tokio::net::TcpStream` that speaks
//! the poll protocol: write a short ASCII command, read back one fixed-size
//! frame.  Decoding and retry policy live elsewhere; this module owns only
//! byte I/O and its timeouts.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::SessionTiming;
use crate::packet::PacketError;

/// Scratch size used while discarding stale bytes.
const DRAIN_CHUNK: usize = 1024;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Everything that ends a session.
///
/// Every variant is recoverable by reconnecting; none is fatal to the
/// process.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Underlying I/O error from the OS (refused, reset, unreachable...).
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    /// An operation did not finish within its deadline.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    /// Peer closed the stream before a full frame arrived.
    #[error("end of stream after {received} of {expected} bytes")]
    Eof { received: usize, expected: usize },
    /// A complete frame arrived but failed validation.
    #[error("frame rejected: {0}")]
    Packet(#[from] PacketError),
}

/// `true` for connection faults; `false` only for a frame that arrived in
/// full but failed validation.
pub fn is_transient(err: &SessionError) -> bool {
    !matches!(err, SessionError::Packet(_))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One live TCP connection to an endpoint.
#[derive(Debug)]
pub struct Session {
    /// Resolved address of the endpoint.
    pub peer: SocketAddr,
    stream: TcpStream,
    io_timeout: Duration,
}

impl Session {
    /// Open a connection to `addr` within `timing.connect_timeout`.
    ///
    /// Nagle's algorithm is disabled: every command is a handful of bytes and
    /// must leave immediately.
    pub async fn connect(addr: &str, timing: &SessionTiming) -> Result<Self, SessionError> {
        let stream = timeout(timing.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Timeout {
                op: "connect",
                after: timing.connect_timeout,
            })??;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            peer,
            stream,
            io_timeout: timing.io_timeout,
        })
    }

    /// Write `command` in full and flush it.
    pub async fn send(&mut self, command: &[u8]) -> Result<(), SessionError> {
        let io_timeout = self.io_timeout;
        let write = async {
            self.stream.write_all(command).await?;
            self.stream.flush().await
        };
        timeout(io_timeout, write)
            .await
            .map_err(|_| SessionError::Timeout {
                op: "write",
                after: io_timeout,
            })??;
        Ok(())
    }

    /// Discard whatever the endpoint has already queued, without waiting for
    /// more.  Returns the number of bytes thrown away.
    pub fn drain_backlog(&mut self) -> Result<usize, SessionError> {
        let mut scratch = [0u8; DRAIN_CHUNK];
        let mut discarded = 0;
        loop {
            match self.stream.try_read(&mut scratch) {
                Ok(0) => {
                    return Err(SessionError::Eof {
                        received: 0,
                        expected: 0,
                    })
                }
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fill `buf` completely, looping over partial reads.
    ///
    /// Each individual read is bounded by the I/O timeout.  A zero-byte read
    /// means the peer hung up mid-frame and is reported as
    /// [`SessionError::Eof`].
    pub async fn read_frame(&mut self, buf: &mut [u8]) -> Result<(), SessionError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = timeout(self.io_timeout, self.stream.read(&mut buf[filled..]))
                .await
                .map_err(|_| SessionError::Timeout {
                    op: "read",
                    after: self.io_timeout,
                })??;
            if n == 0 {
                return Err(SessionError::Eof {
                    received: filled,
                    expected: buf.len(),
                });
            }
            filled += n;
        }
        Ok(())
    }

    /// Send one poll command and read back exactly `buf.len()` bytes.
    pub async fn poll(&mut self, command: &[u8], buf: &mut [u8]) -> Result<(), SessionError> {
        self.send(command).await?;
        self.read_frame(buf).await
    }
}
