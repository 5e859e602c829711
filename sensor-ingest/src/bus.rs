//! Bounded fan-in queue between the supervisors and the writer.
//!
//! Built on `tokio::sync::mpsc`: the channel capacity gives backpressure (a
//! full bus parks producers in [`BusSender::send`]) and per-producer FIFO
//! order.  Closing is layered on top with a [`CancellationToken`] so that any
//! handle can close the bus while producer clones are still alive.
//!
//! ```text
//!  Supervisor A ──send──┐
//!                       ├──▶ [ bounded mpsc ] ──recv──▶ Writer
//!  Supervisor B ──send──┘            ▲
//!                                    │ close()
//!                              Coordinator
//! ```

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::record::DecodedRecord;

/// Returned by [`BusSender::send`] once the bus has been closed.  The record
/// that could not be delivered is handed back.
#[derive(Debug, Error)]
#[error("record bus is closed")]
pub struct BusClosed(pub DecodedRecord);

/// Create a bus holding at most `capacity` undelivered records.
///
/// # Panics
///
/// Panics if `capacity` is zero (as `tokio::sync::mpsc::channel` does).
pub fn bounded(capacity: usize) -> (BusSender, BusReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let closed = CancellationToken::new();
    (
        BusSender {
            tx,
            closed: closed.clone(),
        },
        BusReceiver {
            rx,
            closed,
            draining: false,
        },
    )
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Cloneable producer handle.
#[derive(Debug, Clone)]
pub struct BusSender {
    tx: mpsc::Sender<DecodedRecord>,
    closed: CancellationToken,
}

impl BusSender {
    /// Enqueue `record`, waiting while the bus is full.
    ///
    /// Fails once [`close`](Self::close) has been called, including for a
    /// sender that was parked on a full bus at that moment.
    pub async fn send(&self, record: DecodedRecord) -> Result<(), BusClosed> {
        if self.closed.is_cancelled() {
            return Err(BusClosed(record));
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(BusClosed(record)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(record);
                    Ok(())
                }
                Err(_) => Err(BusClosed(record)),
            },
        }
    }

    /// Stop accepting records.  Already-queued records stay deliverable.
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        if !self.closed.is_cancelled() {
            log::debug!("[bus] closed with {} record(s) queued", self.len());
        }
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }

    /// Records currently queued and not yet received.
    fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

// ---------------------------------------------------------------------------
// Consumer side
// ---------------------------------------------------------------------------

/// The single consumer handle.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::Receiver<DecodedRecord>,
    closed: CancellationToken,
    draining: bool,
}

impl BusReceiver {
    /// Next record in arrival order.
    ///
    /// Returns `None` only after the bus is closed (or every sender dropped)
    /// **and** every queued record has been handed out.
    pub async fn recv(&mut self) -> Option<DecodedRecord> {
        loop {
            if self.draining {
                return self.rx.recv().await;
            }
            tokio::select! {
                biased;
                record = self.rx.recv() => return record,
                _ = self.closed.cancelled() => {
                    // Refuse new sends; what is buffered is still returned.
                    self.rx.close();
                    self.draining = true;
                }
            }
        }
    }
}
