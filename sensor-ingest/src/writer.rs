//! Durable append-only sink for decoded records.
//!
//! [`DurableWriter`] is the only owner of the destination file.  It writes a
//! header line once if the file starts out empty, then one line per record.
//! Every line is flushed and synced before the next record is taken off the
//! bus, so a crash loses at most the record being written.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::bus::BusReceiver;
use crate::record::DecodedRecord;

/// First line of a fresh log.
pub const HEADER: &str = "Source;Time;Data_Values...";

/// Any failure to persist.  There is no recovery path: the pipeline exists to
/// persist records, so the caller treats this as fatal.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot write to {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Single consumer that appends records to a text log.
#[derive(Debug)]
pub struct DurableWriter {
    file: File,
    path: PathBuf,
    written: u64,
}

impl DurableWriter {
    /// Open `path` for appending, creating it if needed.
    ///
    /// If the file is empty the header line is written (and synced) before
    /// this returns.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, WriterError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| WriterError::Open {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;
        let is_empty = file.metadata().await.map_err(open_err)?.len() == 0;

        let mut writer = Self {
            file,
            path,
            written: 0,
        };
        if is_empty {
            log::info!("[writer] {} is empty; writing header", writer.path.display());
            writer.write_line(HEADER).await?;
        }
        Ok(writer)
    }

    /// Append one record and push it to the storage device.
    pub async fn append(&mut self, record: &DecodedRecord) -> Result<(), WriterError> {
        self.write_line(&record.to_line()).await?;
        self.written += 1;
        Ok(())
    }

    /// Drain `bus` until it is closed and empty.
    ///
    /// Returns the number of records persisted by this writer.
    pub async fn run(mut self, mut bus: BusReceiver) -> Result<u64, WriterError> {
        log::info!("[writer] appending to {}", self.path.display());
        while let Some(record) = bus.recv().await {
            self.append(&record).await?;
            log::trace!("[writer] ← {record}");
        }
        log::info!(
            "[writer] bus drained; {} record(s) written to {}",
            self.written,
            self.path.display()
        );
        Ok(self.written)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), WriterError> {
        let result = async {
            self.file.write_all(line.as_bytes()).await?;
            self.file.write_all(b"\n").await?;
            self.file.flush().await?;
            self.file.sync_data().await
        }
        .await;
        result.map_err(|source| WriterError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
