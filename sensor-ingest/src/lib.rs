//! `sensor-ingest`: persistent TCP telemetry ingestion into an append-only log.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   poll / frame   ┌────────────────────┐
//!  │ Endpoint A   │◀────────────────▶│ Supervisor (15 B)  │──┐
//!  └──────────────┘                  └────────────────────┘  │  DecodedRecord
//!  ┌──────────────┐   poll / frame   ┌────────────────────┐  ├──────────────▶ RecordBus ──▶ DurableWriter ──▶ log file
//!  │ Endpoint B   │◀────────────────▶│ Supervisor (21 B)  │──┘   (bounded)
//!  └──────────────┘                  └────────────────────┘
//!                                              ▲
//!                                     stop     │
//!                               ShutdownCoordinator
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: frame layouts, checksum, decoding
//! - [`record`]: decoded readings and their text rendering
//! - [`session`]: one TCP session (connect, command, frame read)
//! - [`state`]: supervisor finite-state machine
//! - [`supervisor`]: reconnecting per-endpoint poll loop
//! - [`bus`]: bounded multi-producer / single-consumer queue
//! - [`writer`]: durable append-only sink
//! - [`coordinator`]: startup and ordered shutdown
//! - [`config`]: endpoints, protocol strings, timeouts

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod packet;
pub mod record;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod writer;

pub use config::{EndpointConfig, IngestConfig, ProtocolConfig, SessionTiming};
pub use coordinator::{PipelineError, PipelineReport, ShutdownCoordinator};
pub use packet::{Decoder, PacketError};
pub use record::{DecodedRecord, Reading};
