//! Static configuration for the ingestion pipeline.
//!
//! Everything here is built once at startup and shared read-only between
//! tasks.  `Default` impls carry the production constants so the library can
//! be driven without the CLI.

use std::path::PathBuf;
use std::time::Duration;

use crate::packet::Decoder;

/// Address of the production sensor host.
pub const DEFAULT_HOST: &str = "95.163.237.76";
/// Port of the climate (temperature / pressure) endpoint.
pub const CLIMATE_PORT: u16 = 5123;
/// Port of the motion (X / Y / Z) endpoint.
pub const MOTION_PORT: u16 = 5124;
/// Token written once right after connecting.
pub const AUTH_TOKEN: &str = "isu_pt";
/// Command that asks an endpoint for one frame.
pub const POLL_COMMAND: &str = "get";
/// Destination log file.
pub const OUTPUT_FILE: &str = "sensor_data.csv";
/// Records the bus holds before producers block.
pub const BUS_CAPACITY: usize = 5000;

/// Timeouts and delays of one supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Upper bound on TCP connect.
    pub connect_timeout: Duration,
    /// Upper bound on every socket read and write.
    pub io_timeout: Duration,
    /// Pause after the auth token before stale bytes are drained.
    pub settle_delay: Duration,
    /// Pause between a failed session and the next connect attempt.
    pub backoff: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            io_timeout: Duration::from_millis(5000),
            settle_delay: Duration::from_millis(200),
            backoff: Duration::from_millis(1000),
        }
    }
}

/// ASCII strings exchanged with every endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub auth_token: String,
    pub poll_command: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auth_token: AUTH_TOKEN.to_owned(),
            poll_command: POLL_COMMAND.to_owned(),
        }
    }
}

/// One sensor source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub host: String,
    pub port: u16,
    /// Frame layout spoken by this endpoint.
    pub decoder: Decoder,
    /// Identifier written into every record from this endpoint.
    pub tag: String,
}

impl EndpointConfig {
    /// Endpoint tagged with its port number.
    pub fn new(host: impl Into<String>, port: u16, decoder: Decoder) -> Self {
        Self {
            host: host.into(),
            port,
            decoder,
            tag: port.to_string(),
        }
    }

    /// Bytes in one frame from this endpoint.
    pub fn packet_size(&self) -> usize {
        self.decoder.frame_len()
    }

    /// `host:port` in a form `TcpStream::connect` resolves.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub endpoints: Vec<EndpointConfig>,
    pub protocol: ProtocolConfig,
    pub timing: SessionTiming,
    pub output: PathBuf,
    pub bus_capacity: usize,
}

impl IngestConfig {
    /// The two production endpoints on `host`.
    pub fn for_host(host: &str) -> Self {
        Self {
            endpoints: vec![
                EndpointConfig::new(host, CLIMATE_PORT, Decoder::Climate),
                EndpointConfig::new(host, MOTION_PORT, Decoder::Motion),
            ],
            protocol: ProtocolConfig::default(),
            timing: SessionTiming::default(),
            output: PathBuf::from(OUTPUT_FILE),
            bus_capacity: BUS_CAPACITY,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::for_host(DEFAULT_HOST)
    }
}
