//! Wire-format definitions for sensor frames.
//!
//! Each endpoint answers a poll with exactly one fixed-size frame.  This
//! module is responsible for:
//! - Defining the on-wire binary layout of both frame variants.
//! - Verifying the trailing 8-bit checksum.
//! - Turning a verified frame into a [`DecodedRecord`].
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte fields are **big-endian**.  The checksum is the low byte of
//! the unsigned sum of every preceding byte (the sum wraps at 8 bits).
//!
//! Climate frame ([`CLIMATE_FRAME_LEN`] = 15 bytes):
//!
//! ```text
//!  0               8               12      14  15
//! +---------------+---------------+-------+---+
//! | timestamp µs  |  temperature  | press |sum|
//! |     i64       |      f32      |  i16  |u8 |
//! +---------------+---------------+-------+---+
//! ```
//!
//! Motion frame ([`MOTION_FRAME_LEN`] = 21 bytes):
//!
//! ```text
//!  0               8       12      16      20  21
//! +---------------+-------+-------+-------+---+
//! | timestamp µs  |   X   |   Y   |   Z   |sum|
//! |     i64       |  i32  |  i32  |  i32  |u8 |
//! +---------------+-------+-------+-------+---+
//! ```

use thiserror::Error;

use crate::record::{DecodedRecord, Reading};

/// Byte length of a climate (temperature / pressure) frame.
pub const CLIMATE_FRAME_LEN: usize = 15;

/// Byte length of a motion (X / Y / Z) frame.
pub const MOTION_FRAME_LEN: usize = 21;

// Byte offsets shared by both variants.
const OFF_TIMESTAMP: usize = 0;
const OFF_BODY: usize = 8;

// Climate body offsets.
const OFF_TEMPERATURE: usize = OFF_BODY;
const OFF_PRESSURE: usize = OFF_BODY + 4;

// Motion body offsets.
const OFF_X: usize = OFF_BODY;
const OFF_Y: usize = OFF_BODY + 4;
const OFF_Z: usize = OFF_BODY + 8;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Reasons a raw frame is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer length does not match the variant's fixed frame size.
    #[error("frame is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    /// Trailing checksum byte does not match the recomputed sum.
    #[error("checksum mismatch: frame carries {received:#04x}, computed {computed:#04x}")]
    ChecksumFailed { received: u8, computed: u8 },
    /// Timestamp cannot be represented as a calendar date.
    #[error("timestamp {0} µs is outside the representable calendar range")]
    TimestampOutOfRange(i64),
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// The frame layout an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// 15-byte temperature / pressure frame.
    Climate,
    /// 21-byte X / Y / Z frame.
    Motion,
}

impl Decoder {
    /// Size in bytes of one frame of this variant, checksum included.
    pub const fn frame_len(self) -> usize {
        match self {
            Decoder::Climate => CLIMATE_FRAME_LEN,
            Decoder::Motion => MOTION_FRAME_LEN,
        }
    }

    /// Validate `buf` and turn it into a record tagged with `source`.
    ///
    /// Returns [`Err`] if:
    /// - `buf.len()` differs from [`Decoder::frame_len`],
    /// - the trailing checksum does not verify, or
    /// - the timestamp cannot be rendered as a date.
    pub fn decode(self, buf: &[u8], source: &str) -> Result<DecodedRecord, PacketError> {
        let expected = self.frame_len();
        if buf.len() != expected {
            return Err(PacketError::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }

        let (payload, trailer) = buf.split_at(expected - 1);
        let computed = checksum(payload);
        if computed != trailer[0] {
            return Err(PacketError::ChecksumFailed {
                received: trailer[0],
                computed,
            });
        }

        let timestamp_us = i64::from_be_bytes(be_array(buf, OFF_TIMESTAMP));
        let reading = match self {
            Decoder::Climate => Reading::Climate {
                temperature: f32::from_be_bytes(be_array(buf, OFF_TEMPERATURE)),
                pressure: i16::from_be_bytes(be_array(buf, OFF_PRESSURE)),
            },
            Decoder::Motion => Reading::Motion {
                x: i32::from_be_bytes(be_array(buf, OFF_X)),
                y: i32::from_be_bytes(be_array(buf, OFF_Y)),
                z: i32::from_be_bytes(be_array(buf, OFF_Z)),
            },
        };

        DecodedRecord::new(source, timestamp_us, reading)
    }
}

impl std::fmt::Display for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decoder::Climate => f.write_str("climate"),
            Decoder::Motion => f.write_str("motion"),
        }
    }
}

/// 8-bit wrapping sum of `data`.
///
/// Devices accumulate the checksum in a single byte register, so overflow
/// must wrap rather than saturate.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Copy `N` bytes starting at `offset`.  Callers have already checked the
/// buffer length against the frame layout.
fn be_array<const N: usize>(buf: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    out
}
