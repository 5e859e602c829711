//! Decoded readings and their text rendering.
//!
//! A [`DecodedRecord`] only comes out of [`crate::packet::Decoder::decode`],
//! so every record in the pipeline has passed its checksum.  Records are
//! immutable and move by value from a supervisor, through the bus, into the
//! writer.

use std::fmt;

use chrono::{DateTime, Local};

use crate::packet::PacketError;

/// `yyyy-MM-dd HH:mm:ss` in the local zone; sub-second precision is dropped.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Field values carried by one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Climate { temperature: f32, pressure: i16 },
    Motion { x: i32, y: i32, z: i32 },
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Climate {
                temperature,
                pressure,
            } => write!(
                f,
                "Temp={};Press={pressure}",
                two_decimals_half_up(*temperature)
            ),
            Reading::Motion { x, y, z } => write!(f, "X={x};Y={y};Z={z}"),
        }
    }
}

/// One validated reading, ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    source: String,
    timestamp_us: i64,
    time: DateTime<Local>,
    reading: Reading,
}

impl DecodedRecord {
    /// Build a record, resolving the microsecond timestamp to local time.
    pub(crate) fn new(
        source: &str,
        timestamp_us: i64,
        reading: Reading,
    ) -> Result<Self, PacketError> {
        let time = local_time(timestamp_us)?;
        Ok(Self {
            source: source.to_owned(),
            timestamp_us,
            time,
            reading,
        })
    }

    /// Tag of the endpoint that produced this record.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Raw device timestamp in microseconds since the Unix epoch.
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    pub fn reading(&self) -> &Reading {
        &self.reading
    }

    /// Render as `<time>;<source>;<field=value;...>` without a terminator.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{};{}",
            self.time.format(TIME_FORMAT),
            self.source,
            self.reading
        )
    }
}

/// Render `value` with two decimals, rounding ties away from zero.
///
/// `{:.2}` rounds exact binary ties to even (`20.125` becomes `20.12`); log
/// consumers expect `20.13`.  Rounding is done on the shortest decimal form
/// of the widened value, so the digits shown are the digits a reader sees.
fn two_decimals_half_up(value: f32) -> String {
    let value = f64::from(value);
    if !value.is_finite() {
        return format!("{value:.2}");
    }

    let repr = value.abs().to_string();
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));
    let frac = format!("{frac_part:0<3}");
    let round_up = frac.as_bytes()[2] >= b'5';

    let mut digits: Vec<u8> = int_part.bytes().chain(frac.bytes().take(2)).collect();
    if round_up {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            if *d == b'9' {
                *d = b'0';
            } else {
                *d += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let split = digits.len() - 2;
    let sign = if value.is_sign_negative() { "-" } else { "" };
    format!(
        "{sign}{}.{}",
        String::from_utf8_lossy(&digits[..split]),
        String::from_utf8_lossy(&digits[split..])
    )
}

/// Split microseconds into whole seconds plus a nanosecond remainder and
/// resolve them in the local zone.
pub fn local_time(timestamp_us: i64) -> Result<DateTime<Local>, PacketError> {
    let secs = timestamp_us.div_euclid(1_000_000);
    let nanos = (timestamp_us.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .map(|utc| utc.with_timezone(&Local))
        .ok_or(PacketError::TimestampOutOfRange(timestamp_us))
}
