//! Wire codec for the Airnut 1S line protocol.
//!
//! Devices speak UTF-8 JSON records over a plain TCP stream. Inbound records
//! are separated by a `"\n\r"` sequence (note the reversed order — this is
//! what the firmware actually emits, not CRLF). Outbound commands are single
//! JSON objects with no trailing delimiter.
//!
//! The codec is deliberately lenient: a record that is not valid JSON, or a
//! data post missing an expected key, yields a [`ParseError`] that callers
//! log and drop without touching the connection.

use airnut_types::{DeviceReading, ParseError, ParseResult};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Record separator used by the device firmware between JSON records.
pub const RECORD_SEPARATOR: &str = "\n\r";

/// The `sendback_appserver` / `param.socket_id` constant the firmware expects
/// in every outbound command.
const APPSERVER_ID: u32 = 100_000_007;

/// The `socket_id` the firmware expects in the login acknowledgement.
const LOGIN_ACK_SOCKET_ID: u32 = 18_567;

/// Upper bound on a buffered partial frame before it is discarded.
const MAX_BUFFERED_BYTES: usize = 64 * 1024;

/// An outbound command to an Airnut device.
///
/// Only two commands exist in the protocol: the volume mute sent once at
/// handshake, and the "get data" request sent at handshake and on every
/// scheduled broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Set the device speaker volume (the handshake mutes it with 0).
    SetVolume {
        /// Volume level, 0 = muted.
        volume: u8,
    },
    /// Request the current sensor values.
    Get,
}

// Envelope shapes are fixed by the firmware; field order matters, so each
// command gets its own serialize-only struct rather than a generic map.

#[derive(Serialize)]
struct SetVolumeEnvelope {
    sendback_appserver: u32,
    param: SetVolumeParam,
    volume: u8,
    p: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    check_key: &'static str,
}

#[derive(Serialize)]
struct SetVolumeParam {
    volume: u8,
    socket_id: u32,
    check_key: &'static str,
}

#[derive(Serialize)]
struct GetEnvelope {
    sendback_appserver: u32,
    param: GetParam,
    p: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    check_key: &'static str,
}

#[derive(Serialize)]
struct GetParam {
    socket_id: u32,
    #[serde(rename = "type")]
    kind: u8,
    check_key: &'static str,
}

#[derive(Serialize)]
struct LoginAck {
    #[serde(rename = "type")]
    kind: &'static str,
    socket_id: u32,
    result: u8,
    p: &'static str,
}

impl Command {
    /// Encode this command as UTF-8 JSON bytes in the exact envelope the
    /// firmware expects. No trailing delimiter is appended.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let encoded = match self {
            Command::SetVolume { volume } => serde_json::to_vec(&SetVolumeEnvelope {
                sendback_appserver: APPSERVER_ID,
                param: SetVolumeParam {
                    volume: *volume,
                    socket_id: APPSERVER_ID,
                    check_key: "s_set_volume19085",
                },
                volume: *volume,
                p: "set_volume",
                kind: "control",
                check_key: "s_set_volume19085",
            }),
            Command::Get => serde_json::to_vec(&GetEnvelope {
                sendback_appserver: APPSERVER_ID,
                param: GetParam {
                    socket_id: APPSERVER_ID,
                    kind: 1,
                    check_key: "s_get19085",
                },
                p: "get",
                kind: "control",
                check_key: "s_get19085",
            }),
        };
        encoded.expect("static command envelope serializes to JSON")
    }
}

/// Encode the fixed login acknowledgement sent in reply to a `log_in` record.
#[must_use]
pub fn login_ack() -> Vec<u8> {
    serde_json::to_vec(&LoginAck {
        kind: "client",
        socket_id: LOGIN_ACK_SOCKET_ID,
        result: 0,
        p: "log_in",
    })
    .expect("static login ack serializes to JSON")
}

/// A parsed inbound record from a device.
///
/// Dispatch on this with an exhaustive `match`; records that are valid JSON
/// but carry an unrecognized (or absent) `p` field are [`Other`] and ignored
/// rather than treated as errors.
///
/// [`Other`]: DeviceMessage::Other
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceMessage {
    /// Login request; the server must reply with [`login_ack`].
    Login,
    /// Sensor data post, already normalized into a reading.
    Post(DeviceReading),
    /// Any other record. Not an error.
    Other,
}

/// Split a decoded text buffer into raw records on the device separator,
/// trimming whitespace and dropping empty fragments.
///
/// This is a pure helper with no cross-read state; connections use a
/// [`FrameAccumulator`] to carry partial frames between reads.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
}

/// Parse one raw JSON record into a [`DeviceMessage`].
///
/// A data post must carry `param.indoor` with `t`, `h`, `pm25` and `co2`.
/// Temperature and humidity are rounded to one decimal place; `pm25` and
/// `co2` are truncated to integers whether the source values were integers
/// or decimals.
///
/// # Errors
///
/// [`ParseError::InvalidJson`] if the record is not valid JSON;
/// [`ParseError::MissingField`] if a data post lacks an expected key.
pub fn parse_record(raw: &str) -> ParseResult<DeviceMessage> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    match value.get("p").and_then(Value::as_str) {
        Some("log_in") => Ok(DeviceMessage::Login),
        Some("post") => parse_post(&value).map(DeviceMessage::Post),
        _ => Ok(DeviceMessage::Other),
    }
}

fn parse_post(value: &Value) -> ParseResult<DeviceReading> {
    let indoor = value
        .get("param")
        .ok_or(ParseError::MissingField("param"))?
        .get("indoor")
        .ok_or(ParseError::MissingField("indoor"))?;

    let temperature = number_field(indoor, "t")?;
    let humidity = number_field(indoor, "h")?;
    let pm25 = number_field(indoor, "pm25")?;
    let co2 = number_field(indoor, "co2")?;

    Ok(DeviceReading {
        temperature: Some(round_tenth(temperature)),
        humidity: Some(round_tenth(humidity)),
        pm25: Some(pm25 as i64),
        co2: Some(co2 as i64),
        last_update: Some(time::OffsetDateTime::now_utc()),
    })
}

fn number_field(indoor: &Value, name: &'static str) -> ParseResult<f64> {
    indoor
        .get(name)
        .and_then(Value::as_f64)
        .ok_or(ParseError::MissingField(name))
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Per-connection frame accumulator.
///
/// Retains an incomplete trailing fragment between reads so a JSON record
/// split across two socket reads still parses once the rest arrives. A
/// trailing fragment that already forms complete JSON is emitted
/// immediately, since devices do not terminate their final record with a
/// separator.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: String,
}

impl FrameAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw chunk and return every complete record it yields.
    ///
    /// The chunk is decoded as UTF-8 best-effort (invalid sequences are
    /// replaced, matching the lenient decode of the rest of the codec).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));

        let mut records = Vec::new();
        while let Some(pos) = self.buf.find(RECORD_SEPARATOR) {
            let record = self.buf[..pos].trim().to_string();
            self.buf.drain(..pos + RECORD_SEPARATOR.len());
            if !record.is_empty() {
                records.push(record);
            }
        }

        let tail = self.buf.trim();
        if !tail.is_empty() && serde_json::from_str::<Value>(tail).is_ok() {
            records.push(tail.to_string());
            self.buf.clear();
        } else if self.buf.len() > MAX_BUFFERED_BYTES {
            warn!(
                "dropping oversized partial frame ({} bytes buffered)",
                self.buf.len()
            );
            self.buf.clear();
        }

        records
    }

    /// Number of bytes currently buffered as a partial frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
