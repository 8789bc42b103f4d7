//! Link wire encoding and decoding.
//!
//! # Line formats
//!
//! ```text
//! Command:  [":"<mac>","]<seq>","<payload>
//! Legacy:   <seq>","<payload>
//! Event:    "*!"<json object>
//! ```
//!
//! Nothing is newline terminated; one datagram carries one line. All
//! encoding/decoding in this module is pure parsing -- no I/O is performed.

use lwlink_core::{Error, Inbound, JsonEvent, LegacyReply, Result};

/// First byte of every JSON event datagram.
pub const EVENT_MARKER: u8 = b'*';

/// Full JSON event prefix.
pub const EVENT_PREFIX: &[u8] = b"*!";

/// Encode an outbound command.
///
/// The hub MAC tag is only included once the hub has told us its address.
pub fn encode(sequence: u64, mac_tag: Option<&str>, payload: &str) -> Vec<u8> {
    match mac_tag {
        Some(mac) if !mac.is_empty() => format!(":{mac},{sequence},{payload}").into_bytes(),
        _ => format!("{sequence},{payload}").into_bytes(),
    }
}

/// Decode a single inbound datagram.
///
/// Datagrams starting with `*` must be JSON events; anything else is treated
/// as a legacy reply. Never panics, whatever the input.
pub fn decode(raw: &[u8]) -> Result<Inbound> {
    if raw.first() == Some(&EVENT_MARKER) {
        decode_event(raw).map(Inbound::Event)
    } else {
        decode_legacy(raw).map(Inbound::Legacy)
    }
}

fn decode_event(raw: &[u8]) -> Result<JsonEvent> {
    let body = raw
        .strip_prefix(EVENT_PREFIX)
        .ok_or_else(|| Error::MalformedEvent(format!("missing '*!' prefix: {}", lossy(raw))))?;

    let event: JsonEvent = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedEvent(format!("{e}: {}", lossy(raw))))?;

    Ok(event.with_raw(lossy(raw)))
}

fn decode_legacy(raw: &[u8]) -> Result<LegacyReply> {
    let line = std::str::from_utf8(raw)
        .map_err(|_| Error::MalformedLegacyReply(format!("not UTF-8: {}", lossy(raw))))?;

    let (sequence, payload) = line
        .split_once(',')
        .ok_or_else(|| Error::MalformedLegacyReply(format!("no comma: {line}")))?;

    Ok(LegacyReply {
        sequence: sequence.trim().to_string(),
        payload: payload.trim().to_string(),
    })
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
