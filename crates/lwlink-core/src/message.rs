//! Decoded messages received from a LightwaveRF Link.
//!
//! The Link answers in two unrelated grammars. Legacy replies are short
//! comma-separated strings correlated by the sequence ID we sent; JSON events
//! carry a hub-assigned transaction number and describe hub state, device
//! traffic and command results.
//!
//! ```text
//! 12,OK
//! 13,ERR,2,"Not yet registered. See LightwaveLink"
//! 14,?V="N2.94D"
//! *!{"trans":14674,"mac":"20:3B:85","time":1767297488,"pkt":"room","fn":"summary","stat0":255,...}
//! ```

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Number of `statN` bitfields in a room summary event.
pub const ROOM_STAT_FIELDS: usize = 10;

/// One decoded inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// `sequence,payload`
    Legacy(LegacyReply),
    /// `*!{...}`
    Event(JsonEvent),
}

/// A legacy reply: the sequence ID we tagged the command with, and the text
/// the Link answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyReply {
    /// Sequence ID as sent by us, kept as text since it is only used as a key.
    pub sequence: String,
    /// Everything after the first comma, whitespace-trimmed.
    pub payload: String,
}

impl LegacyReply {
    /// `OK` acknowledgement.
    pub fn is_ok(&self) -> bool {
        self.payload == "OK"
    }

    /// Firmware version answer (`?V="N2.94D"`), sent when an already-paired
    /// host asks to register.
    pub fn is_version(&self) -> bool {
        self.payload.starts_with("?V=")
    }

    /// Split an `ERR,<code>,"<message>"` payload into code and message.
    pub fn error(&self) -> Option<(u32, String)> {
        let rest = self.payload.strip_prefix("ERR,")?;
        let (code, message) = rest.split_once(',').unwrap_or((rest, ""));
        let code = code.trim().parse().ok()?;
        Some((code, message.trim().trim_matches('"').to_string()))
    }
}

/// A JSON event from the Link.
///
/// Not every field is present in every event; absent fields take their
/// default value. Fields this type does not name (for example the `batt`,
/// `cTemp` and `tTemp` readings pushed by radiator valves) are kept in
/// [`extra`](Self::extra).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JsonEvent {
    /// Hub transaction number. Increments on every transaction, unrelated to
    /// our sequence IDs.
    pub trans: i64,
    /// Last three octets of the Link's MAC address, e.g. `"20:3B:85"`.
    pub mac: String,
    /// Hub-local unix time of the transaction.
    pub time: i64,

    /// Packet kind: `"system"`, `"error"`, `"room"`, `"433T"`, `"868R"`.
    pub pkt: String,
    /// Function: `"hubCall"`, `"nonRegistered"`, `"summary"`, `"read"`,
    /// `"on"`, `"off"`, `"dim"`, `"statusPush"`, ...
    #[serde(rename = "fn")]
    pub function: String,
    pub payload: String,

    /// Room number a 433 MHz command was sent to.
    #[serde(deserialize_with = "string_or_number")]
    pub room: String,
    /// Device number a 433 MHz command was sent to.
    #[serde(deserialize_with = "string_or_number")]
    pub dev: String,
    #[serde(rename = "Param", deserialize_with = "string_or_number")]
    pub param: String,

    /// `"link"`, `"unlink"` or `"hub"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Product code: `lwl`, `valve`, `tmr1ch`, `electr`, ...
    pub prod: String,
    /// `"local"` when a LAN host paired, `"product"` for a new device.
    #[serde(rename = "pairType")]
    pub pair_type: String,
    pub msg: String,
    pub class: String,
    /// Identifies a heating or energy device.
    pub serial: String,

    pub fw: String,
    pub uptime: i64,
    #[serde(rename = "timeZone")]
    pub time_zone: i32,
    pub lat: f64,
    pub long: f64,
    #[serde(rename = "tmrs")]
    pub timers: i32,
    #[serde(rename = "evns")]
    pub events: i32,
    pub run: i32,
    pub macs: i32,
    pub ip: String,
    pub devs: i32,
    #[serde(rename = "dawnTime")]
    pub dawn_time: Option<i64>,
    #[serde(rename = "duskTime")]
    pub dusk_time: Option<i64>,

    pub slot: Option<u32>,

    // Room summary bitfields. Bit b of statN marks room 1 + 8N + b in use.
    pub stat0: u8,
    pub stat1: u8,
    pub stat2: u8,
    pub stat3: u8,
    pub stat4: u8,
    pub stat5: u8,
    pub stat6: u8,
    pub stat7: u8,
    pub stat8: u8,
    pub stat9: u8,

    /// Fields not named above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,

    #[serde(skip)]
    raw: String,
}

impl JsonEvent {
    /// Attach the datagram text this event was decoded from.
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }

    /// The datagram text this event was decoded from, `*!` prefix included.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The ten room summary bitfields, `stat0` first.
    pub fn room_stats(&self) -> [u8; ROOM_STAT_FIELDS] {
        [
            self.stat0, self.stat1, self.stat2, self.stat3, self.stat4, self.stat5, self.stat6,
            self.stat7, self.stat8, self.stat9,
        ]
    }

    /// The Link rejected us because this host is not paired.
    pub fn is_not_registered(&self) -> bool {
        self.function == "nonRegistered"
    }

    /// A LAN host (us) was paired after the Link button was pressed.
    pub fn is_local_pairing_success(&self) -> bool {
        self.pair_type == "local" && self.msg == "success"
    }

    /// A numeric reading from [`extra`](Self::extra), e.g. `"batt"`.
    pub fn reading(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }
}

impl fmt::Display for JsonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Accept `"room":"1"`, `"room":1` and `"room":null` alike.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
