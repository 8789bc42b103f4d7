//! Command catalog.
//!
//! Each [`Command`] is a process-wide constant: a template with positional
//! `{}` parameters, a [`ResponseMatcher`] that recognises the JSON event the
//! Link answers with, and whether the Link only ever acknowledges it with a
//! legacy `OK`. Rendering a template produces a throwaway
//! [`RenderedCommand`]; the constant itself never changes.
//!
//! Device identifiers are `R<room>D<device>` (see [`device_id`]), room
//! identifiers are `R<room>` (see [`room_id`]).
//!
//! ```
//! use lwlink::commands::{self, device_id};
//!
//! let cmd = commands::SET_DIMMER.render(&[&device_id(1, 2), &16]).unwrap();
//! assert_eq!(cmd.text(), "!R1D2FdP16");
//! assert_eq!(cmd.template(), "!{}FdP{}");
//! ```

use std::fmt;

use lwlink_core::{Error, JsonEvent, Result};

/// How to recognise the JSON event that answers a command.
#[derive(Debug, Clone, Copy)]
pub enum ResponseMatcher {
    /// Any JSON event.
    Any,
    /// An event whose `fn` field equals the name.
    Function(&'static str),
    /// An event whose `pkt` field equals the name.
    Packet(&'static str),
    /// Anything else.
    Custom(fn(&JsonEvent) -> bool),
}

impl ResponseMatcher {
    pub fn matches(&self, event: &JsonEvent) -> bool {
        match self {
            ResponseMatcher::Any => true,
            ResponseMatcher::Function(name) => event.function == *name,
            ResponseMatcher::Packet(name) => event.pkt == *name,
            ResponseMatcher::Custom(predicate) => predicate(event),
        }
    }
}

/// A command template.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    template: &'static str,
    matcher: ResponseMatcher,
    legacy_only: bool,
}

impl Command {
    /// A template answered by any JSON event.
    pub const fn new(template: &'static str) -> Self {
        Self {
            template,
            matcher: ResponseMatcher::Any,
            legacy_only: false,
        }
    }

    /// Set the expected-response matcher.
    pub const fn expecting(mut self, matcher: ResponseMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Mark as acknowledged only by a legacy `OK`, never a JSON event.
    pub const fn legacy(mut self) -> Self {
        self.legacy_only = true;
        self
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn matcher(&self) -> ResponseMatcher {
        self.matcher
    }

    pub fn is_legacy_only(&self) -> bool {
        self.legacy_only
    }

    /// Number of `{}` parameters the template takes.
    pub fn arity(&self) -> usize {
        self.template.matches("{}").count()
    }

    /// Whether `event` answers this command.
    pub fn is_response(&self, event: &JsonEvent) -> bool {
        self.matcher.matches(event)
    }

    /// Fill in the template's parameters, in order.
    pub fn render(&self, args: &[&dyn fmt::Display]) -> Result<RenderedCommand> {
        if args.len() != self.arity() {
            return Err(Error::InvalidParameter(format!(
                "{:?} takes {} argument(s), got {}",
                self.template,
                self.arity(),
                args.len()
            )));
        }

        let mut text = String::with_capacity(self.template.len() + 8 * args.len());
        let mut pieces = self.template.split("{}");
        if let Some(first) = pieces.next() {
            text.push_str(first);
        }
        for (arg, piece) in args.iter().zip(pieces) {
            text.push_str(&arg.to_string());
            text.push_str(piece);
        }

        Ok(RenderedCommand {
            command: *self,
            text,
        })
    }

    /// Render a template that takes no parameters.
    pub fn instance(&self) -> Result<RenderedCommand> {
        self.render(&[])
    }
}

/// A command with its parameters filled in, ready to send.
#[derive(Debug, Clone)]
pub struct RenderedCommand {
    command: Command,
    text: String,
}

impl RenderedCommand {
    /// Wire payload, e.g. `"@?R3"`.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Template this was rendered from, e.g. `"@?{}"`. Latency is keyed on it.
    pub fn template(&self) -> &'static str {
        self.command.template
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn is_legacy_only(&self) -> bool {
        self.command.legacy_only
    }

    pub fn is_response(&self, event: &JsonEvent) -> bool {
        self.command.is_response(event)
    }
}

impl fmt::Display for RenderedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// `R<room>`, e.g. `R3`. Rooms run 1-80.
pub fn room_id(room: u8) -> String {
    format!("R{room}")
}

/// `R<room>D<device>`, e.g. `R1D2`.
pub fn device_id(room: u8, device: u8) -> String {
    format!("R{room}D{device}")
}

fn is_local_pairing(event: &JsonEvent) -> bool {
    event.is_local_pairing_success()
}

fn is_dusk_dawn(event: &JsonEvent) -> bool {
    event.dawn_time.is_some() || event.dusk_time.is_some()
}

fn is_device_linked(event: &JsonEvent) -> bool {
    event.kind == "link" && event.pair_type == "product"
}

fn is_device_unlinked(event: &JsonEvent) -> bool {
    event.kind == "unlink"
}

fn is_room_read(event: &JsonEvent) -> bool {
    event.pkt == "room" && event.function == "read"
}

fn is_room_summary(event: &JsonEvent) -> bool {
    event.pkt == "room" && event.function == "summary"
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Pair this LAN host with the Link. An already-paired host gets a legacy
/// firmware version reply (`?V="N2.94D"`) instead.
pub const REGISTER: Command =
    Command::new("!F*p").expecting(ResponseMatcher::Custom(is_local_pairing));

/// Unpair this LAN host. Only works when paired.
pub const DEREGISTER: Command = Command::new("!F*xP").legacy();

/// Hub information: firmware, uptime, timer/event/device counts.
pub const HUB_CALL: Command = Command::new("@H").expecting(ResponseMatcher::Function("hubCall"));

/// Dusk and dawn times used by timers.
pub const HUB_DUSK_DAWN: Command =
    Command::new("@D").expecting(ResponseMatcher::Custom(is_dusk_dawn));

/// Set the GMT offset in whole hours. The Link applies DST itself, so send
/// the standard-time offset. Args: offset (`i32`).
pub const SET_TIMEZONE: Command = Command::new("!FzP{}").legacy();

/// Set latitude and longitude for dusk/dawn. Args: latitude, longitude
/// (format floats with six decimals).
pub const SET_LOCATION: Command = Command::new("!FqP\"{},{}\"").legacy();

/// Link LED on (LW500: brighten the screen).
pub const HUB_UI_BRIGHT: Command = Command::new("@L1").legacy();

/// Link LED off (LW500: dim the screen).
pub const HUB_UI_DIM: Command = Command::new("@L0").legacy();

// ---------------------------------------------------------------------------
// Devices. Args start with a device or room identifier.
// ---------------------------------------------------------------------------

pub const ON: Command = Command::new("!{}F1").expecting(ResponseMatcher::Function("on"));

pub const OFF: Command = Command::new("!{}F0").expecting(ResponseMatcher::Function("off"));

/// Args: device, brightness 1 (dimmest) to 32.
pub const SET_DIMMER: Command =
    Command::new("!{}FdP{}").expecting(ResponseMatcher::Function("dim"));

/// Open a relay (no connection).
pub const OPEN: Command = Command::new("!{}F(").expecting(ResponseMatcher::Function("open"));

/// Close a relay (make a connection).
pub const CLOSE: Command = Command::new("!{}F)").expecting(ResponseMatcher::Function("close"));

pub const STOP: Command = Command::new("!{}F^").expecting(ResponseMatcher::Function("stop"));

/// Args: device, colour 1-20.
pub const LED_COLOUR_SET: Command =
    Command::new("!{}F*cP{}").expecting(ResponseMatcher::Function("ledColour"));

/// Advance a colour changing product to its next cycle mode.
pub const LED_COLOUR_CYCLE: Command =
    Command::new("!{}F*y").expecting(ResponseMatcher::Function("ledColourCycle"));

/// Block manual switching; RF control still works.
pub const LOCK_PARTIAL: Command =
    Command::new("!{}Fl").expecting(ResponseMatcher::Function("manualLock"));

/// Block manual and RF switching until unlocked.
pub const LOCK_FULL: Command =
    Command::new("!{}Fk").expecting(ResponseMatcher::Function("fullLock"));

pub const UNLOCK: Command = Command::new("!{}Fu").expecting(ResponseMatcher::Function("unlock"));

/// Args: room, mood slot 1-5 (4 is Entry, 5 is Exit by convention).
pub const MOOD_STORE: Command =
    Command::new("!{}FsP{}").expecting(ResponseMatcher::Function("moodStore"));

/// Args: room, mood slot 1-5.
pub const MOOD_RECALL: Command =
    Command::new("!{}FmP{}").expecting(ResponseMatcher::Function("moodRecall"));

/// Args: room.
pub const ALL_OFF: Command = Command::new("!{}Fa").expecting(ResponseMatcher::Function("allOff"));

/// Put the Link into linking mode for a heating/energy device, assigning it
/// the given room. Args: room.
pub const PAIR_DEVICE: Command =
    Command::new("!{}F*L").expecting(ResponseMatcher::Custom(is_device_linked));

/// Forget a paired device. Args: room.
pub const UNPAIR_DEVICE: Command =
    Command::new("!{}F*xU").expecting(ResponseMatcher::Custom(is_device_unlinked));

// ---------------------------------------------------------------------------
// Heating
// ---------------------------------------------------------------------------

/// Which radiator ("room") slots are allocated, as ten bitfields.
pub const QUERY_RADIATORS: Command =
    Command::new("@R").expecting(ResponseMatcher::Custom(is_room_summary));

/// Ask one radiator to report its product information. Args: room.
pub const QUERY_RADIATOR: Command =
    Command::new("@?{}").expecting(ResponseMatcher::Custom(is_room_read));

#[cfg(test)]
mod tests {
    use super::*;

    fn event(pkt: &str, function: &str) -> JsonEvent {
        let mut event = JsonEvent::default();
        event.pkt = pkt.into();
        event.function = function.into();
        event
    }

    #[test]
    fn render_without_args() {
        let cmd = HUB_CALL.instance().unwrap();
        assert_eq!(cmd.text(), "@H");
        assert_eq!(cmd.template(), "@H");
    }

    #[test]
    fn render_positional_args() {
        let cmd = SET_DIMMER.render(&[&device_id(1, 1), &32]).unwrap();
        assert_eq!(cmd.text(), "!R1D1FdP32");
        assert_eq!(cmd.to_string(), "!R1D1FdP32");
    }

    #[test]
    fn render_location() {
        let lat = format!("{:.6}", 52.1837667);
        let long = format!("{:.6}", 0.2078069);
        let cmd = SET_LOCATION.render(&[&lat, &long]).unwrap();
        assert_eq!(cmd.text(), "!FqP\"52.183767,0.207807\"");
    }

    #[test]
    fn render_negative_timezone() {
        assert_eq!(SET_TIMEZONE.render(&[&-5]).unwrap().text(), "!FzP-5");
    }

    #[test]
    fn render_wrong_arity_is_rejected() {
        assert!(matches!(
            QUERY_RADIATOR.instance(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            HUB_CALL.render(&[&1]),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn render_leaves_template_untouched() {
        let a = QUERY_RADIATOR.render(&[&room_id(1)]).unwrap();
        let b = QUERY_RADIATOR.render(&[&room_id(2)]).unwrap();
        assert_eq!(a.text(), "@?R1");
        assert_eq!(b.text(), "@?R2");
        assert_eq!(QUERY_RADIATOR.template(), "@?{}");
        assert_eq!(a.template(), b.template());
    }

    #[test]
    fn arity() {
        assert_eq!(REGISTER.arity(), 0);
        assert_eq!(ON.arity(), 1);
        assert_eq!(MOOD_RECALL.arity(), 2);
        assert_eq!(SET_LOCATION.arity(), 2);
    }

    #[test]
    fn legacy_only_flags() {
        assert!(DEREGISTER.is_legacy_only());
        assert!(SET_TIMEZONE.is_legacy_only());
        assert!(HUB_UI_DIM.is_legacy_only());
        assert!(!HUB_CALL.is_legacy_only());
        assert!(!QUERY_RADIATOR.is_legacy_only());
    }

    #[test]
    fn function_matcher() {
        assert!(HUB_CALL.is_response(&event("system", "hubCall")));
        assert!(!HUB_CALL.is_response(&event("error", "nonRegistered")));
        assert!(ON.is_response(&event("433T", "on")));
        assert!(!ON.is_response(&event("433T", "off")));
    }

    #[test]
    fn packet_matcher() {
        let matcher = ResponseMatcher::Packet("868R");
        assert!(matcher.matches(&event("868R", "statusPush")));
        assert!(!matcher.matches(&event("433T", "statusPush")));
        assert!(ResponseMatcher::Any.matches(&JsonEvent::default()));
    }

    #[test]
    fn room_matchers_distinguish_summary_and_read() {
        let summary = event("room", "summary");
        let read = event("room", "read");
        assert!(QUERY_RADIATORS.is_response(&summary));
        assert!(!QUERY_RADIATORS.is_response(&read));
        assert!(QUERY_RADIATOR.is_response(&read));
        assert!(!QUERY_RADIATOR.is_response(&summary));
    }

    #[test]
    fn custom_matchers() {
        let dusk = {
            let mut event = JsonEvent::default();
            event.dusk_time = Some(1767290000);
            event
        };
        assert!(HUB_DUSK_DAWN.is_response(&dusk));
        assert!(!HUB_DUSK_DAWN.is_response(&JsonEvent::default()));

        let paired = {
            let mut event = JsonEvent::default();
            event.pair_type = "local".into();
            event.msg = "success".into();
            event
        };
        assert!(REGISTER.is_response(&paired));

        let linked = {
            let mut event = JsonEvent::default();
            event.kind = "link".into();
            event.pair_type = "product".into();
            event
        };
        assert!(PAIR_DEVICE.is_response(&linked));
        assert!(!PAIR_DEVICE.is_response(&paired));
    }

    #[test]
    fn identifiers() {
        assert_eq!(room_id(80), "R80");
        assert_eq!(device_id(3, 1), "R3D1");
    }
}
