//! Pairing state machine.
//!
//! The Link only accepts commands from LAN hosts that have been paired with
//! it, which requires someone to press the button on the Link while it is
//! being asked to register us. The machine below tracks how far that has got;
//! [`LinkClient::ensure_registered`](crate::client::LinkClient::ensure_registered)
//! drives it with replies and retry timer expiries.
//!
//! ```text
//! Unknown --send--> AwaitingReply --?V= / pairing success--> Paired
//!                        |                                     ^
//!                   nonRegistered                              |
//!                        v                                     |
//!                  PairingRequired ---pairing success----------+
//! ```

use std::fmt;

use lwlink_core::JsonEvent;

/// Where the registration handshake has got to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    /// Nothing sent yet.
    Unknown,
    /// Registration sent, no verdict yet.
    AwaitingReply,
    /// The Link does not know us. Waiting for its button to be pressed.
    PairingRequired,
    /// The Link accepts our commands.
    Paired,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PairingState::Unknown => "unknown",
            PairingState::AwaitingReply => "awaiting reply",
            PairingState::PairingRequired => "pairing required",
            PairingState::Paired => "paired",
        };
        f.write_str(s)
    }
}

/// Pure transition logic for the registration handshake. `Paired` is the only
/// terminal state.
#[derive(Debug, Clone)]
pub struct PairingMachine {
    state: PairingState,
}

impl Default for PairingMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PairingMachine {
    pub fn new() -> Self {
        Self {
            state: PairingState::Unknown,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn is_paired(&self) -> bool {
        self.state == PairingState::Paired
    }

    /// The registration command has been transmitted.
    pub fn sent(&mut self) -> PairingState {
        if self.state == PairingState::Unknown {
            self.state = PairingState::AwaitingReply;
        }
        self.state
    }

    /// A legacy reply to our registration. The firmware version answer means
    /// we were already paired.
    pub fn on_legacy(&mut self, payload: &str) -> PairingState {
        if payload.starts_with("?V=") {
            self.state = PairingState::Paired;
        }
        self.state
    }

    /// A JSON event seen while registering.
    pub fn on_event(&mut self, event: &JsonEvent) -> PairingState {
        if self.is_paired() {
            return self.state;
        }
        if event.is_local_pairing_success() {
            self.state = PairingState::Paired;
        } else if event.is_not_registered() {
            self.state = PairingState::PairingRequired;
        }
        self.state
    }

    /// The retry timer fired. Returns whether the registration should be sent
    /// again.
    pub fn on_retry(&mut self) -> bool {
        !self.is_paired()
    }
}
