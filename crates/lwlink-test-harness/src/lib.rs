//! lwlink-test-harness: a scripted stand-in for a LightwaveRF Link.
//!
//! [`MockHub`] listens on a loopback UDP port, records every command it
//! receives and answers with pre-loaded replies, so protocol engine tests run
//! without a real hub on the network.

pub mod mock_hub;

pub use mock_hub::{HubReply, MockHub, ReceivedCommand};
