//! lwlink-core: error taxonomy and decoded message types for lwlink.
//!
//! This crate holds the types shared by the protocol engine (`lwlink`), the
//! UDP transport and the test harness, without pulling in any I/O.
//!
//! # Key types
//!
//! - [`LegacyReply`] -- `sequence,payload` acknowledgements and errors
//! - [`JsonEvent`] -- `*!{...}` hub events, deduplicated by transaction number
//! - [`Inbound`] -- either of the above, one per datagram
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod message;

pub use error::{Error, Result};
pub use message::{Inbound, JsonEvent, LegacyReply, ROOM_STAT_FIELDS};
