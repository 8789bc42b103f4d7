//! lwlink: talk to a LightwaveRF Link home-automation hub over UDP.
//!
//! The Link takes text commands on UDP port 9760 and answers on port 9761,
//! with short comma-separated "legacy" replies and `*!`-prefixed JSON events.
//! [`LinkClient`] owns the socket, correlates replies with the commands that
//! caused them, drops the duplicate copy of every JSON event, spaces out
//! transmissions so the hub does not drop them, and drives the pairing
//! handshake.
//!
//! # Example
//!
//! ```no_run
//! use lwlink::{LinkClientBuilder, commands};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> lwlink::Result<()> {
//! let client = LinkClientBuilder::new().build().await?;
//! client.ensure_registered().await?;
//!
//! let on = commands::ON.render(&[&commands::device_id(1, 2)])?;
//! client
//!     .execute(&on, Duration::from_secs(3), &CancellationToken::new())
//!     .await?;
//!
//! for radiator in client.query_all_radiators(&CancellationToken::new()).await? {
//!     println!("{}: {:?}", radiator.serial, radiator.reading("cTemp"));
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod commands;
pub mod endpoint;
pub mod latency;
pub mod pairing;
pub mod registry;
pub mod rooms;

pub use builder::LinkClientBuilder;
pub use client::{ClientOptions, CommandReply, LinkClient};
pub use commands::{Command, RenderedCommand, ResponseMatcher};
pub use pairing::PairingState;
pub use registry::Subscription;

// Re-export core types so users only need to depend on `lwlink`.
pub use lwlink_core::{Error, Inbound, JsonEvent, LegacyReply, Result};
