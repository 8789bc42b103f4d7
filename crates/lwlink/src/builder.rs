//! LinkClientBuilder -- fluent builder for [`LinkClient`].
//!
//! Separates configuration from construction so that callers can set ports,
//! timeouts and pairing behaviour before the socket is bound.
//!
//! # Example
//!
//! ```no_run
//! use lwlink::builder::LinkClientBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> lwlink_core::Result<()> {
//! let client = LinkClientBuilder::new()
//!     .hub_ip("192.168.4.71".parse().unwrap())
//!     .pairing_timeout(Duration::from_secs(60))
//!     .build()
//!     .await?;
//! client.ensure_registered().await?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use lwlink_core::error::{Error, Result};

use crate::client::{COMMAND_PORT, ClientOptions, LISTEN_PORT, LinkClient};

/// Fluent builder for [`LinkClient`].
///
/// Every setting has a default matching the Link's behaviour, so the
/// simplest usage is `LinkClientBuilder::new().build().await?`, which
/// listens on port 9761 and broadcasts commands to port 9760.
#[derive(Debug, Clone)]
pub struct LinkClientBuilder {
    listen_addr: String,
    options: ClientOptions,
}

impl Default for LinkClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkClientBuilder {
    pub fn new() -> Self {
        LinkClientBuilder {
            listen_addr: format!("0.0.0.0:{}", LISTEN_PORT),
            options: ClientOptions::default(),
        }
    }

    /// Local `host:port` to receive replies on (default: `0.0.0.0:9761`).
    pub fn listen_addr(mut self, addr: &str) -> Self {
        self.listen_addr = addr.to_string();
        self
    }

    /// Receive replies on this port on all interfaces.
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_addr = format!("0.0.0.0:{}", port);
        self
    }

    /// Initial hub address (default: `255.255.255.255:9760`). The IP is
    /// replaced by the source of the first valid reply.
    pub fn hub_addr(mut self, addr: SocketAddr) -> Self {
        self.options.hub_addr = addr;
        self
    }

    /// Address a known hub instead of broadcasting. Keeps the command port.
    pub fn hub_ip(mut self, ip: IpAddr) -> Self {
        self.options.hub_addr.set_ip(ip);
        self
    }

    /// Hub command port (default: 9760).
    pub fn command_port(mut self, port: u16) -> Self {
        self.options.hub_addr.set_port(port);
        self
    }

    /// Minimum gap between transmissions (default: 125ms).
    pub fn send_spacing(mut self, spacing: Duration) -> Self {
        self.options.send_spacing = spacing;
        self
    }

    /// Receive loop read deadline (default: 1s).
    pub fn read_deadline(mut self, deadline: Duration) -> Self {
        self.options.read_deadline = deadline;
        self
    }

    /// How long `do_legacy` waits (default: 1s).
    pub fn legacy_timeout(mut self, timeout: Duration) -> Self {
        self.options.legacy_timeout = timeout;
        self
    }

    /// Room summary timeout (default: 3s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Per-room radiator query timeout (default: 3s).
    pub fn room_query_timeout(mut self, timeout: Duration) -> Self {
        self.options.room_query_timeout = timeout;
        self
    }

    /// First registration retry (default: 1s).
    pub fn pairing_initial_retry(mut self, delay: Duration) -> Self {
        self.options.pairing_initial_retry = delay;
        self
    }

    /// Later registration retries (default: 10s).
    pub fn pairing_retry_interval(mut self, interval: Duration) -> Self {
        self.options.pairing_retry_interval = interval;
        self
    }

    /// Stop waiting for pairing after `limit`. Unbounded by default.
    pub fn pairing_timeout(mut self, limit: Duration) -> Self {
        self.options.pairing_timeout = Some(limit);
        self
    }

    /// Capacity of per-call reply channels (default: 10).
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.options.channel_capacity = capacity;
        self
    }

    /// The options collected so far.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Bind the socket and start the client.
    pub async fn build(self) -> Result<LinkClient> {
        if self.options.hub_addr.port() == 0 {
            return Err(Error::InvalidParameter("hub command port must not be 0".into()));
        }
        if self.options.read_deadline.is_zero() {
            return Err(Error::InvalidParameter("read deadline must not be zero".into()));
        }
        LinkClient::connect(&self.listen_addr, self.options).await
    }
}
