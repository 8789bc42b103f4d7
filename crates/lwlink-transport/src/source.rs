//! The receive side of a datagram transport, as a trait.
//!
//! The client's receive loop only ever reads, so this is all it needs from a
//! socket. Tests substitute their own sources to inject failures a real
//! loopback socket cannot produce.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use lwlink_core::error::Result;

use crate::udp::UdpTransport;

/// Something datagrams can be read from.
#[async_trait]
pub trait DatagramSource: Send + Sync {
    /// Receive one datagram into `buf`, waiting at most `timeout`.
    ///
    /// Returns `(bytes_read, source_addr)`. Deadline expiry must be reported
    /// as [`Error::Timeout`](lwlink_core::Error::Timeout); any other error is
    /// treated by callers as fatal.
    async fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<(usize, SocketAddr)>;
}

#[async_trait]
impl DatagramSource for UdpTransport {
    async fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<(usize, SocketAddr)> {
        self.recv_from(buf, timeout).await
    }
}
