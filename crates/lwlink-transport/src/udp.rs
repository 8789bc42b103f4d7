//! Datagram socket used by the Link client.
//!
//! A single socket both sends commands and receives replies. It is shared
//! between the receive loop (which only reads) and the send path (which only
//! writes), so every method takes `&self`.

use std::net::SocketAddr;
use std::time::Duration;

use lwlink_core::error::{Error, Result};
use tokio::net::UdpSocket;

/// Largest UDP payload over IPv4. A receive buffer this size can never
/// truncate a datagram, so an oversized event still decodes in full.
pub const MAX_DATAGRAM: usize = 65_507;

/// UDP transport for Link traffic.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port`, e.g. `"0.0.0.0:9761"` or `"127.0.0.1:0"`.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;
        let local_addr = socket.local_addr().map_err(Error::Io)?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");
        Ok(Self { socket, local_addr })
    }

    /// The address the socket is bound to. Useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send `data` as one datagram.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        let sent = self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;

        if sent != data.len() {
            return Err(Error::Transport(format!(
                "short datagram write: {} of {} bytes",
                sent,
                data.len()
            )));
        }
        Ok(())
    }

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// Returns `(bytes_read, source_addr)`, or [`Error::Timeout`] when the
    /// deadline passes with nothing received. Any other failure is an
    /// [`Error::Io`].
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(
                    local = %self.local_addr,
                    error = %e,
                    "Failed to receive datagram"
                );
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Allow sending to broadcast addresses. Required until the hub's unicast
    /// address is known.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        tracing::debug!(local = %self.local_addr, enable, "Setting broadcast");

        self.socket.set_broadcast(enable).map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                error = %e,
                "Failed to set broadcast"
            );
            Error::Io(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_local_addr() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr();

        assert_eq!(addr.ip(), std::net::Ipv4Addr::LOCALHOST);
        assert_ne!(addr.port(), 0, "OS should assign a nonzero port");
    }

    #[tokio::test]
    async fn large_datagram_arrives_whole() {
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        // Well past the size of a typical event.
        let event = format!("*!{{\"trans\":1,\"pad\":\"{}\"}}", "x".repeat(4000));
        sender
            .send_to(event.as_bytes(), receiver.local_addr())
            .await
            .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, _) = receiver
            .recv_from(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, event.len());
        assert_eq!(&buf[..n], event.as_bytes());
    }

    #[tokio::test]
    async fn send_recv_loopback_reports_source() {
        let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let hub = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        client.send_to(b"1,@H", hub.local_addr()).await.unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, src) = hub
            .recv_from(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(&buf[..n], b"1,@H");
        assert_eq!(src, client.local_addr());
    }

    #[tokio::test]
    async fn recv_timeout() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        let mut buf = [0u8; 64];
        let result = transport
            .recv_from(&mut buf, Duration::from_millis(50))
            .await;

        assert!(
            matches!(result, Err(Error::Timeout)),
            "expected Timeout, got: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn datagrams_keep_boundaries() {
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr();

        let messages: &[&[u8]] = &[b"1,OK", b"2,ERR,1,\"bad\"", b"*!{\"trans\":1}"];
        for msg in messages {
            sender.send_to(msg, dest).await.unwrap();
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        for expected in messages {
            let (n, _) = receiver
                .recv_from(&mut buf, Duration::from_secs(2))
                .await
                .unwrap();
            assert_eq!(&buf[..n], *expected);
        }
    }

    #[tokio::test]
    async fn set_broadcast_succeeds() {
        let transport = UdpTransport::bind("0.0.0.0:0").await.unwrap();
        transport.set_broadcast(true).unwrap();
        transport.set_broadcast(false).unwrap();
    }
}
