//! What the client knows about the Link it is talking to.
//!
//! The Link echoes every JSON event twice, once unicast and once broadcast.
//! Both copies carry the same transaction number, so remembering the highest
//! number seen is enough to discard the echo.

use std::net::{IpAddr, SocketAddr};

/// Hub address, hub MAC and the last accepted transaction number.
///
/// Only the receive loop mutates this; the send path reads the address and
/// MAC tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    addr: SocketAddr,
    mac: Option<String>,
    last_trans: Option<i64>,
}

impl Endpoint {
    /// Start out addressing `addr`, normally the broadcast address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            mac: None,
            last_trans: None,
        }
    }

    /// Where commands are sent.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Hub MAC, once a JSON event has carried one.
    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    /// Highest transaction number accepted so far.
    pub fn last_transaction(&self) -> Option<i64> {
        self.last_trans
    }

    /// Record `trans` if it is newer than anything seen. Returns `false` for
    /// duplicates and stale events, which must not reach subscribers.
    pub fn accept_transaction(&mut self, trans: i64) -> bool {
        match self.last_trans {
            Some(last) if trans <= last => false,
            _ => {
                self.last_trans = Some(trans);
                true
            }
        }
    }

    /// Remember the hub MAC the first time one is seen.
    pub fn learn_mac(&mut self, mac: &str) {
        if self.mac.is_none() && !mac.is_empty() {
            tracing::debug!(mac = %mac, "Learned Link MAC");
            self.mac = Some(mac.to_string());
        }
    }

    /// Talk to whoever last sent a valid message. The command port stays as
    /// configured; replies come from a different port.
    pub fn observe_source(&mut self, ip: IpAddr) {
        if self.addr.ip() != ip {
            tracing::debug!(from = %self.addr.ip(), to = %ip, "Link address changed");
            self.addr.set_ip(ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn endpoint() -> Endpoint {
        Endpoint::new(SocketAddr::from((Ipv4Addr::BROADCAST, 9760)))
    }

    #[test]
    fn first_transaction_is_accepted() {
        let mut ep = endpoint();
        assert_eq!(ep.last_transaction(), None);
        assert!(ep.accept_transaction(0));
        assert_eq!(ep.last_transaction(), Some(0));
    }

    #[test]
    fn duplicate_transaction_is_rejected() {
        let mut ep = endpoint();
        assert!(ep.accept_transaction(14674));
        assert!(!ep.accept_transaction(14674));
        assert_eq!(ep.last_transaction(), Some(14674));
    }

    #[test]
    fn stale_transaction_is_rejected_newer_accepted() {
        let mut ep = endpoint();
        assert!(ep.accept_transaction(10));
        assert!(!ep.accept_transaction(9));
        assert!(!ep.accept_transaction(-1));
        assert!(ep.accept_transaction(11));
        assert!(!ep.accept_transaction(10));
        assert!(ep.accept_transaction(100));
        assert_eq!(ep.last_transaction(), Some(100));
    }

    #[test]
    fn mac_is_learned_once() {
        let mut ep = endpoint();
        ep.learn_mac("");
        assert_eq!(ep.mac(), None);
        ep.learn_mac("20:3B:85");
        ep.learn_mac("AA:BB:CC");
        assert_eq!(ep.mac(), Some("20:3B:85"));
    }

    #[test]
    fn source_narrows_address_keeping_port() {
        let mut ep = endpoint();
        ep.observe_source(IpAddr::V4(Ipv4Addr::new(192, 168, 4, 71)));
        assert_eq!(ep.addr(), "192.168.4.71:9760".parse().unwrap());
    }
}
