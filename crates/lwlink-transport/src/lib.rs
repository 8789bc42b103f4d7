//! UDP transport for lwlink.
//!
//! The LightwaveRF Link speaks plain UDP: commands go to port 9760 on the
//! hub (or the broadcast address until the hub has been heard from), replies
//! come back both unicast and broadcast to port 9761. [`UdpTransport`] wraps a
//! tokio socket with deadline-bounded reads and error mapping consistent with
//! the rest of lwlink.
//!
//! # Example
//!
//! ```no_run
//! use lwlink_transport::UdpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> lwlink_core::Result<()> {
//! let transport = UdpTransport::bind("0.0.0.0:9761").await?;
//! transport.set_broadcast(true)?;
//!
//! let hub = "255.255.255.255:9760".parse().unwrap();
//! transport.send_to(b"1,@H", hub).await?;
//!
//! let mut buf = [0u8; 1024];
//! let (n, src) = transport.recv_from(&mut buf, Duration::from_secs(1)).await?;
//! println!("{} bytes from {}", n, src);
//! # Ok(())
//! # }
//! ```

pub mod source;
pub mod udp;

pub use source::DatagramSource;
pub use udp::{MAX_DATAGRAM, UdpTransport};
