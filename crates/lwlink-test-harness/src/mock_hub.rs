//! Mock LightwaveRF Link over UDP.
//!
//! # Example
//!
//! ```
//! use lwlink_test_harness::{HubReply, MockHub};
//!
//! # async fn example() -> lwlink_core::Result<()> {
//! let hub = MockHub::start().await?;
//!
//! // When "@H" arrives, answer OK under the request's sequence ID and then
//! // send the JSON hub call event.
//! hub.respond_to(
//!     "@H",
//!     vec![
//!         HubReply::legacy("OK"),
//!         HubReply::event(r#"{"trans":1,"mac":"20:3B:85","fn":"hubCall","fw":"N2.94D"}"#),
//!     ],
//! );
//!
//! // Point the client under test at hub.addr() ...
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lwlink_core::error::{Error, Result};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One datagram the hub sends back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubReply {
    /// Legacy payload. Sent as `<sequence>,<payload>` using the sequence ID
    /// of the command being answered.
    Legacy(String),
    /// JSON object text. Sent with the `*!` prefix.
    Event(String),
    /// Sent exactly as given.
    Raw(Vec<u8>),
}

impl HubReply {
    pub fn legacy(payload: impl Into<String>) -> Self {
        HubReply::Legacy(payload.into())
    }

    pub fn event(json: impl Into<String>) -> Self {
        HubReply::Event(json.into())
    }

    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        HubReply::Raw(bytes.into())
    }

    fn encode(&self, sequence: &str) -> Vec<u8> {
        match self {
            HubReply::Legacy(payload) => format!("{},{}", sequence, payload).into_bytes(),
            HubReply::Event(json) => format!("*!{}", json).into_bytes(),
            HubReply::Raw(bytes) => bytes.clone(),
        }
    }
}

/// A command as the hub saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCommand {
    /// MAC tag from a `:<mac>,` prefix, if the client sent one.
    pub mac_tag: Option<String>,
    pub sequence: String,
    pub payload: String,
    pub from: SocketAddr,
    pub at: Instant,
}

impl ReceivedCommand {
    /// Split a datagram into its optional MAC tag, sequence ID and payload.
    fn parse(raw: &[u8], from: SocketAddr, at: Instant) -> Option<Self> {
        let text = std::str::from_utf8(raw).ok()?;
        let (mac_tag, rest) = match text.strip_prefix(':') {
            Some(tagged) => {
                let (mac, rest) = tagged.split_once(',')?;
                (Some(mac.to_string()), rest)
            }
            None => (None, text),
        };
        let (sequence, payload) = rest.split_once(',')?;
        Some(Self {
            mac_tag,
            sequence: sequence.to_string(),
            payload: payload.to_string(),
            from,
            at,
        })
    }
}

type Script = HashMap<String, VecDeque<Vec<HubReply>>>;

/// A scripted hub on a random loopback port.
///
/// Replies are keyed by command payload. Each [`respond_to`](Self::respond_to)
/// queues one batch; every matching command consumes the oldest batch. A
/// command with nothing queued is recorded and left unanswered, which is how
/// tests simulate a hub that never replies.
pub struct MockHub {
    socket: Arc<UdpSocket>,
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    received: Arc<Mutex<Vec<ReceivedCommand>>>,
    arrived: Arc<Notify>,
    task: JoinHandle<()>,
}

impl MockHub {
    /// Bind to `127.0.0.1:0` and start answering.
    pub async fn start() -> Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock hub: {}", e)))?;
        let addr = socket.local_addr().map_err(Error::Io)?;
        let socket = Arc::new(socket);
        let script = Arc::new(Mutex::new(Script::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let arrived = Arc::new(Notify::new());

        let task = tokio::spawn(serve(
            Arc::clone(&socket),
            Arc::clone(&script),
            Arc::clone(&received),
            Arc::clone(&arrived),
        ));

        tracing::debug!(addr = %addr, "Mock hub listening");
        Ok(Self {
            socket,
            addr,
            script,
            received,
            arrived,
            task,
        })
    }

    /// Where clients should send commands.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue `replies` for the next command whose payload is `payload`.
    pub fn respond_to(&self, payload: &str, replies: Vec<HubReply>) {
        self.script
            .lock()
            .entry(payload.to_string())
            .or_default()
            .push_back(replies);
    }

    /// Send an unsolicited datagram to `to`. Legacy replies go out with
    /// sequence ID `0`.
    pub async fn push(&self, to: SocketAddr, reply: HubReply) -> Result<()> {
        self.socket
            .send_to(&reply.encode("0"), to)
            .await
            .map_err(Error::Io)?;
        Ok(())
    }

    /// Everything received so far, oldest first.
    pub fn received(&self) -> Vec<ReceivedCommand> {
        self.received.lock().clone()
    }

    /// Wait until at least `count` commands have arrived.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Result<Vec<ReceivedCommand>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.arrived.notified();
            {
                let received = self.received.lock();
                if received.len() >= count {
                    return Ok(received.clone());
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::Timeout);
            }
        }
    }
}

impl Drop for MockHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    socket: Arc<UdpSocket>,
    script: Arc<Mutex<Script>>,
    received: Arc<Mutex<Vec<ReceivedCommand>>>,
    arrived: Arc<Notify>,
) {
    let mut buf = [0u8; 1024];
    loop {
        let (n, from) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Mock hub receive failed");
                continue;
            }
        };

        let Some(command) = ReceivedCommand::parse(&buf[..n], from, Instant::now()) else {
            tracing::warn!(bytes = n, "Mock hub got an unparseable command");
            continue;
        };
        tracing::trace!(sequence = %command.sequence, payload = %command.payload, "Mock hub received");

        let replies = script
            .lock()
            .get_mut(&command.payload)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        let sequence = command.sequence.clone();
        received.lock().push(command);
        arrived.notify_waiters();

        for reply in replies {
            if let Err(e) = socket.send_to(&reply.encode(&sequence), from).await {
                tracing::warn!(error = %e, "Mock hub send failed");
            }
        }
    }
}
