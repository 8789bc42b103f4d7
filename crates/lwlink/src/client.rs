//! LinkClient -- UDP session with a LightwaveRF Link.
//!
//! One client owns one socket. A spawned receive loop decodes every datagram
//! and hands it to the [`Registry`]: legacy replies go to whoever sent the
//! command with the matching sequence ID, JSON events go to every JSON
//! subscriber. Callers never read the socket themselves; they subscribe,
//! send, and wait on their channels.
//!
//! The Link drops commands that arrive too close together, so every send goes
//! through a single mutex that stays locked for a short spacing delay after
//! the datagram has left.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use lwlink_core::error::{Error, Result};
use lwlink_core::{Inbound, JsonEvent};
use lwlink_transport::{DatagramSource, MAX_DATAGRAM, UdpTransport};

use crate::codec;
use crate::commands::{self, RenderedCommand};
use crate::endpoint::Endpoint;
use crate::latency::{LatencyStats, LatencyTracker};
use crate::pairing::{PairingMachine, PairingState};
use crate::registry::{EventSink, LegacySink, Registry, Subscription};
use crate::rooms;

/// Port the Link listens for commands on.
pub const COMMAND_PORT: u16 = 9760;

/// Port the Link sends replies to.
pub const LISTEN_PORT: u16 = 9761;

const DEFAULT_SEND_SPACING: Duration = Duration::from_millis(125);
const DEFAULT_READ_DEADLINE: Duration = Duration::from_secs(1);
const DEFAULT_LEGACY_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_ROOM_QUERY_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_PAIRING_INITIAL_RETRY: Duration = Duration::from_secs(1);
// The Link keeps its pairing window open for about 15 seconds.
const DEFAULT_PAIRING_RETRY_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Configuration options for [`LinkClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Where commands go until the Link has been heard from.
    pub hub_addr: SocketAddr,
    /// How long the send path stays locked after each datagram.
    pub send_spacing: Duration,
    /// Receive loop read deadline. Expiry is not an error.
    pub read_deadline: Duration,
    /// How long [`LinkClient::do_legacy`] waits for an answer.
    pub legacy_timeout: Duration,
    /// Timeout for the room summary in [`LinkClient::query_all_radiators`].
    pub command_timeout: Duration,
    /// Timeout for each per-room query.
    pub room_query_timeout: Duration,
    /// First registration retry.
    pub pairing_initial_retry: Duration,
    /// Later registration retries.
    pub pairing_retry_interval: Duration,
    /// Give up registering after this long. `None` waits forever.
    pub pairing_timeout: Option<Duration>,
    /// Capacity of the per-call reply channels.
    pub channel_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            hub_addr: SocketAddr::from((Ipv4Addr::BROADCAST, COMMAND_PORT)),
            send_spacing: DEFAULT_SEND_SPACING,
            read_deadline: DEFAULT_READ_DEADLINE,
            legacy_timeout: DEFAULT_LEGACY_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            room_query_timeout: DEFAULT_ROOM_QUERY_TIMEOUT,
            pairing_initial_retry: DEFAULT_PAIRING_INITIAL_RETRY,
            pairing_retry_interval: DEFAULT_PAIRING_RETRY_INTERVAL,
            pairing_timeout: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// How a command was answered.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// Legacy `OK` to a command that never gets a JSON answer.
    Acknowledged,
    /// The JSON event that answered the command.
    Event(JsonEvent),
}

impl CommandReply {
    pub fn event(&self) -> Option<&JsonEvent> {
        match self {
            CommandReply::Event(event) => Some(event),
            CommandReply::Acknowledged => None,
        }
    }

    pub fn into_event(self) -> Option<JsonEvent> {
        match self {
            CommandReply::Event(event) => Some(event),
            CommandReply::Acknowledged => None,
        }
    }
}

/// UDP client for a LightwaveRF Link.
///
/// Safe to share across tasks behind an `Arc`; every method takes `&self`.
/// Dropping the client stops its receive loop.
pub struct LinkClient {
    transport: Arc<UdpTransport>,
    registry: Arc<Registry>,
    endpoint: Arc<Mutex<Endpoint>>,
    latency: LatencyTracker,

    /// Serializes transmissions. Each guard is released by a delayed task.
    send_lock: Arc<tokio::sync::Mutex<()>>,

    /// Cancelled on close or transport fault.
    shutdown: CancellationToken,

    /// Message of the fault that killed the receive loop, if any.
    fault: Arc<Mutex<Option<String>>>,

    options: ClientOptions,
}

impl LinkClient {
    /// Bind `listen_addr`, enable broadcast and start the receive loop.
    ///
    /// Most callers should go through
    /// [`LinkClientBuilder`](crate::builder::LinkClientBuilder).
    pub async fn connect(listen_addr: &str, mut options: ClientOptions) -> Result<Self> {
        options.channel_capacity = options.channel_capacity.max(1);

        let transport = UdpTransport::bind(listen_addr).await?;
        transport.set_broadcast(true)?;
        let transport = Arc::new(transport);

        let registry = Arc::new(Registry::new());
        let endpoint = Arc::new(Mutex::new(Endpoint::new(options.hub_addr)));
        let shutdown = CancellationToken::new();
        let fault = Arc::new(Mutex::new(None));

        tokio::spawn(receive_loop(
            Arc::clone(&transport),
            Arc::clone(&registry),
            Arc::clone(&endpoint),
            shutdown.clone(),
            Arc::clone(&fault),
            options.read_deadline,
        ));

        tracing::info!(
            local = %transport.local_addr(),
            hub = %options.hub_addr,
            "Link client started"
        );

        Ok(Self {
            transport,
            registry,
            endpoint,
            latency: LatencyTracker::new(),
            send_lock: Arc::new(tokio::sync::Mutex::new(())),
            shutdown,
            fault,
            options,
        })
    }

    // -----------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------

    /// Send `payload` under a fresh sequence ID, registering the given sinks
    /// under that ID first. Returns the sequence ID.
    ///
    /// The sinks stay registered until [`unsubscribe`](Self::unsubscribe) is
    /// called with the returned ID. If transmission fails they are removed
    /// again.
    pub async fn send(
        &self,
        payload: &str,
        legacy: Option<LegacySink>,
        json: Option<EventSink>,
    ) -> Result<u64> {
        let sequence = self.registry.next_sequence();
        let key = sequence.to_string();
        let subscribed = legacy.is_some() || json.is_some();
        if subscribed {
            self.registry.subscribe(&key, legacy, json);
        }
        if let Err(e) = self.transmit(sequence, payload).await {
            if subscribed {
                self.registry.unsubscribe(&key);
            }
            return Err(e);
        }
        Ok(sequence)
    }

    /// Send with sinks held by a guard, so every exit path of the caller
    /// releases them.
    async fn send_scoped(
        &self,
        payload: &str,
        legacy: Option<LegacySink>,
        json: Option<EventSink>,
    ) -> Result<(u64, Subscription)> {
        let sequence = self.registry.next_sequence();
        let subscription = Subscription::new(
            Arc::clone(&self.registry),
            &sequence.to_string(),
            legacy,
            json,
        );
        self.transmit(sequence, payload).await?;
        Ok((sequence, subscription))
    }

    /// Put one command on the wire through the spaced send path.
    async fn transmit(&self, sequence: u64, payload: &str) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(self.fault_error());
        }

        let guard = Arc::clone(&self.send_lock).lock_owned().await;

        let (addr, datagram) = {
            let endpoint = self.endpoint.lock();
            (
                endpoint.addr(),
                codec::encode(sequence, endpoint.mac(), payload),
            )
        };

        tracing::debug!(sequence, payload = %payload, to = %addr, "Sending command");
        let result = self
            .transport
            .send_to(&datagram, addr)
            .await
            .map_err(|e| match e {
                Error::Io(io) => Error::Transport(format!("send to {} failed: {}", addr, io)),
                other => other,
            });

        let spacing = self.options.send_spacing;
        tokio::spawn(async move {
            tokio::time::sleep(spacing).await;
            drop(guard);
        });

        result
    }

    // -----------------------------------------------------------------
    // Request/response
    // -----------------------------------------------------------------

    /// Send a raw payload and return the first answer as text.
    ///
    /// Returns the legacy payload, or the raw JSON text if an event arrives
    /// first. An empty string means nothing came back within the legacy
    /// timeout.
    pub async fn do_legacy(&self, payload: &str) -> Result<String> {
        let (legacy_tx, mut legacy_rx) = mpsc::channel(1);
        let (json_tx, mut json_rx) = mpsc::channel(1);
        let (sequence, _subscription) = self
            .send_scoped(payload, Some(legacy_tx), Some(json_tx))
            .await?;

        tokio::select! {
            Some(reply) = legacy_rx.recv() => {
                tracing::debug!(sequence, reply = %reply, "Legacy reply");
                Ok(reply)
            }
            Some(event) = json_rx.recv() => {
                tracing::debug!(sequence, trans = event.trans, "Event reply");
                Ok(event.raw().to_string())
            }
            _ = tokio::time::sleep(self.options.legacy_timeout) => {
                tracing::debug!(sequence, payload = %payload, "No reply");
                Ok(String::new())
            }
            _ = self.shutdown.cancelled() => Err(self.fault_error()),
        }
    }

    /// Send `command` and wait for the reply it expects.
    ///
    /// A legacy `OK` completes legacy-only commands and is otherwise just an
    /// acknowledgement on the way to the JSON answer. Any other legacy payload
    /// is an [`Error::UnexpectedReply`]. JSON events that do not satisfy the
    /// command's matcher are ignored.
    pub async fn execute(
        &self,
        command: &RenderedCommand,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandReply> {
        self.execute_where(command, timeout, cancel, |_| true).await
    }

    /// [`execute`](Self::execute), additionally requiring the answering event
    /// to satisfy `accept`. Events the command's matcher takes but `accept`
    /// rejects are answers to some other request and are skipped.
    async fn execute_where<F>(
        &self,
        command: &RenderedCommand,
        timeout: Duration,
        cancel: &CancellationToken,
        accept: F,
    ) -> Result<CommandReply>
    where
        F: Fn(&JsonEvent) -> bool,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let capacity = self.options.channel_capacity;
        let (legacy_tx, mut legacy_rx) = mpsc::channel(capacity);
        let (json_tx, mut json_rx) = mpsc::channel(capacity);

        let (sequence, _subscription) = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = self.send_scoped(command.text(), Some(legacy_tx), Some(json_tx)) => sent?,
        };

        // Timed from transmission, not from queueing for the send path.
        let start = Instant::now();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(sequence, command = %command, "Command cancelled");
                    return Err(Error::Cancelled);
                }
                _ = self.shutdown.cancelled() => return Err(self.fault_error()),
                _ = &mut deadline => {
                    tracing::debug!(sequence, command = %command, "Command timed out");
                    return Err(Error::Timeout);
                }
                Some(payload) = legacy_rx.recv() => {
                    if payload != "OK" {
                        return Err(Error::UnexpectedReply(payload));
                    }
                    if command.is_legacy_only() {
                        self.latency.sample(command.template(), start.elapsed());
                        return Ok(CommandReply::Acknowledged);
                    }
                    tracing::trace!(sequence, "OK, waiting for event");
                }
                Some(event) = json_rx.recv() => {
                    if !command.is_legacy_only() && command.is_response(&event) && accept(&event) {
                        self.latency.sample(command.template(), start.elapsed());
                        return Ok(CommandReply::Event(event));
                    }
                    tracing::trace!(sequence, trans = event.trans, "Ignoring unrelated event");
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Higher-level operations
    // -----------------------------------------------------------------

    /// Make sure the Link accepts our commands, pairing if necessary.
    ///
    /// If the Link does not know this host, someone has to press its button.
    /// The registration is repeated under the same sequence ID until the Link
    /// reports success, or until `pairing_timeout` if one is configured.
    pub async fn ensure_registered(&self) -> Result<()> {
        let capacity = self.options.channel_capacity;
        let (legacy_tx, mut legacy_rx) = mpsc::channel(capacity);
        let (json_tx, mut json_rx) = mpsc::channel(capacity);

        let register = commands::REGISTER.instance()?;
        let mut machine = PairingMachine::new();

        let (sequence, _subscription) = self
            .send_scoped(register.text(), Some(legacy_tx), Some(json_tx))
            .await?;
        machine.sent();

        let retry = tokio::time::sleep(self.options.pairing_initial_retry);
        tokio::pin!(retry);

        let limit = self.options.pairing_timeout;
        let give_up = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(give_up);

        while !machine.is_paired() {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(self.fault_error()),
                _ = &mut give_up => {
                    tracing::warn!(state = %machine.state(), "Gave up waiting for pairing");
                    return Err(Error::Timeout);
                }
                Some(payload) = legacy_rx.recv() => {
                    tracing::debug!(sequence, payload = %payload, "Registration reply");
                    if machine.on_legacy(&payload) == PairingState::Paired {
                        tracing::info!(version = %payload, "Already paired with Link");
                    }
                }
                Some(event) = json_rx.recv() => {
                    let before = machine.state();
                    match machine.on_event(&event) {
                        PairingState::Paired => tracing::info!("Pairing successful"),
                        PairingState::PairingRequired if before != PairingState::PairingRequired => {
                            tracing::info!("Pairing required: press the button on the Link");
                        }
                        _ => {}
                    }
                }
                _ = &mut retry => {
                    if machine.on_retry() {
                        tracing::debug!(sequence, state = %machine.state(), "Resending registration");
                        self.transmit(sequence, register.text()).await?;
                    }
                    retry
                        .as_mut()
                        .reset(Instant::now() + self.options.pairing_retry_interval);
                }
            }
        }
        Ok(())
    }

    /// Read every radiator the Link knows about.
    ///
    /// Asks for the room summary, then queries each room it marks in use.
    /// Rooms that fail to answer are logged and skipped.
    pub async fn query_all_radiators(&self, cancel: &CancellationToken) -> Result<Vec<JsonEvent>> {
        let summary_cmd = commands::QUERY_RADIATORS.instance()?;
        let summary = self
            .execute(&summary_cmd, self.options.command_timeout, cancel)
            .await?
            .into_event()
            .ok_or_else(|| Error::UnexpectedReply("room summary without event".into()))?;

        let rooms = rooms::rooms_in_use(&summary);
        tracing::info!(rooms = ?rooms, "Room summary");

        let mut radiators = Vec::with_capacity(rooms.len());
        for room in rooms {
            let query = commands::QUERY_RADIATOR.render(&[&commands::room_id(room)])?;
            // A room that timed out may still answer late; only take the
            // read for the room asked about.
            let slot = u32::from(room);
            match self
                .execute_where(&query, self.options.room_query_timeout, cancel, |event| {
                    event.slot == Some(slot)
                })
                .await
            {
                Ok(CommandReply::Event(event)) => {
                    tracing::info!(room, serial = %event.serial, "Radiator");
                    radiators.push(event);
                }
                Ok(CommandReply::Acknowledged) => {}
                Err(e @ (Error::Cancelled | Error::Transport(_) | Error::NotConnected)) => {
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(room, command = %query, error = %e, "Room query failed, skipping");
                }
            }
        }
        Ok(radiators)
    }

    // -----------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------

    /// Register sinks under `key`. An empty key allocates a fresh sequence ID.
    /// Returns the effective key.
    pub fn subscribe(
        &self,
        key: &str,
        legacy: Option<LegacySink>,
        json: Option<EventSink>,
    ) -> String {
        self.registry.subscribe(key, legacy, json)
    }

    /// Remove whatever is registered under `key`.
    pub fn unsubscribe(&self, key: &str) {
        self.registry.unsubscribe(key);
    }

    /// Receive every accepted JSON event until the returned guard is dropped.
    pub fn subscribe_events(&self, capacity: usize) -> (Subscription, mpsc::Receiver<JsonEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscription = Subscription::new(Arc::clone(&self.registry), "", None, Some(tx));
        (subscription, rx)
    }

    /// Keys currently registered.
    pub fn pending_keys(&self) -> Vec<String> {
        self.registry.keys()
    }

    // -----------------------------------------------------------------
    // State
    // -----------------------------------------------------------------

    /// Latency report for every command that has completed.
    pub fn stats(&self) -> String {
        self.latency.report()
    }

    /// Latency statistics for one command template.
    pub fn latency(&self, template: &str) -> Option<LatencyStats> {
        self.latency.get(template)
    }

    /// Where commands are currently sent.
    pub fn hub_addr(&self) -> SocketAddr {
        self.endpoint.lock().addr()
    }

    /// Link MAC, once learned.
    pub fn hub_mac(&self) -> Option<String> {
        self.endpoint.lock().mac().map(str::to_string)
    }

    /// Highest transaction number delivered to subscribers.
    pub fn last_transaction(&self) -> Option<i64> {
        self.endpoint.lock().last_transaction()
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stop the receive loop. In-flight calls fail with [`Error::NotConnected`].
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(local = %self.transport.local_addr(), "Closing Link client");
            self.shutdown.cancel();
        }
    }

    /// Wait until the client stops. Returns the transport fault if that is
    /// what stopped it.
    pub async fn closed(&self) -> Result<()> {
        self.shutdown.cancelled().await;
        match self.fault.lock().clone() {
            Some(message) => Err(Error::Transport(message)),
            None => Ok(()),
        }
    }

    fn fault_error(&self) -> Error {
        match self.fault.lock().clone() {
            Some(message) => Error::Transport(message),
            None => Error::NotConnected,
        }
    }
}

impl Drop for LinkClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for LinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = self.endpoint.lock().clone();
        f.debug_struct("LinkClient")
            .field("local_addr", &self.transport.local_addr())
            .field("sequence", &self.registry.last_sequence())
            .field("hub_addr", &endpoint.addr())
            .field("hub_mac", &endpoint.mac())
            .field("last_trans", &endpoint.last_transaction())
            .field("pending", &self.registry.keys())
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Receive loop
// ---------------------------------------------------------------------------

/// Read datagrams from `source` until shutdown. Any error other than a read
/// deadline expiry is recorded as the client's fault and shuts it down.
async fn receive_loop<S>(
    source: Arc<S>,
    registry: Arc<Registry>,
    endpoint: Arc<Mutex<Endpoint>>,
    shutdown: CancellationToken,
    fault: Arc<Mutex<Option<String>>>,
    read_deadline: Duration,
) where
    S: DatagramSource + 'static,
{
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            r = source.receive(&mut buf, read_deadline) => r,
        };

        match received {
            Ok((n, src)) => dispatch(&buf[..n], src, &registry, &endpoint),
            Err(Error::Timeout) => continue,
            Err(e) => {
                tracing::error!(error = %e, "Receive failed, closing Link client");
                *fault.lock() = Some(e.to_string());
                shutdown.cancel();
                break;
            }
        }
    }
    tracing::debug!("Receive loop exited");
}

/// Decode one datagram and route it to subscribers.
fn dispatch(raw: &[u8], src: SocketAddr, registry: &Registry, endpoint: &Mutex<Endpoint>) {
    match codec::decode(raw) {
        Ok(Inbound::Legacy(reply)) => {
            endpoint.lock().observe_source(src.ip());
            tracing::debug!(sequence = %reply.sequence, payload = %reply.payload, "Legacy reply");
            registry.deliver_legacy(&reply.sequence, &reply.payload);
        }
        Ok(Inbound::Event(event)) => {
            {
                let mut endpoint = endpoint.lock();
                endpoint.observe_source(src.ip());
                if !endpoint.accept_transaction(event.trans) {
                    tracing::trace!(trans = event.trans, "Duplicate event");
                    return;
                }
                endpoint.learn_mac(&event.mac);
            }
            tracing::debug!(trans = event.trans, event = %event, "Event");
            registry.broadcast_json(&event);
        }
        Err(e) => {
            tracing::warn!(from = %src, error = %e, "Dropping undecodable datagram");
        }
    }
}
