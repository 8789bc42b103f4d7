//! Subscription registry: who wants which replies.
//!
//! Legacy replies are addressed: they carry the sequence ID of the command
//! that caused them and go to the single subscriber registered under that
//! key. JSON events are not addressed to anyone in particular, so every
//! registered JSON sink receives every event.
//!
//! Delivery never blocks. Sinks are bounded `mpsc` channels and a full sink
//! simply misses the message; the receive loop must keep draining the socket
//! regardless of how slow a consumer is.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use lwlink_core::JsonEvent;

/// Sink for legacy reply payloads.
pub type LegacySink = mpsc::Sender<String>;

/// Sink for JSON events.
pub type EventSink = mpsc::Sender<JsonEvent>;

#[derive(Default)]
struct Entry {
    legacy: Option<LegacySink>,
    json: Option<EventSink>,
}

/// Maps correlation keys to delivery sinks.
#[derive(Default)]
pub struct Registry {
    next_seq: AtomicU64,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence ID. The first one handed out is 1.
    pub fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// The most recently allocated sequence ID, 0 if none yet.
    pub fn last_sequence(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed)
    }

    /// Register sinks under `key`, allocating a fresh sequence ID when `key`
    /// is empty. Returns the effective key.
    ///
    /// Registering again under an existing key replaces its sinks.
    pub fn subscribe(
        &self,
        key: &str,
        legacy: Option<LegacySink>,
        json: Option<EventSink>,
    ) -> String {
        let key = if key.is_empty() {
            self.next_sequence().to_string()
        } else {
            key.to_string()
        };
        self.entries
            .lock()
            .insert(key.clone(), Entry { legacy, json });
        tracing::trace!(key = %key, "Subscribed");
        key
    }

    /// Remove both sinks for `key`. Unknown keys are ignored.
    pub fn unsubscribe(&self, key: &str) {
        if self.entries.lock().remove(key).is_some() {
            tracing::trace!(key = %key, "Unsubscribed");
        }
    }

    /// Hand a legacy payload to the subscriber for `key`, if any.
    ///
    /// Returns whether the payload was accepted.
    pub fn deliver_legacy(&self, key: &str, payload: &str) -> bool {
        let sink = {
            let entries = self.entries.lock();
            match entries.get(key).and_then(|e| e.legacy.clone()) {
                Some(sink) => sink,
                None => {
                    tracing::trace!(key = %key, "Legacy reply for unknown/expired sequence");
                    return false;
                }
            }
        };

        if sink.try_send(payload.to_string()).is_err() {
            tracing::debug!(key = %key, "Legacy reply dropped (subscriber full or gone)");
            return false;
        }
        true
    }

    /// Offer `event` to every JSON sink. Returns how many accepted it.
    pub fn broadcast_json(&self, event: &JsonEvent) -> usize {
        let entries = self.entries.lock();
        let mut delivered = 0;
        for (key, entry) in entries.iter() {
            let Some(sink) = &entry.json else { continue };
            match sink.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(
                        key = %key,
                        trans = event.trans,
                        "Event dropped (subscriber full or gone)"
                    );
                }
            }
        }
        delivered
    }

    /// Currently registered keys, sorted. For diagnostics.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Scoped registration. Unsubscribes when dropped, so a subscription made
/// for a call is released on every exit path, including cancellation of the
/// calling future.
pub struct Subscription {
    registry: Arc<Registry>,
    key: String,
}

impl Subscription {
    /// Register sinks and return a guard for them.
    pub fn new(
        registry: Arc<Registry>,
        key: &str,
        legacy: Option<LegacySink>,
        json: Option<EventSink>,
    ) -> Self {
        let key = registry.subscribe(key, legacy, json);
        Self { registry, key }
    }

    /// The key the sinks are registered under.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.key);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(trans: i64) -> JsonEvent {
        let mut event = JsonEvent::default();
        event.trans = trans;
        event
    }

    #[test]
    fn sequences_start_at_one_and_increase() {
        let registry = Registry::new();
        assert_eq!(registry.last_sequence(), 0);
        assert_eq!(registry.next_sequence(), 1);
        assert_eq!(registry.next_sequence(), 2);
        assert_eq!(registry.next_sequence(), 3);
        assert_eq!(registry.last_sequence(), 3);
    }

    #[test]
    fn empty_key_allocates_sequence() {
        let registry = Registry::new();
        let a = registry.subscribe("", None, None);
        let b = registry.subscribe("", None, None);
        assert_eq!(a, "1");
        assert_eq!(b, "2");
        assert_eq!(registry.keys(), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn explicit_key_is_kept() {
        let registry = Registry::new();
        assert_eq!(registry.subscribe("42", None, None), "42");
        // Explicit keys do not consume sequence IDs.
        assert_eq!(registry.next_sequence(), 1);
    }

    #[test]
    fn legacy_delivered_to_matching_key_only() {
        let registry = Registry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.subscribe("1", Some(tx_a), None);
        registry.subscribe("2", Some(tx_b), None);

        assert!(registry.deliver_legacy("2", "OK"));
        assert!(!registry.deliver_legacy("3", "OK"));

        assert_eq!(rx_b.try_recv().unwrap(), "OK");
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn legacy_to_json_only_subscriber_is_dropped() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.subscribe("1", None, Some(tx));
        assert!(!registry.deliver_legacy("1", "OK"));
    }

    #[test]
    fn json_broadcast_reaches_every_sink() {
        let registry = Registry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let (tx_legacy, _rx_legacy) = mpsc::channel(4);
        registry.subscribe("", None, Some(tx_a));
        registry.subscribe("7", Some(tx_legacy), Some(tx_b));
        registry.subscribe("8", Some(mpsc::channel(1).0), None);

        assert_eq!(registry.broadcast_json(&event(10)), 2);
        assert_eq!(rx_a.try_recv().unwrap().trans, 10);
        assert_eq!(rx_b.try_recv().unwrap().trans, 10);
    }

    #[test]
    fn full_sink_drops_without_blocking_others() {
        let registry = Registry::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        registry.subscribe("slow", None, Some(slow_tx));
        registry.subscribe("fast", None, Some(fast_tx));

        assert_eq!(registry.broadcast_json(&event(1)), 2);
        assert_eq!(registry.broadcast_json(&event(2)), 1);
        assert_eq!(registry.broadcast_json(&event(3)), 1);

        assert_eq!(slow_rx.try_recv().unwrap().trans, 1);
        assert!(slow_rx.try_recv().is_err());
        let fast: Vec<i64> = std::iter::from_fn(|| fast_rx.try_recv().ok())
            .map(|e| e.trans)
            .collect();
        assert_eq!(fast, vec![1, 2, 3]);
    }

    #[test]
    fn full_legacy_sink_drops() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.subscribe("1", Some(tx), None);
        assert!(registry.deliver_legacy("1", "OK"));
        assert!(!registry.deliver_legacy("1", "OK"));
        assert_eq!(rx.try_recv().unwrap(), "OK");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn no_delivery_after_unsubscribe() {
        let registry = Registry::new();
        let (legacy_tx, mut legacy_rx) = mpsc::channel(4);
        let (json_tx, mut json_rx) = mpsc::channel(4);
        let key = registry.subscribe("", Some(legacy_tx), Some(json_tx));

        registry.unsubscribe(&key);

        assert!(!registry.deliver_legacy(&key, "OK"));
        assert_eq!(registry.broadcast_json(&event(1)), 0);
        // Senders were dropped with the entry.
        assert!(matches!(
            legacy_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(
            json_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = Registry::new();
        registry.unsubscribe("nope");
        let key = registry.subscribe("", None, None);
        registry.unsubscribe(&key);
        registry.unsubscribe(&key);
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_unsubscribes_on_drop() {
        let registry = Arc::new(Registry::new());
        let (tx, _rx) = mpsc::channel(1);
        {
            let sub = Subscription::new(Arc::clone(&registry), "", None, Some(tx));
            assert_eq!(sub.key(), "1");
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }
}
