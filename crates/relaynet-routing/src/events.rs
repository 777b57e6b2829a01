//! Event emission
//!
//! [`EventEmitter`] is the single place relay events leave the routing
//! layer: each event is logged through `tracing` with its severity and a
//! `node` field, then published on a broadcast channel for in-process
//! subscribers.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relaynet_core::{RelayEvent, Severity};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Log at the level matching an event's severity
macro_rules! log_at {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            Severity::Debug => debug!($($arg)+),
            Severity::Info => info!($($arg)+),
            Severity::Warn => warn!($($arg)+),
            Severity::Error => error!($($arg)+),
        }
    };
}

/// Default capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Default quiet period for repeated per-peer warnings
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// Rate limiter for repeated log lines, keyed by peer
#[derive(Debug)]
pub struct LogThrottle {
    interval: Duration,
    last: DashMap<String, Instant>,
}

impl LogThrottle {
    /// Create a throttle allowing one line per key per `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: DashMap::new(),
        }
    }

    /// Whether a line for `key` may be logged now
    ///
    /// A `true` answer starts a new quiet period for that key.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.last.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) >= self.interval {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE)
    }
}

/// Logs and publishes relay events for one node
#[derive(Debug)]
pub struct EventEmitter {
    node: String,
    tx: broadcast::Sender<RelayEvent>,
    throttle: LogThrottle,
}

impl EventEmitter {
    /// Create an emitter for `node`
    pub fn new(node: impl Into<String>) -> Self {
        Self::with_capacity(node, EVENT_CHANNEL_CAPACITY)
    }

    /// Create an emitter with a custom channel capacity
    pub fn with_capacity(node: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            node: node.into(),
            tx,
            throttle: LogThrottle::default(),
        }
    }

    /// Node name attached to every event
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Subscribe to future events
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Log and publish an event
    pub fn emit(&self, event: RelayEvent) {
        self.log(&event);
        // no subscribers is fine
        let _ = self.tx.send(event);
    }

    fn log(&self, event: &RelayEvent) {
        let node = self.node.as_str();
        let kind = event.kind();
        let severity = event.severity();

        match event {
            RelayEvent::ServerStarted { addr, .. } => {
                log_at!(severity, node, event = kind, addr = %addr, "Listening on {addr}");
            }
            RelayEvent::MessageOriginated {
                envelope_id,
                destination,
                ..
            } => {
                log_at!(severity, node, event = kind, envelope_id = %envelope_id, destination = %destination, "Sending message to {destination}");
            }
            RelayEvent::MessageForwarding {
                envelope_id,
                destination,
                from,
                ..
            } => {
                log_at!(severity, node, event = kind, envelope_id = %envelope_id, destination = %destination, from = ?from, "Forwarding to {destination}");
            }
            RelayEvent::Sent {
                envelope_id,
                to,
                step,
                bytes,
                elapsed_ms,
                ..
            } => {
                log_at!(severity, node, event = kind, envelope_id = %envelope_id, from = node, to = %to, step = %step, bytes, elapsed_ms, "Sent to {to}");
            }
            RelayEvent::SendFailed {
                envelope_id,
                peer,
                step,
                attempt,
                ..
            } => {
                if self.throttle.allow(peer) {
                    log_at!(severity, node, event = kind, envelope_id = %envelope_id, peer = %peer, step = %step, attempt, "Failed to send to {peer}");
                }
            }
            RelayEvent::BackoffSkipped {
                envelope_id, peer, ..
            } => {
                log_at!(severity, node, event = kind, envelope_id = %envelope_id, peer = %peer, "Skipping {peer} (backoff active)");
            }
            RelayEvent::Delivered {
                envelope_id,
                source,
                route,
                ..
            } => {
                log_at!(severity, node, event = kind, envelope_id = %envelope_id, source = %source, route = ?route, hops = route.len().saturating_sub(1), "Delivered to {node}");
            }
            RelayEvent::RouteUpdated {
                destination,
                previous,
                next_hop,
                ..
            } => {
                log_at!(severity, node, event = kind, destination = %destination, previous = ?previous, next_hop = %next_hop, "Updated route to {destination} via {next_hop}");
            }
            RelayEvent::DeliveryFailed {
                envelope_id,
                destination,
                route,
                ..
            } => {
                log_at!(severity, node, event = kind, envelope_id = %envelope_id, destination = %destination, route = ?route, "No available route to {destination}");
            }
            RelayEvent::HealProbe {
                destination,
                original,
                current,
                ..
            } => {
                log_at!(severity, node, event = kind, destination = %destination, original = %original, current = %current, "Checking original route to {destination} via {original}");
            }
            RelayEvent::RouteHealed {
                destination,
                restored,
                replaced,
                ..
            } => {
                log_at!(severity, node, event = kind, destination = %destination, restored = %restored, replaced = %replaced, "Restored original route to {destination} via {restored}");
            }
            RelayEvent::InvalidEnvelope { reason, .. } => {
                log_at!(severity, node, event = kind, reason = %reason, "Rejected inbound frame");
            }
        }
    }
}
