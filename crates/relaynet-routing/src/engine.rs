//! Forwarding engine
//!
//! The [`ForwardingEngine`] decides, for one envelope held by this node,
//! where it goes next:
//!
//! 1. **LOCAL**: addressed to this node, mark delivered and stop
//! 2. **DIRECT**: the destination is a neighbor, hand it over directly
//! 3. **TABLE ROUTE**: otherwise follow the route table, unless the next hop
//!    is the node that just sent us the envelope
//! 4. **REROUTE**: if that failed, try every other neighbor in configuration
//!    order (skipping the sender and the peer that just failed) and learn the
//!    first one that accepts
//! 5. **FAIL**: mark failed and drop
//!
//! Each step consults the backoff tracker once before its first attempt; a
//! peer in cooldown counts as a failed step without touching the network.

use std::sync::Arc;
use std::time::Duration;

use relaynet_core::{Envelope, ForwardStep, Peer, RelayEvent, RouteOrigin};
use serde_json::Value;
use tracing::{debug, instrument, trace};

use crate::events::EventEmitter;
use crate::link::TrackedLink;
use crate::topology::TopologyStore;

/// Longest pause between immediate retries
const MAX_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Forwarding tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Name of this node
    pub self_name: String,
    /// Extra attempts when the destination is a neighbor
    pub retries_direct: u32,
    /// Extra attempts toward a table route's next hop
    pub retries_route: u32,
    /// Extra attempts per reroute candidate
    pub retries_reroute: u32,
    /// Pause unit between immediate retries (multiplied by the attempt number)
    pub retry_pause: Duration,
}

impl EngineConfig {
    /// Defaults for a node called `self_name`
    pub fn new(self_name: impl Into<String>) -> Self {
        Self {
            self_name: self_name.into(),
            retries_direct: 1,
            retries_route: 1,
            retries_reroute: 0,
            retry_pause: Duration::from_millis(200),
        }
    }

    /// Set the extra attempt counts for each step
    pub fn with_retries(mut self, direct: u32, route: u32, reroute: u32) -> Self {
        self.retries_direct = direct;
        self.retries_route = route;
        self.retries_reroute = reroute;
        self
    }

    /// Set the retry pause unit
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    fn pause_after(&self, attempt: u32) -> Duration {
        self.retry_pause
            .saturating_mul(attempt.saturating_add(1))
            .min(MAX_RETRY_PAUSE)
    }
}

/// What happened to an envelope at this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Addressed to this node and consumed
    Delivered,
    /// Handed to a neighbor
    Forwarded {
        /// Neighbor that accepted the envelope
        next_hop: String,
        /// Step that found it
        step: ForwardStep,
    },
    /// Every option was exhausted and the envelope was dropped
    Failed,
}

impl ForwardOutcome {
    /// Whether the envelope left this node or was consumed here
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    fn forwarded(peer: &Peer, step: ForwardStep) -> Self {
        Self::Forwarded {
            next_hop: peer.name.clone(),
            step,
        }
    }
}

/// Per-node forwarding logic
#[derive(Debug)]
pub struct ForwardingEngine {
    config: EngineConfig,
    topology: Arc<TopologyStore>,
    link: TrackedLink,
    events: Arc<EventEmitter>,
}

impl ForwardingEngine {
    /// Create an engine
    pub fn new(
        config: EngineConfig,
        topology: Arc<TopologyStore>,
        link: TrackedLink,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            config,
            topology,
            link,
            events,
        }
    }

    /// Name of this node
    pub fn self_name(&self) -> &str {
        &self.config.self_name
    }

    /// Tuning in use
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared topology store
    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    /// The event emitter
    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.events
    }

    /// The backoff-reporting link
    pub fn link(&self) -> &TrackedLink {
        &self.link
    }

    /// Create a new envelope at this node and dispatch it
    pub async fn originate(&self, destination: &str, payload: Value) -> (Envelope, ForwardOutcome) {
        let mut envelope = Envelope::new(self.self_name(), destination, payload);
        self.events
            .emit(RelayEvent::originated(envelope.id, destination));
        let outcome = self.dispatch(&mut envelope).await;
        (envelope, outcome)
    }

    /// Deliver or forward one envelope held by this node
    ///
    /// The envelope's `last_hop` on entry identifies the sender; `None` or
    /// this node's own name means it originates here. The envelope is
    /// updated in place (route, last hop, terminal status). Never returns an
    /// error: exhaustion is reported as [`ForwardOutcome::Failed`].
    #[instrument(skip_all, fields(envelope_id = %envelope.id, destination = %envelope.destination))]
    pub async fn dispatch(&self, envelope: &mut Envelope) -> ForwardOutcome {
        let me = self.config.self_name.clone();
        let sender = envelope.last_hop.take().filter(|hop| *hop != me);

        envelope.stamp_hop(&me);

        if envelope.destination == me {
            envelope.last_hop = sender;
            envelope.mark_delivered();
            self.events.emit(RelayEvent::delivered(
                envelope.id,
                envelope.source.clone(),
                envelope.route.clone(),
            ));
            return ForwardOutcome::Delivered;
        }

        if sender.is_some() {
            self.events.emit(RelayEvent::forwarding(
                envelope.id,
                envelope.destination.clone(),
                sender.clone(),
            ));
        }
        envelope.set_last_hop(&me);

        let destination = envelope.destination.clone();
        let is_sender = |peer: &Peer| sender.as_deref() == Some(peer.name.as_str());
        let mut just_failed: Option<Peer> = None;

        if let Some(peer) = self.topology.neighbor(&destination).cloned() {
            if !is_sender(&peer) {
                if self
                    .try_peer(envelope, &peer, ForwardStep::Direct, self.config.retries_direct)
                    .await
                {
                    return ForwardOutcome::forwarded(&peer, ForwardStep::Direct);
                }
                just_failed = Some(peer);
            }
        } else if let Some(route) = self.topology.route_for(&destination) {
            let peer = route.next_hop;
            if is_sender(&peer) {
                trace!(next_hop = %peer.name, "Route points back at sender, skipping");
            } else {
                if self
                    .try_peer(envelope, &peer, ForwardStep::TableRoute, self.config.retries_route)
                    .await
                {
                    return ForwardOutcome::forwarded(&peer, ForwardStep::TableRoute);
                }
                just_failed = Some(peer);
            }
        }

        let candidates: Vec<Peer> = self
            .topology
            .neighbors()
            .iter()
            .filter(|peer| !is_sender(*peer))
            .filter(|peer| just_failed.as_ref().is_none_or(|f| f.name != peer.name))
            .cloned()
            .collect();

        debug!(candidates = candidates.len(), "Searching for alternative route");

        for peer in &candidates {
            if self
                .try_peer(envelope, peer, ForwardStep::Reroute, self.config.retries_reroute)
                .await
            {
                let previous = self
                    .topology
                    .set_route(&destination, peer.clone(), RouteOrigin::Learned);
                self.events.emit(RelayEvent::route_updated(
                    destination.clone(),
                    previous.map(|r| r.next_hop.name),
                    peer.name.clone(),
                ));
                return ForwardOutcome::forwarded(peer, ForwardStep::Reroute);
            }
        }

        envelope.mark_failed();
        self.events.emit(RelayEvent::delivery_failed(
            envelope.id,
            destination,
            envelope.route.clone(),
        ));
        ForwardOutcome::Failed
    }

    /// One forwarding step toward one peer: gate, then up to `retries + 1` attempts
    async fn try_peer(&self, envelope: &Envelope, peer: &Peer, step: ForwardStep, retries: u32) -> bool {
        if !self.link.allow_attempt(peer) {
            self.events
                .emit(RelayEvent::backoff_skipped(envelope.id, peer.name.clone()));
            return false;
        }

        let attempts = retries.saturating_add(1);
        for attempt in 0..attempts {
            let report = self.link.send(peer, envelope).await;
            if report.success {
                self.events.emit(RelayEvent::sent(
                    envelope.id,
                    peer.name.clone(),
                    step,
                    report.bytes,
                    report.elapsed_ms(),
                ));
                return true;
            }

            self.events.emit(RelayEvent::send_failed(
                envelope.id,
                peer.name.clone(),
                step,
                attempt,
            ));
            if attempt + 1 < attempts {
                tokio::time::sleep(self.config.pause_after(attempt)).await;
            }
        }
        false
    }
}
