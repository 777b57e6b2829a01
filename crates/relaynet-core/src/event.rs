//! Relay events
//!
//! Every significant occurrence in a node is described by a [`RelayEvent`].
//! Events are the only interface to log shippers and metric exporters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeId;

/// Which forwarding step produced an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardStep {
    /// The destination is a configured neighbor
    Direct,
    /// The route table named a next hop
    TableRoute,
    /// Exploratory scan over the remaining neighbors
    Reroute,
}

impl std::fmt::Display for ForwardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::TableRoute => write!(f, "table_route"),
            Self::Reroute => write!(f, "reroute"),
        }
    }
}

/// Severity attached to an event when it is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Events that occur in a relay node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    /// The inbound listener is accepting connections
    ServerStarted {
        addr: String,
        timestamp: DateTime<Utc>,
    },

    /// A new envelope was created at this node
    MessageOriginated {
        envelope_id: EnvelopeId,
        destination: String,
        timestamp: DateTime<Utc>,
    },

    /// An envelope was received and will be forwarded
    MessageForwarding {
        envelope_id: EnvelopeId,
        destination: String,
        from: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An envelope was handed to a neighbor
    Sent {
        envelope_id: EnvelopeId,
        to: String,
        step: ForwardStep,
        bytes: usize,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One attempt to a neighbor failed
    SendFailed {
        envelope_id: EnvelopeId,
        peer: String,
        step: ForwardStep,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// A neighbor was skipped because it is cooling down
    BackoffSkipped {
        envelope_id: EnvelopeId,
        peer: String,
        timestamp: DateTime<Utc>,
    },

    /// An envelope reached its destination here
    Delivered {
        envelope_id: EnvelopeId,
        source: String,
        route: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The route table learned a new next hop
    RouteUpdated {
        destination: String,
        previous: Option<String>,
        next_hop: String,
        timestamp: DateTime<Utc>,
    },

    /// Every forwarding option was exhausted
    DeliveryFailed {
        envelope_id: EnvelopeId,
        destination: String,
        route: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The healing loop is probing an overridden route's original next hop
    HealProbe {
        destination: String,
        original: String,
        current: String,
        timestamp: DateTime<Utc>,
    },

    /// An overridden route was restored to its static next hop
    RouteHealed {
        destination: String,
        restored: String,
        replaced: String,
        timestamp: DateTime<Utc>,
    },

    /// An inbound frame was rejected at the parse boundary
    InvalidEnvelope {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ServerStarted { timestamp, .. } => *timestamp,
            Self::MessageOriginated { timestamp, .. } => *timestamp,
            Self::MessageForwarding { timestamp, .. } => *timestamp,
            Self::Sent { timestamp, .. } => *timestamp,
            Self::SendFailed { timestamp, .. } => *timestamp,
            Self::BackoffSkipped { timestamp, .. } => *timestamp,
            Self::Delivered { timestamp, .. } => *timestamp,
            Self::RouteUpdated { timestamp, .. } => *timestamp,
            Self::DeliveryFailed { timestamp, .. } => *timestamp,
            Self::HealProbe { timestamp, .. } => *timestamp,
            Self::RouteHealed { timestamp, .. } => *timestamp,
            Self::InvalidEnvelope { timestamp, .. } => *timestamp,
        }
    }

    /// Stable event name used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServerStarted { .. } => "server_started",
            Self::MessageOriginated { .. } => "message_sent",
            Self::MessageForwarding { .. } => "message_forwarding",
            Self::Sent { .. } => "edge",
            Self::SendFailed { .. } => "send_failed",
            Self::BackoffSkipped { .. } => "backoff_skip",
            Self::Delivered { .. } => "message_delivered",
            Self::RouteUpdated { .. } => "route_updated",
            Self::DeliveryFailed { .. } => "no_route_available",
            Self::HealProbe { .. } => "healing_check",
            Self::RouteHealed { .. } => "route_healed",
            Self::InvalidEnvelope { .. } => "invalid_envelope",
        }
    }

    /// Log severity of this event
    pub fn severity(&self) -> Severity {
        match self {
            Self::BackoffSkipped { .. } | Self::HealProbe { .. } => Severity::Debug,
            Self::SendFailed { .. } | Self::InvalidEnvelope { .. } => Severity::Warn,
            Self::DeliveryFailed { .. } => Severity::Error,
            _ => Severity::Info,
        }
    }

    /// Envelope this event refers to, if any
    pub fn envelope_id(&self) -> Option<EnvelopeId> {
        match self {
            Self::MessageOriginated { envelope_id, .. }
            | Self::MessageForwarding { envelope_id, .. }
            | Self::Sent { envelope_id, .. }
            | Self::SendFailed { envelope_id, .. }
            | Self::BackoffSkipped { envelope_id, .. }
            | Self::Delivered { envelope_id, .. }
            | Self::DeliveryFailed { envelope_id, .. } => Some(*envelope_id),
            _ => None,
        }
    }

    /// Create a server started event
    pub fn server_started(addr: impl Into<String>) -> Self {
        Self::ServerStarted {
            addr: addr.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a message originated event
    pub fn originated(envelope_id: EnvelopeId, destination: impl Into<String>) -> Self {
        Self::MessageOriginated {
            envelope_id,
            destination: destination.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a forwarding event
    pub fn forwarding(
        envelope_id: EnvelopeId,
        destination: impl Into<String>,
        from: Option<String>,
    ) -> Self {
        Self::MessageForwarding {
            envelope_id,
            destination: destination.into(),
            from,
            timestamp: Utc::now(),
        }
    }

    /// Create an edge (successful hop) event
    pub fn sent(
        envelope_id: EnvelopeId,
        to: impl Into<String>,
        step: ForwardStep,
        bytes: usize,
        elapsed_ms: u64,
    ) -> Self {
        Self::Sent {
            envelope_id,
            to: to.into(),
            step,
            bytes,
            elapsed_ms,
            timestamp: Utc::now(),
        }
    }

    /// Create a send failed event
    pub fn send_failed(
        envelope_id: EnvelopeId,
        peer: impl Into<String>,
        step: ForwardStep,
        attempt: u32,
    ) -> Self {
        Self::SendFailed {
            envelope_id,
            peer: peer.into(),
            step,
            attempt,
            timestamp: Utc::now(),
        }
    }

    /// Create a backoff skip event
    pub fn backoff_skipped(envelope_id: EnvelopeId, peer: impl Into<String>) -> Self {
        Self::BackoffSkipped {
            envelope_id,
            peer: peer.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a delivered event
    pub fn delivered(envelope_id: EnvelopeId, source: impl Into<String>, route: Vec<String>) -> Self {
        Self::Delivered {
            envelope_id,
            source: source.into(),
            route,
            timestamp: Utc::now(),
        }
    }

    /// Create a route updated event
    pub fn route_updated(
        destination: impl Into<String>,
        previous: Option<String>,
        next_hop: impl Into<String>,
    ) -> Self {
        Self::RouteUpdated {
            destination: destination.into(),
            previous,
            next_hop: next_hop.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a delivery failed event
    pub fn delivery_failed(
        envelope_id: EnvelopeId,
        destination: impl Into<String>,
        route: Vec<String>,
    ) -> Self {
        Self::DeliveryFailed {
            envelope_id,
            destination: destination.into(),
            route,
            timestamp: Utc::now(),
        }
    }

    /// Create a heal probe event
    pub fn heal_probe(
        destination: impl Into<String>,
        original: impl Into<String>,
        current: impl Into<String>,
    ) -> Self {
        Self::HealProbe {
            destination: destination.into(),
            original: original.into(),
            current: current.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a route healed event
    pub fn route_healed(
        destination: impl Into<String>,
        restored: impl Into<String>,
        replaced: impl Into<String>,
    ) -> Self {
        Self::RouteHealed {
            destination: destination.into(),
            restored: restored.into(),
            replaced: replaced.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an invalid envelope event
    pub fn invalid_envelope(reason: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        let id = EnvelopeId::new_v4();
        assert_eq!(
            RelayEvent::delivery_failed(id, "C", vec![]).severity(),
            Severity::Error
        );
        assert_eq!(
            RelayEvent::send_failed(id, "B", ForwardStep::Direct, 0).severity(),
            Severity::Warn
        );
        assert_eq!(
            RelayEvent::heal_probe("X", "Y", "Z").severity(),
            Severity::Debug
        );
        assert_eq!(
            RelayEvent::route_healed("X", "Y", "Z").severity(),
            Severity::Info
        );
    }

    #[test]
    fn test_envelope_id_accessor() {
        let id = EnvelopeId::new_v4();
        assert_eq!(RelayEvent::originated(id, "C").envelope_id(), Some(id));
        assert_eq!(RelayEvent::route_updated("C", None, "B").envelope_id(), None);
    }

    #[test]
    fn test_serialized_tag() {
        let event = RelayEvent::route_updated("X", Some("Y".to_string()), "Z");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "route_updated");
        assert_eq!(value["next_hop"], "Z");
        assert_eq!(event.kind(), "route_updated");
    }

    #[test]
    fn test_step_display() {
        assert_eq!(ForwardStep::TableRoute.to_string(), "table_route");
        assert_eq!(ForwardStep::Reroute.to_string(), "reroute");
    }
}
