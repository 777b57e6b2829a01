//! Envelopes and acknowledgments
//!
//! An [`Envelope`] is the unit of transfer between nodes. It is parsed
//! strictly at the wire boundary: required fields must be present and
//! non-empty, optional fields fall back to well-defined defaults.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EnvelopeError;

/// Unique identifier for an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(pub Uuid);

impl EnvelopeId {
    /// Generate a fresh random identifier
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Display for EnvelopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvelopeStatus {
    /// Still travelling
    #[default]
    InProgress,
    /// Reached its destination
    Delivered,
    /// Dropped after every forwarding option failed
    Failed,
}

impl EnvelopeStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

fn default_kind() -> String {
    "data".to_string()
}

/// One message travelling hop by hop toward its destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope identifier
    pub id: EnvelopeId,
    /// Message type (`data` unless the sender says otherwise)
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Originating node
    pub source: String,
    /// Final destination node
    pub destination: String,
    /// Opaque payload (string or JSON object)
    #[serde(default)]
    pub payload: Value,
    /// Node names visited so far, in order
    #[serde(default)]
    pub route: Vec<String>,
    /// Node that handed this envelope to the current holder
    #[serde(default)]
    pub last_hop: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: EnvelopeStatus,
}

impl Envelope {
    /// Create a new envelope originating at `source`
    ///
    /// The route starts with the source itself and there is no previous hop.
    pub fn new(source: impl Into<String>, destination: impl Into<String>, payload: Value) -> Self {
        let source = source.into();
        Self {
            id: EnvelopeId::new_v4(),
            kind: default_kind(),
            route: vec![source.clone()],
            source,
            destination: destination.into(),
            payload,
            last_hop: None,
            status: EnvelopeStatus::InProgress,
        }
    }

    /// Set a custom message type
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Decode an envelope from one wire frame
    ///
    /// Leading and trailing whitespace (including the framing newline) is
    /// ignored. `source` and `destination` must be non-empty.
    pub fn from_slice(frame: &[u8]) -> Result<Self, EnvelopeError> {
        let trimmed = frame.trim_ascii();
        if trimmed.is_empty() {
            return Err(EnvelopeError::Empty);
        }

        let envelope: Envelope = serde_json::from_slice(trimmed)?;
        if envelope.source.trim().is_empty() {
            return Err(EnvelopeError::MissingField("source"));
        }
        if envelope.destination.trim().is_empty() {
            return Err(EnvelopeError::MissingField("destination"));
        }
        Ok(envelope)
    }

    /// Encode as one newline-terminated JSON line
    pub fn to_line(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Record that `node` now holds this envelope
    ///
    /// Appends `node` to the route unless it is already the last entry.
    /// The route never shrinks.
    pub fn stamp_hop(&mut self, node: &str) {
        if self.route.last().map(String::as_str) != Some(node) {
            self.route.push(node.to_string());
        }
    }

    /// Rewrite the previous-hop marker before forwarding
    pub fn set_last_hop(&mut self, node: &str) {
        self.last_hop = Some(node.to_string());
    }

    /// Mark as delivered
    pub fn mark_delivered(&mut self) {
        self.status = EnvelopeStatus::Delivered;
    }

    /// Mark as failed
    pub fn mark_failed(&mut self) {
        self.status = EnvelopeStatus::Failed;
    }

    /// Whether `node` appears anywhere in the route
    pub fn visited(&self, node: &str) -> bool {
        self.route.iter().any(|n| n == node)
    }

    /// Number of hops taken so far
    pub fn hop_count(&self) -> usize {
        self.route.len().saturating_sub(1)
    }
}

/// A single-line acknowledgment returned by the receiving listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Whether the envelope was accepted
    pub ok: bool,
    /// Envelope id, when one could be decoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Node that accepted the envelope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_by: Option<String>,
    /// Rejection reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    /// Acknowledge an accepted envelope
    pub fn accepted(id: EnvelopeId, received_by: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: Some(id.to_string()),
            received_by: Some(received_by.into()),
            error: None,
        }
    }

    /// Reject a frame
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            received_by: None,
            error: Some(error.into()),
        }
    }

    /// Decode from one line
    pub fn from_slice(line: &[u8]) -> Result<Self, EnvelopeError> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Err(EnvelopeError::Empty);
        }
        Ok(serde_json::from_slice(trimmed)?)
    }

    /// Encode as one newline-terminated JSON line
    pub fn to_line(&self) -> Result<Vec<u8>, EnvelopeError> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_creation() {
        let env = Envelope::new("A", "C", json!("hello"));

        assert_eq!(env.kind, "data");
        assert_eq!(env.route, vec!["A".to_string()]);
        assert_eq!(env.last_hop, None);
        assert_eq!(env.status, EnvelopeStatus::InProgress);
        assert_eq!(env.hop_count(), 0);
    }

    #[test]
    fn test_stamp_hop_is_append_only() {
        let mut env = Envelope::new("A", "C", Value::Null);

        env.stamp_hop("A"); // already last
        assert_eq!(env.route, vec!["A"]);

        env.stamp_hop("B");
        env.stamp_hop("B");
        env.stamp_hop("A"); // cycles are recorded, not collapsed
        assert_eq!(env.route, vec!["A", "B", "A"]);
        assert!(env.visited("B"));
        assert_eq!(env.hop_count(), 2);
    }

    #[test]
    fn test_wire_field_names() {
        let mut env = Envelope::new("A", "C", json!({"text": "hi"}));
        env.set_last_hop("A");

        let value: Value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "data");
        assert_eq!(value["last_hop"], "A");
        assert_eq!(value["status"], "IN_PROGRESS");
        assert_eq!(value["payload"]["text"], "hi");
    }

    #[test]
    fn test_from_slice_applies_defaults() {
        let frame = br#"{"id":"6f1c2d7e-3b0a-4f38-9a49-1d2f3e4a5b6c","source":"A","destination":"C","payload":"x"}
"#;
        let env = Envelope::from_slice(frame).unwrap();

        assert_eq!(env.kind, "data");
        assert!(env.route.is_empty());
        assert_eq!(env.last_hop, None);
        assert_eq!(env.status, EnvelopeStatus::InProgress);
    }

    #[test]
    fn test_from_slice_rejects_malformed() {
        assert!(matches!(
            Envelope::from_slice(b"not json"),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::from_slice(b"  \n"),
            Err(EnvelopeError::Empty)
        ));
        // missing id
        assert!(matches!(
            Envelope::from_slice(br#"{"source":"A","destination":"C"}"#),
            Err(EnvelopeError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::from_slice(
                br#"{"id":"6f1c2d7e-3b0a-4f38-9a49-1d2f3e4a5b6c","source":"A","destination":" "}"#
            ),
            Err(EnvelopeError::MissingField("destination"))
        ));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!EnvelopeStatus::InProgress.is_terminal());
        assert!(EnvelopeStatus::Delivered.is_terminal());
        assert!(EnvelopeStatus::Failed.is_terminal());
    }

    #[test]
    fn test_line_is_newline_terminated() {
        let env = Envelope::new("A", "C", Value::Null);
        let line = env.to_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(Envelope::from_slice(&line).unwrap(), env);
    }

    #[test]
    fn test_ack_lines() {
        let id = EnvelopeId::new_v4();
        let ack = Ack::accepted(id, "B");
        let parsed = Ack::from_slice(&ack.to_line().unwrap()).unwrap();
        assert!(parsed.ok);
        assert_eq!(parsed.received_by.as_deref(), Some("B"));

        let nack = Ack::rejected("malformed");
        let value: Value = serde_json::to_value(&nack).unwrap();
        assert_eq!(value["ok"], false);
        assert!(value.get("id").is_none());
    }
}
