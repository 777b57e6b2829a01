//! Node identity in log output
//!
//! A node runs its background tasks inside its [`node_span`]. The JSONL
//! layer lists the active spans with their fields, so every line written on
//! behalf of a node carries `node` and `instance_id`, whichever worker
//! thread the task happens to run on.

use tracing::Span;
use uuid::Uuid;

/// Root span for everything one node does
///
/// The span has no parent, so it never nests under whatever was current
/// when the node was created. It is opened at error level so that it stays
/// enabled under any filter that lets events through.
pub fn node_span(node: &str) -> Span {
    node_span_with_instance(node, Uuid::new_v4())
}

/// Like [`node_span`] with a fixed instance id
pub fn node_span_with_instance(node: &str, instance_id: Uuid) -> Span {
    tracing::error_span!(parent: None, "node", node = %node, instance_id = %instance_id)
}
