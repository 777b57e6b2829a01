//! # Relaynet Routing
//!
//! Adaptive forwarding for relaynet.
//!
//! This crate holds a node's routing state and the logic that moves
//! envelopes toward their destination over a [`PeerLink`](relaynet_core::PeerLink):
//!
//! - [`TopologyStore`]: Neighbors, static routes and the mutable route map
//! - [`BackoffTracker`]: Per-peer exponential cooldown with jitter
//! - [`TrackedLink`]: A peer link that reports every send to the tracker
//! - [`ForwardingEngine`]: Direct / table route / reroute / fail decision
//! - [`HealingLoop`]: Restores static routes when their next hop returns
//! - [`EventEmitter`]: Logs and publishes [`RelayEvent`](relaynet_core::RelayEvent)s
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relaynet_routing::{BackoffTracker, EngineConfig, EventEmitter, ForwardingEngine, TopologyStore, TrackedLink};
//!
//! let topology = Arc::new(TopologyStore::new(peers, destinations, routes)?);
//! let link = TrackedLink::new(raw_link, Arc::new(BackoffTracker::default()));
//! let engine = ForwardingEngine::new(
//!     EngineConfig::new("nodeA"),
//!     topology,
//!     link,
//!     Arc::new(EventEmitter::new("nodeA")),
//! );
//!
//! let (envelope, outcome) = engine.originate("nodeC", payload).await;
//! ```

pub mod backoff;
pub mod engine;
pub mod error;
pub mod events;
pub mod healing;
pub mod link;
pub mod topology;

// Re-export main types
pub use backoff::{BackoffConfig, BackoffState, BackoffTracker, MAX_COOLDOWN};
pub use engine::{EngineConfig, ForwardOutcome, ForwardingEngine};
pub use error::{RoutingError, RoutingResult};
pub use events::{DEFAULT_THROTTLE, EVENT_CHANNEL_CAPACITY, EventEmitter, LogThrottle};
pub use healing::{HealingConfig, HealingLoop};
pub use link::TrackedLink;
pub use topology::{RouteOverride, TopologyStore};
