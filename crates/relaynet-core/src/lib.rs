//! # Relaynet Core
//!
//! Core types, events, and errors shared by every relaynet crate.
//!
//! This crate holds the data model of the relay (peers, routes, envelopes),
//! the structured events emitted while forwarding, and the [`PeerLink`]
//! seam that lets the forwarding engine run against real TCP or against
//! the in-memory [`MockPeerLink`] in tests.
//!
//! ## Key Types
//!
//! - [`Peer`]: A directly dialable neighbor (`name:port`)
//! - [`Route`]: The currently believed next hop toward a destination
//! - [`Envelope`]: One message travelling hop by hop
//! - [`RelayEvent`]: Observable occurrences (delivery, reroute, heal, ...)
//!
//! ## Key Traits
//!
//! - [`PeerLink`]: One outbound attempt to one neighbor

pub mod envelope;
pub mod error;
pub mod event;
pub mod link;
pub mod mock_link;
pub mod peer;

// Re-export main types
pub use envelope::*;
pub use error::*;
pub use event::*;
pub use link::*;
pub use mock_link::*;
pub use peer::*;
