//! Topology store
//!
//! The [`TopologyStore`] holds the node's local view of the network: the
//! fixed neighbor set, the destinations the traffic generator targets, the
//! static route table from configuration, and the mutable route map that the
//! forwarding engine and the healing loop overwrite at runtime.
//!
//! Writes are last-write-wins per destination. Concurrent reroutes race and
//! the last successful one is kept.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use relaynet_core::{ConfigError, Peer, Route, RouteOrigin};

/// A destination whose current next hop differs from its static one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOverride {
    /// Destination name
    pub destination: String,
    /// Next hop from the static route table
    pub original: Peer,
    /// Next hop currently in use
    pub current: Peer,
}

/// Shared routing state for one node
#[derive(Debug)]
pub struct TopologyStore {
    /// Neighbors in configuration order
    neighbors: Vec<Peer>,
    /// Destinations for generated traffic
    destinations: Vec<String>,
    /// Routes as configured at boot (destination -> route)
    static_routes: HashMap<String, Route>,
    /// Routes currently in use (destination -> route)
    routes: DashMap<String, Route>,
}

impl TopologyStore {
    /// Build a store from parsed configuration
    ///
    /// Every static route must point at a configured neighbor and neighbor
    /// names must be unique.
    pub fn new(
        neighbors: Vec<Peer>,
        destinations: Vec<String>,
        static_routes: Vec<Route>,
    ) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for peer in &neighbors {
            if !names.insert(peer.name.as_str()) {
                return Err(ConfigError::DuplicatePeer(peer.name.clone()));
            }
        }

        let routes = DashMap::new();
        let mut by_destination = HashMap::new();
        for route in static_routes {
            if !neighbors.contains(&route.next_hop) {
                return Err(ConfigError::UnknownNextHop {
                    destination: route.destination,
                    next_hop: route.next_hop.to_string(),
                });
            }
            routes.insert(route.destination.clone(), route.clone());
            by_destination.insert(route.destination.clone(), route);
        }

        Ok(Self {
            neighbors,
            destinations,
            static_routes: by_destination,
            routes,
        })
    }

    /// A store with neighbors only
    pub fn with_neighbors(neighbors: Vec<Peer>) -> Result<Self, ConfigError> {
        Self::new(neighbors, Vec::new(), Vec::new())
    }

    /// Neighbors in configuration order
    pub fn neighbors(&self) -> &[Peer] {
        &self.neighbors
    }

    /// Look up a neighbor by name
    pub fn neighbor(&self, name: &str) -> Option<&Peer> {
        self.neighbors.iter().find(|p| p.name == name)
    }

    /// Destinations the traffic generator targets
    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Current route for a destination
    pub fn route_for(&self, destination: &str) -> Option<Route> {
        self.routes.get(destination).map(|r| r.clone())
    }

    /// Static route for a destination, as configured at boot
    pub fn static_route_for(&self, destination: &str) -> Option<&Route> {
        self.static_routes.get(destination)
    }

    /// Overwrite the route for a destination, returning the previous entry
    pub fn set_route(&self, destination: &str, next_hop: Peer, origin: RouteOrigin) -> Option<Route> {
        self.routes.insert(
            destination.to_string(),
            Route::with_origin(destination, next_hop, origin),
        )
    }

    /// Routes whose current next hop differs from the static table
    ///
    /// Destinations with no static route are never reported.
    pub fn overridden_routes(&self) -> Vec<RouteOverride> {
        let mut overrides: Vec<RouteOverride> = self
            .static_routes
            .iter()
            .filter_map(|(destination, original)| {
                let current = self.routes.get(destination)?;
                (current.next_hop != original.next_hop).then(|| RouteOverride {
                    destination: destination.clone(),
                    original: original.next_hop.clone(),
                    current: current.next_hop.clone(),
                })
            })
            .collect();
        overrides.sort_by(|a, b| a.destination.cmp(&b.destination));
        overrides
    }

    /// Snapshot of every current route
    pub fn routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.iter().map(|e| e.value().clone()).collect();
        routes.sort_by(|a, b| a.destination.cmp(&b.destination));
        routes
    }

    /// Number of destinations with a route
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no routes are known
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
