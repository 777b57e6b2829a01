//! Peers, routes, and the static topology parsers

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A directly reachable neighbor
///
/// The name doubles as the hostname dialed by the TCP link unless the link
/// is configured with a dial-host override.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{name}:{port}")]
pub struct Peer {
    /// Logical node name (and default hostname)
    pub name: String,
    /// TCP port the neighbor listens on
    pub port: u16,
}

impl Peer {
    /// Create a new peer
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

/// Where the current next hop of a route came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RouteOrigin {
    /// Configured at boot
    #[default]
    Static,
    /// Written by the forwarding engine after a successful reroute
    Learned,
    /// Restored to the static next hop by the healing loop
    Healed,
}

/// The currently believed next hop for a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Logical destination name
    pub destination: String,
    /// Neighbor through which the destination is reached
    pub next_hop: Peer,
    /// How this entry was produced
    pub origin: RouteOrigin,
    /// When this entry was last written
    pub updated_at: DateTime<Utc>,
}

impl Route {
    /// Create a static route
    pub fn new(destination: impl Into<String>, next_hop: Peer) -> Self {
        Self {
            destination: destination.into(),
            next_hop,
            origin: RouteOrigin::Static,
            updated_at: Utc::now(),
        }
    }

    /// Create a route with an explicit origin
    pub fn with_origin(destination: impl Into<String>, next_hop: Peer, origin: RouteOrigin) -> Self {
        Self {
            origin,
            ..Self::new(destination, next_hop)
        }
    }

    /// Whether this route was learned at runtime
    pub fn is_learned(&self) -> bool {
        self.origin == RouteOrigin::Learned
    }
}

fn parse_port(entry: &str, port: &str) -> Result<u16, ConfigError> {
    port.trim().parse().map_err(|_| ConfigError::InvalidPort {
        entry: entry.to_string(),
        port: port.to_string(),
    })
}

fn entries(input: &str) -> impl Iterator<Item = &str> {
    input.split(',').map(str::trim).filter(|e| !e.is_empty())
}

/// Parse a comma list of `name:port` neighbors
///
/// Empty entries are skipped; anything else that does not parse is an error.
pub fn parse_peers(input: &str) -> Result<Vec<Peer>, ConfigError> {
    let mut seen = HashSet::new();
    let mut peers = Vec::new();

    for entry in entries(input) {
        let (name, port) = entry
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidPeer(entry.to_string()))?;
        let name = name.trim();
        if name.is_empty() || port.contains(':') {
            return Err(ConfigError::InvalidPeer(entry.to_string()));
        }
        if !seen.insert(name.to_string()) {
            return Err(ConfigError::DuplicatePeer(name.to_string()));
        }
        peers.push(Peer::new(name, parse_port(entry, port)?));
    }

    Ok(peers)
}

/// Parse a comma list of `destination:next_hop:port` static routes
pub fn parse_routes(input: &str) -> Result<Vec<Route>, ConfigError> {
    entries(input)
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
            match parts.as_slice() {
                [dest, hop, port] if !dest.is_empty() && !hop.is_empty() => {
                    Ok(Route::new(*dest, Peer::new(*hop, parse_port(entry, port)?)))
                }
                _ => Err(ConfigError::InvalidRoute(entry.to_string())),
            }
        })
        .collect()
}

/// Parse a comma list of destination names
pub fn parse_destinations(input: &str) -> Vec<String> {
    entries(input).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_peers() {
        let peers = parse_peers("nodeB:5001, nodeC:5002,").unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0], Peer::new("nodeB", 5001));
        assert_eq!(peers[1], Peer::new("nodeC", 5002));
    }

    #[test]
    fn test_parse_peers_empty() {
        assert!(parse_peers("").unwrap().is_empty());
        assert!(parse_peers(" , ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_peers_rejects_garbage() {
        assert_eq!(
            parse_peers("nodeB"),
            Err(ConfigError::InvalidPeer("nodeB".to_string()))
        );
        assert!(matches!(
            parse_peers("nodeB:http"),
            Err(ConfigError::InvalidPort { .. })
        ));
        assert!(matches!(
            parse_peers("nodeB:1:2"),
            Err(ConfigError::InvalidPeer(_))
        ));
        assert_eq!(
            parse_peers("a:1,a:2"),
            Err(ConfigError::DuplicatePeer("a".to_string()))
        );
    }

    #[test]
    fn test_parse_routes() {
        let routes = parse_routes("nodeD:nodeB:5001,nodeE:nodeC:5002").unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].destination, "nodeD");
        assert_eq!(routes[0].next_hop, Peer::new("nodeB", 5001));
        assert_eq!(routes[0].origin, RouteOrigin::Static);
        assert!(!routes[1].is_learned());
    }

    #[test]
    fn test_parse_routes_rejects_short_entry() {
        assert_eq!(
            parse_routes("nodeD:nodeB"),
            Err(ConfigError::InvalidRoute("nodeD:nodeB".to_string()))
        );
    }

    #[test]
    fn test_parse_destinations() {
        assert_eq!(
            parse_destinations(" nodeB,,nodeC "),
            vec!["nodeB".to_string(), "nodeC".to_string()]
        );
    }

    #[test]
    fn test_peer_display() {
        assert_eq!(Peer::new("nodeB", 5001).to_string(), "nodeB:5001");
    }

    #[test]
    fn test_route_with_origin() {
        let route = Route::with_origin("X", Peer::new("Z", 1), RouteOrigin::Learned);
        assert!(route.is_learned());
        assert_eq!(route.destination, "X");
    }
}
