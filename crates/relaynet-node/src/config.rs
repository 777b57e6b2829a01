//! Configuration for the relay node

use std::time::Duration;

use relaynet_core::{Peer, Route, parse_destinations, parse_peers, parse_routes};
use relaynet_routing::{BackoffConfig, EVENT_CHANNEL_CAPACITY, EngineConfig, HealingConfig};
use relaynet_transport::{ListenerConfig, TcpLinkConfig};

use crate::error::{NodeError, NodeResult};
use crate::generator::GeneratorConfig;

/// Configuration for a RelayNode
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// This node's name
    pub self_name: String,
    /// Direct neighbors, in the order reroutes try them
    pub peers: Vec<Peer>,
    /// Static routes
    pub routes: Vec<Route>,
    /// Destinations the traffic generator sends to
    pub destinations: Vec<String>,
    /// Inbound listener configuration
    pub listener: ListenerConfig,
    /// Outbound link configuration
    pub link: TcpLinkConfig,
    /// Per-peer backoff tuning
    pub backoff: BackoffConfig,
    /// Healing loop tuning
    pub healing: HealingConfig,
    /// Traffic generator tuning
    pub generator: GeneratorConfig,
    /// Extra direct attempts
    pub retries_direct: u32,
    /// Extra table-route attempts
    pub retries_route: u32,
    /// Extra attempts per reroute candidate
    pub retries_reroute: u32,
    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("localhost")
    }
}

impl NodeConfig {
    /// Create a configuration for a node called `self_name`
    pub fn new(self_name: impl Into<String>) -> Self {
        Self {
            self_name: self_name.into(),
            peers: Vec::new(),
            routes: Vec::new(),
            destinations: Vec::new(),
            listener: ListenerConfig::default(),
            link: TcpLinkConfig::default(),
            backoff: BackoffConfig::default(),
            healing: HealingConfig::default(),
            generator: GeneratorConfig::default(),
            retries_direct: 1,
            retries_route: 1,
            retries_reroute: 0,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Set the neighbors
    pub fn with_peers(mut self, peers: Vec<Peer>) -> Self {
        self.peers = peers;
        self
    }

    /// Set the static routes
    pub fn with_routes(mut self, routes: Vec<Route>) -> Self {
        self.routes = routes;
        self
    }

    /// Set the generator destinations
    pub fn with_destinations(mut self, destinations: Vec<String>) -> Self {
        self.destinations = destinations;
        self
    }

    /// Parse neighbors, routes and destinations from their list forms
    pub fn with_topology(mut self, peers: &str, routes: &str, destinations: &str) -> NodeResult<Self> {
        self.peers = parse_peers(peers)?;
        self.routes = parse_routes(routes)?;
        self.destinations = parse_destinations(destinations);
        Ok(self)
    }

    /// Set the listen address
    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.listener.host = host.into();
        self.listener.port = port;
        self
    }

    /// Set the outbound link configuration
    pub fn with_link(mut self, link: TcpLinkConfig) -> Self {
        self.link = link;
        self
    }

    /// Set the backoff tuning
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the healing tuning
    pub fn with_healing(mut self, healing: HealingConfig) -> Self {
        self.healing = healing;
        self
    }

    /// Set the generator tuning
    pub fn with_generator(mut self, generator: GeneratorConfig) -> Self {
        self.generator = generator;
        self
    }

    /// Set the retry budgets of the three forwarding steps
    pub fn with_retries(mut self, direct: u32, route: u32, reroute: u32) -> Self {
        self.retries_direct = direct;
        self.retries_route = route;
        self.retries_reroute = reroute;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Forwarding engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.self_name.clone()).with_retries(
            self.retries_direct,
            self.retries_route,
            self.retries_reroute,
        )
    }

    /// Check values that the individual layers cannot check on their own
    pub fn validate(&self) -> NodeResult<()> {
        if self.self_name.trim().is_empty() {
            return Err(NodeError::InvalidSetting {
                name: "self_name",
                reason: "must not be empty".into(),
            });
        }
        if self.link.connect_timeout.is_zero() {
            return Err(NodeError::InvalidSetting {
                name: "connect_timeout",
                reason: "must be positive".into(),
            });
        }
        if self.healing.interval.is_zero() {
            return Err(NodeError::InvalidSetting {
                name: "heal_interval",
                reason: "must be positive".into(),
            });
        }
        if self.event_channel_capacity == 0 {
            return Err(NodeError::InvalidSetting {
                name: "event_channel_capacity",
                reason: "must be positive".into(),
            });
        }
        self.backoff.validate()?;
        Ok(())
    }
}

/// Parse a number of seconds (fractions allowed) into a duration
pub fn parse_secs(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("'{value}' is not a valid duration"))
}
