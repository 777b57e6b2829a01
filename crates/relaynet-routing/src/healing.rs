//! Route healing
//!
//! Reroutes overwrite static routes, and nothing else would ever put them
//! back. The [`HealingLoop`] periodically probes the original next hop of
//! every overridden route and restores the static route once that hop
//! accepts connections again.

use std::sync::Arc;
use std::time::Duration;

use relaynet_core::{RelayEvent, RouteOrigin};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info};

use crate::events::EventEmitter;
use crate::link::TrackedLink;
use crate::topology::TopologyStore;

/// Healing tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealingConfig {
    /// Time between healing passes
    pub interval: Duration,
    /// Connect timeout for each probe
    pub probe_timeout: Duration,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

/// Background task restoring static routes
pub struct HealingLoop {
    config: HealingConfig,
    topology: Arc<TopologyStore>,
    link: TrackedLink,
    events: Arc<EventEmitter>,
}

impl HealingLoop {
    /// Create a healing loop
    pub fn new(
        config: HealingConfig,
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

    /// Spawn the loop as a background task
    ///
    /// The first pass runs one interval after spawning.
    /// The task stays in the span current at the call.
    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                self.run(shutdown_rx).await;
            }
            .in_current_span(),
        )
    }

    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Healing loop started"
        );

        let start = Instant::now() + self.config.interval;
        let mut interval = tokio::time::interval_at(start, self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Healing loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let healed = self.heal_once().await;
                    if healed > 0 {
                        debug!(healed, "Healing pass restored routes");
                    }
                }
            }
        }
    }

    /// Run one healing pass, returning the number of routes restored
    pub async fn heal_once(&self) -> usize {
        let mut healed = 0;

        for route in self.topology.overridden_routes() {
            self.events.emit(RelayEvent::heal_probe(
                route.destination.clone(),
                route.original.name.clone(),
                route.current.name.clone(),
            ));

            if !self
                .link
                .probe(&route.original, self.config.probe_timeout)
                .await
            {
                continue;
            }

            self.topology.set_route(
                &route.destination,
                route.original.clone(),
                RouteOrigin::Healed,
            );
            self.events.emit(RelayEvent::route_healed(
                route.destination,
                route.original.name,
                route.current.name,
            ));
            healed += 1;
        }

        healed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffTracker;
    use relaynet_core::{MockPeerLink, Peer, Route};

    fn setup() -> (Arc<MockPeerLink>, Arc<TopologyStore>, HealingLoop) {
        let topology = Arc::new(
            TopologyStore::new(
                vec![Peer::new("Y", 5001), Peer::new("Z", 5002)],
                vec![],
                vec![Route::new("X", Peer::new("Y", 5001))],
            )
            .unwrap(),
        );
        let mock = Arc::new(MockPeerLink::new());
        let link = TrackedLink::new(mock.clone(), Arc::new(BackoffTracker::default()));
        let healing = HealingLoop::new(
            HealingConfig::default(),
            topology.clone(),
            link,
            Arc::new(EventEmitter::new("A")),
        );
        (mock, topology, healing)
    }

    #[tokio::test]
    async fn test_nothing_to_heal() {
        let (mock, _topology, healing) = setup();
        assert_eq!(healing.heal_once().await, 0);
        assert_eq!(mock.probes_to("Y"), 0);
    }

    #[tokio::test]
    async fn test_heals_when_original_returns() {
        let (mock, topology, healing) = setup();
        let mut events = healing.events.subscribe();
        topology.set_route("X", Peer::new("Z", 5002), RouteOrigin::Learned);

        mock.set_reachable("Y", false);
        assert_eq!(healing.heal_once().await, 0);
        assert_eq!(topology.route_for("X").unwrap().next_hop.name, "Z");

        mock.set_reachable("Y", true);
        assert_eq!(healing.heal_once().await, 1);

        let route = topology.route_for("X").unwrap();
        assert_eq!(route.next_hop.name, "Y");
        assert_eq!(route.origin, RouteOrigin::Healed);
        assert_eq!(mock.probes_to("Y"), 2);
        // probing never sends data
        assert!(mock.attempts().is_empty());

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, ["healing_check", "healing_check", "route_healed"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_heals_within_one_interval() {
        let (mock, topology, healing) = setup();
        topology.set_route("X", Peer::new("Z", 5002), RouteOrigin::Learned);
        mock.set_reachable("Y", true);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = healing.spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(topology.route_for("X").unwrap().next_hop.name, "Z");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(topology.route_for("X").unwrap().next_hop.name, "Y");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
