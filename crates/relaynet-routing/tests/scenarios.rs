//! Multi-node forwarding scenarios over an in-memory mesh
//!
//! Each node runs its own engine, topology and backoff tracker. The
//! `MeshLink` hands an envelope straight to the target node's engine, so
//! whole paths can be checked without sockets.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use relaynet_core::{
    Envelope, EnvelopeStatus, Peer, PeerLink, RelayEvent, Route, RouteOrigin, SendReport,
};
use relaynet_routing::{
    BackoffTracker, EngineConfig, EventEmitter, ForwardOutcome, ForwardingEngine, HealingConfig,
    HealingLoop, TopologyStore, TrackedLink,
};
use serde_json::json;

/// In-memory network joining a set of engines
#[derive(Default)]
struct Mesh {
    engines: DashMap<String, Weak<ForwardingEngine>>,
    /// Severed directed edges (from, to)
    severed: Mutex<HashSet<(String, String)>>,
    /// Nodes that are down
    down: Mutex<HashSet<String>>,
    /// Final state of every envelope per node (node, envelope, outcome)
    log: Mutex<Vec<(String, Envelope, ForwardOutcome)>>,
}

impl Mesh {
    fn sever(&self, a: &str, b: &str) {
        let mut severed = self.severed.lock();
        severed.insert((a.to_string(), b.to_string()));
        severed.insert((b.to_string(), a.to_string()));
    }

    fn set_down(&self, node: &str, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(node.to_string());
        } else {
            set.remove(node);
        }
    }

    fn reachable(&self, from: &str, to: &str) -> bool {
        !self.down.lock().contains(to)
            && !self.severed.lock().contains(&(from.to_string(), to.to_string()))
    }

    fn final_state_at(&self, node: &str) -> Vec<(Envelope, ForwardOutcome)> {
        self.log
            .lock()
            .iter()
            .filter(|(n, _, _)| n == node)
            .map(|(_, e, o)| (e.clone(), o.clone()))
            .collect()
    }
}

/// One node's view of the mesh
struct MeshLink {
    me: String,
    mesh: Arc<Mesh>,
}

#[async_trait]
impl PeerLink for MeshLink {
    async fn send(&self, peer: &Peer, envelope: &Envelope) -> SendReport {
        let target = self.mesh.engines.get(&peer.name).and_then(|e| e.upgrade());
        let Some(engine) = target.filter(|_| self.mesh.reachable(&self.me, &peer.name)) else {
            return SendReport::failed(Duration::ZERO);
        };

        let mut received = envelope.clone();
        let outcome = engine.dispatch(&mut received).await;
        self.mesh
            .log
            .lock()
            .push((peer.name.clone(), received, outcome));
        SendReport::delivered(1, Duration::ZERO)
    }

    async fn probe(&self, peer: &Peer, _timeout: Duration) -> bool {
        self.mesh.engines.contains_key(&peer.name) && self.mesh.reachable(&self.me, &peer.name)
    }
}

struct Node {
    engine: Arc<ForwardingEngine>,
    topology: Arc<TopologyStore>,
    link: TrackedLink,
}

fn node(mesh: &Arc<Mesh>, name: &str, neighbors: &[&str], routes: &[(&str, &str)]) -> Node {
    let port = |n: &str| 5000 + n.as_bytes()[0] as u16;
    let peers: Vec<Peer> = neighbors.iter().map(|n| Peer::new(*n, port(*n))).collect();
    let routes = routes
        .iter()
        .map(|(d, h)| Route::new(*d, Peer::new(*h, port(*h))))
        .collect();
    let topology = Arc::new(TopologyStore::new(peers, vec![], routes).unwrap());

    let raw = Arc::new(MeshLink {
        me: name.to_string(),
        mesh: mesh.clone(),
    });
    let link = TrackedLink::new(raw, Arc::new(BackoffTracker::default()));
    let engine = Arc::new(ForwardingEngine::new(
        EngineConfig::new(name).with_retry_pause(Duration::from_millis(10)),
        topology.clone(),
        link.clone(),
        Arc::new(EventEmitter::new(name)),
    ));
    mesh.engines
        .insert(name.to_string(), Arc::downgrade(&engine));

    Node {
        engine,
        topology,
        link,
    }
}

/// A - B - C line, no static routes anywhere
fn line(mesh: &Arc<Mesh>) -> (Node, Node, Node) {
    (
        node(mesh, "A", &["B"], &[]),
        node(mesh, "B", &["A", "C"], &[]),
        node(mesh, "C", &["B"], &[]),
    )
}

#[tokio::test(start_paused = true)]
async fn test_line_delivery_records_full_route() {
    let mesh = Arc::new(Mesh::default());
    let (a, _b, _c) = line(&mesh);

    // A has no route to C: the reroute scan finds B
    let (_, outcome) = a.engine.originate("C", json!("Hello from A to C")).await;
    assert!(matches!(outcome, ForwardOutcome::Forwarded { ref next_hop, .. } if next_hop == "B"));

    let at_c = mesh.final_state_at("C");
    assert_eq!(at_c.len(), 1);
    let (envelope, outcome) = &at_c[0];
    assert_eq!(*outcome, ForwardOutcome::Delivered);
    assert_eq!(envelope.status, EnvelopeStatus::Delivered);
    assert_eq!(envelope.route, vec!["A", "B", "C"]);
    assert_eq!(envelope.last_hop.as_deref(), Some("B"));

    // and A learned the way
    assert_eq!(a.topology.route_for("C").unwrap().next_hop.name, "B");
}

#[tokio::test(start_paused = true)]
async fn test_line_severed_fails_at_middle_node() {
    let mesh = Arc::new(Mesh::default());
    let (a, _b, _c) = line(&mesh);
    mesh.sever("B", "C");

    let (_, outcome) = a.engine.originate("C", json!("x")).await;
    // the first hop still succeeds
    assert!(outcome.is_success());

    let at_b = mesh.final_state_at("B");
    assert_eq!(at_b.len(), 1);
    let (envelope, outcome) = &at_b[0];
    assert_eq!(*outcome, ForwardOutcome::Failed);
    assert_eq!(envelope.status, EnvelopeStatus::Failed);
    assert_eq!(envelope.route, vec!["A", "B"]);

    // B never bounced the envelope back to A
    assert!(mesh.final_state_at("A").is_empty());
    assert!(mesh.final_state_at("C").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_static_route_down_reroutes_and_heals() {
    let mesh = Arc::new(Mesh::default());
    let a = node(&mesh, "A", &["Y", "Z"], &[("X", "Y")]);
    let _y = node(&mesh, "Y", &["A", "X"], &[]);
    let _z = node(&mesh, "Z", &["A", "X"], &[]);
    let _x = node(&mesh, "X", &["Y", "Z"], &[]);
    let mut events = a.engine.events().subscribe();

    mesh.set_down("Y", true);
    let (_, outcome) = a.engine.originate("X", json!("x")).await;
    assert!(matches!(
        outcome,
        ForwardOutcome::Forwarded { ref next_hop, .. } if next_hop == "Z"
    ));

    let (delivered, _) = &mesh.final_state_at("X")[0];
    assert_eq!(delivered.route, vec!["A", "Z", "X"]);

    let route = a.topology.route_for("X").unwrap();
    assert_eq!(route.next_hop.name, "Z");
    assert_eq!(route.origin, RouteOrigin::Learned);

    let mut saw_update = false;
    while let Ok(event) = events.try_recv() {
        if let RelayEvent::RouteUpdated { next_hop, .. } = event {
            assert_eq!(next_hop, "Z");
            saw_update = true;
        }
    }
    assert!(saw_update);

    // Y comes back: one healing pass restores the static route
    let healing = HealingLoop::new(
        HealingConfig::default(),
        a.topology.clone(),
        a.link.clone(),
        a.engine.events().clone(),
    );
    assert_eq!(healing.heal_once().await, 0);
    mesh.set_down("Y", false);
    assert_eq!(healing.heal_once().await, 1);
    assert_eq!(a.topology.route_for("X").unwrap().next_hop.name, "Y");
}

#[tokio::test(start_paused = true)]
async fn test_loop_through_sender_is_not_taken() {
    // A's route for X points through B, and B's route for X points back at A
    let mesh = Arc::new(Mesh::default());
    let a = node(&mesh, "A", &["B"], &[("X", "B")]);
    let _b = node(&mesh, "B", &["A"], &[("X", "A")]);

    let (_, outcome) = a.engine.originate("X", json!("x")).await;
    assert!(outcome.is_success());

    let (at_b, outcome) = &mesh.final_state_at("B")[0];
    assert_eq!(*outcome, ForwardOutcome::Failed);
    assert_eq!(at_b.route, vec!["A", "B"]);
    assert!(mesh.final_state_at("A").is_empty());
}
