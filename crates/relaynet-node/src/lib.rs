//! # Relaynet Node
//!
//! Runtime of one relay node. [`RelayNode`] wires together:
//! - the topology store and per-peer backoff tracker
//! - the TCP peer link and the forwarding engine
//! - the inbound listener, the healing loop and the traffic generator
//!
//! ## Example
//!
//! ```rust,ignore
//! use relaynet_node::{NodeConfig, RelayNode};
//!
//! let config = NodeConfig::new("A").with_topology("B:5001", "", "C")?;
//! let node = RelayNode::new(config)?;
//! node.start().await?;
//!
//! let mut events = node.events();
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.kind());
//! }
//! ```

pub mod cli;
mod config;
mod error;
pub mod generator;

pub use cli::Cli;
pub use config::{NodeConfig, parse_secs};
pub use error::{NodeError, NodeResult};
pub use generator::{GeneratorConfig, TrafficGenerator};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relaynet_core::{Envelope, RelayEvent};
use relaynet_routing::{
    BackoffTracker, EventEmitter, ForwardOutcome, ForwardingEngine, HealingLoop, TopologyStore,
    TrackedLink,
};
use relaynet_transport::{InboundListener, TcpPeerLink};
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, info, instrument};

/// One relay node
///
/// Creating a node only builds its state. [`start`](Self::start) binds the
/// listener and spawns the background tasks; [`stop`](Self::stop) signals
/// them and waits for them to finish.
pub struct RelayNode {
    /// Node configuration
    config: NodeConfig,
    /// Neighbors and routes
    topology: Arc<TopologyStore>,
    /// Per-peer cooldowns
    backoff: Arc<BackoffTracker>,
    /// Forwarding logic shared with the listener and generator
    engine: Arc<ForwardingEngine>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: RwLock<Vec<JoinHandle<()>>>,
    /// Address the listener is bound to (None until started)
    local_addr: RwLock<Option<SocketAddr>>,
    /// Whether the node has been started
    started: AtomicBool,
    /// Root span of every task this node runs
    span: Span,
}

impl RelayNode {
    /// Create a new node
    ///
    /// Fails when the static topology is inconsistent or a setting is out of
    /// range.
    #[instrument(skip(config), fields(node = %config.self_name))]
    pub fn new(config: NodeConfig) -> NodeResult<Self> {
        config.validate()?;

        let topology = Arc::new(TopologyStore::new(
            config.peers.clone(),
            config.destinations.clone(),
            config.routes.clone(),
        )?);
        let backoff = Arc::new(BackoffTracker::new(config.backoff));
        let events = Arc::new(EventEmitter::with_capacity(
            config.self_name.clone(),
            config.event_channel_capacity,
        ));
        let link = TrackedLink::new(
            Arc::new(TcpPeerLink::new(config.link.clone())),
            backoff.clone(),
        );
        let engine = Arc::new(ForwardingEngine::new(
            config.engine_config(),
            topology.clone(),
            link,
            events,
        ));

        let (shutdown_tx, _) = broadcast::channel(1);
        let span = relaynet_logging::node_span(&config.self_name);

        info!(
            peers = topology.neighbors().len(),
            routes = topology.len(),
            destinations = ?config.destinations,
            "Node created"
        );

        Ok(Self {
            config,
            topology,
            backoff,
            engine,
            shutdown_tx,
            background_tasks: RwLock::new(Vec::new()),
            local_addr: RwLock::new(None),
            started: AtomicBool::new(false),
            span,
        })
    }

    /// Start the node
    ///
    /// Binds the listener, then spawns the accept loop, the healing loop and
    /// the traffic generator.
    #[instrument(skip(self), fields(node = %self.config.self_name))]
    pub async fn start(&self) -> NodeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(NodeError::AlreadyStarted);
        }

        let listener = match InboundListener::bind(self.config.listener.clone(), self.engine.clone())
            .instrument(self.span.clone())
            .await
        {
            Ok(listener) => listener,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        *self.local_addr.write().await = listener.local_addr().ok();

        let spawned = self.span.in_scope(|| {
            let listener_task = listener.spawn(self.shutdown_tx.subscribe());

            let healing_task = HealingLoop::new(
                self.config.healing,
                self.topology.clone(),
                self.engine.link().clone(),
                self.engine.events().clone(),
            )
            .spawn(self.shutdown_tx.subscribe());

            let generator_task = TrafficGenerator::new(
                self.config.generator,
                self.config.destinations.clone(),
                self.engine.clone(),
            )
            .spawn(self.shutdown_tx.subscribe());

            [listener_task, healing_task, generator_task]
        });
        self.background_tasks.write().await.extend(spawned);

        info!(addr = ?self.local_addr().await, "Node started");
        Ok(())
    }

    /// Stop the node
    #[instrument(skip(self), fields(node = %self.config.self_name))]
    pub async fn stop(&self) -> NodeResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(());

        let mut tasks = self.background_tasks.write().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        *self.local_addr.write().await = None;

        info!("Node stopped");
        Ok(())
    }

    /// Whether the node is running
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Originate one message toward `destination`
    ///
    /// Does not require the node to be started.
    pub async fn send(&self, destination: &str, payload: Value) -> (Envelope, ForwardOutcome) {
        self.engine
            .originate(destination, payload)
            .instrument(self.span.clone())
            .await
    }

    /// Subscribe to this node's relay events
    pub fn events(&self) -> broadcast::Receiver<RelayEvent> {
        self.engine.events().subscribe()
    }

    /// This node's name
    pub fn self_name(&self) -> &str {
        &self.config.self_name
    }

    /// Node configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Address the listener is bound to, once started
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    /// The topology store
    pub fn topology(&self) -> &Arc<TopologyStore> {
        &self.topology
    }

    /// The backoff tracker
    pub fn backoff(&self) -> &Arc<BackoffTracker> {
        &self.backoff
    }

    /// The forwarding engine
    pub fn engine(&self) -> &Arc<ForwardingEngine> {
        &self.engine
    }

    /// Root span of this node's tasks
    ///
    /// Log lines written inside it carry the node name and instance id.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaynet_core::{ConfigError, Peer};
    use serde_json::json;

    fn local_config(name: &str) -> NodeConfig {
        NodeConfig::new(name).with_listen("127.0.0.1", 0)
    }

    #[tokio::test]
    async fn test_node_lifecycle() {
        let node = RelayNode::new(local_config("A")).unwrap();
        assert!(!node.is_started());
        assert!(node.local_addr().await.is_none());

        node.start().await.unwrap();
        assert!(node.is_started());
        assert!(node.local_addr().await.unwrap().port() > 0);

        assert!(matches!(node.start().await, Err(NodeError::AlreadyStarted)));

        node.stop().await.unwrap();
        assert!(!node.is_started());
        // stopping twice is fine
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_inconsistent_topology_is_rejected() {
        let config = local_config("A")
            .with_peers(vec![Peer::new("B", 1)])
            .with_routes(vec![relaynet_core::Route::new("X", Peer::new("Q", 1))]);
        assert!(matches!(
            RelayNode::new(config),
            Err(NodeError::Config(ConfigError::UnknownNextHop { .. }))
        ));
    }

    #[tokio::test]
    async fn test_send_to_self_delivers() {
        let node = RelayNode::new(local_config("A")).unwrap();
        let mut events = node.events();

        let (envelope, outcome) = node.send("A", json!("loopback")).await;
        assert_eq!(outcome, ForwardOutcome::Delivered);
        assert_eq!(envelope.route, vec!["A"]);

        assert!(matches!(events.try_recv(), Ok(RelayEvent::MessageOriginated { .. })));
        assert!(matches!(events.try_recv(), Ok(RelayEvent::Delivered { .. })));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_background_tasks_log_as_their_node() {
        use tracing_subscriber::layer::SubscriberExt;

        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::registry().with(relaynet_logging::jsonl_layer(
            move || writer.clone(),
            &relaynet_logging::JsonlConfig::default(),
        ));
        // current-thread runtime: spawned tasks run on this thread
        let _default = tracing::subscriber::set_default(subscriber);

        let node = RelayNode::new(local_config("A")).unwrap();
        node.start().await.unwrap();
        node.send("A", json!("loopback")).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        node.stop().await.unwrap();

        let output = String::from_utf8(capture.0.lock().clone()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        for message in ["Inbound listener started", "Healing loop started", "Delivered to A"] {
            let line = lines
                .iter()
                .find(|line| line["message"] == message)
                .unwrap_or_else(|| panic!("no '{message}' line in {output}"));
            assert_eq!(line["spans"][0]["name"], "node", "{message}");
            assert_eq!(line["spans"][0]["node"], "A", "{message}");
        }
    }

    #[tokio::test]
    async fn test_send_without_neighbors_fails() {
        let node = RelayNode::new(local_config("A")).unwrap();
        let (envelope, outcome) = node.send("Z", json!("x")).await;
        assert_eq!(outcome, ForwardOutcome::Failed);
        assert_eq!(envelope.status, relaynet_core::EnvelopeStatus::Failed);
    }
}
