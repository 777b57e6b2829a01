//! Traffic generator
//!
//! Originates one message toward every configured destination per round,
//! then sleeps for the configured interval plus or minus a uniform jitter.
//! It is a plain caller of [`ForwardingEngine::originate`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use relaynet_routing::ForwardingEngine;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info};

/// Shortest pause between rounds
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Generator tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Nominal time between rounds
    pub interval: Duration,
    /// Uniform jitter applied to `interval` in both directions
    pub jitter: Duration,
    /// Delay before the first round
    pub startup_delay: Duration,
    /// Pause when there is nothing to send
    pub idle_sleep: Duration,
    /// Padding bytes added to each payload (0 sends plain text)
    pub payload_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            jitter: Duration::from_secs(1),
            startup_delay: Duration::from_secs(2),
            idle_sleep: Duration::from_secs(1),
            payload_size: 0,
        }
    }
}

impl GeneratorConfig {
    /// Draw the pause before the next round
    pub fn next_interval(&self) -> Duration {
        let jitter = self.jitter.as_secs_f64();
        let offset = if jitter > 0.0 {
            rand::rng().random_range(-jitter..=jitter)
        } else {
            0.0
        };
        let secs = self.interval.as_secs_f64() + offset;
        Duration::try_from_secs_f64(secs)
            .unwrap_or(Duration::ZERO)
            .max(MIN_INTERVAL)
    }
}

/// Payload originated by this node toward `destination`
pub fn payload_for(source: &str, destination: &str, padding: usize) -> Value {
    let text = format!("Hello from {source} to {destination}");
    if padding == 0 {
        Value::String(text)
    } else {
        json!({ "text": text, "blob": "B".repeat(padding) })
    }
}

/// Background task originating periodic traffic
pub struct TrafficGenerator {
    config: GeneratorConfig,
    destinations: Vec<String>,
    engine: Arc<ForwardingEngine>,
}

impl TrafficGenerator {
    /// Create a generator for `destinations`
    pub fn new(config: GeneratorConfig, destinations: Vec<String>, engine: Arc<ForwardingEngine>) -> Self {
        Self {
            config,
            destinations,
            engine,
        }
    }

    /// Spawn the generator as a background task
    ///
    /// The task stays in the span current at the call.
    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(
            async move {
                self.run(shutdown_rx).await;
            }
            .in_current_span(),
        )
    }

    /// Originate one message to every destination
    ///
    /// Returns how many were accepted by a next hop or delivered locally.
    pub async fn round(&self) -> usize {
        let mut succeeded = 0;
        for destination in &self.destinations {
            let payload = payload_for(
                self.engine.self_name(),
                destination,
                self.config.payload_size,
            );
            let (envelope, outcome) = self.engine.originate(destination, payload).await;
            debug!(envelope_id = %envelope.id, destination, ?outcome, "Generated message");
            if outcome.is_success() {
                succeeded += 1;
            }
        }
        succeeded
    }

    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            destinations = ?self.destinations,
            interval_ms = self.config.interval.as_millis() as u64,
            "Traffic generator started"
        );

        let mut pause = self.config.startup_delay;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(pause) => {}
            }

            if self.destinations.is_empty() {
                pause = self.config.idle_sleep;
                continue;
            }

            pause = self.config.next_interval();
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = self.round() => {}
            }
        }

        info!("Traffic generator stopped");
    }
}
