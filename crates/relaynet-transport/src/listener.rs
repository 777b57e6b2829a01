//! Inbound listener
//!
//! Accepts TCP connections and turns each one into a single envelope for
//! the forwarding engine. Every connection runs in its own task; a
//! semaphore caps how many connections are being read at once and the
//! accept loop waits for a permit before accepting the next one. The permit
//! is released once the envelope is acked, so forwarding work never holds
//! up the accept loop.
//!
//! Nothing a remote peer sends can stop the accept loop: malformed frames
//! are rejected and logged, and transient accept errors are retried.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relaynet_core::{Ack, RelayEvent};
use relaynet_routing::ForwardingEngine;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, instrument, trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::protocol::{FramingError, MAX_FRAME_BYTES, frame_ack, read_envelope};

/// First delay between bind attempts
const BIND_RETRY_INITIAL: Duration = Duration::from_millis(500);

/// Longest delay between bind attempts
const BIND_RETRY_MAX: Duration = Duration::from_secs(5);

/// Pause after a failed accept
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Configuration for the inbound listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to bind
    pub host: String,
    /// Port to bind (0 picks a free port)
    pub port: u16,
    /// Connections read and acked concurrently
    pub max_inflight: usize,
    /// Largest accepted frame
    pub max_frame_bytes: usize,
    /// Bound on reading one frame from a connection
    pub read_timeout: Duration,
    /// Bind attempts before giving up
    pub bind_attempts: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_inflight: 256,
            max_frame_bytes: MAX_FRAME_BYTES,
            read_timeout: Duration::from_secs(5),
            bind_attempts: 20,
        }
    }
}

impl ListenerConfig {
    /// Bind address as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP accept loop feeding the forwarding engine
pub struct InboundListener {
    listener: TcpListener,
    config: ListenerConfig,
    engine: Arc<ForwardingEngine>,
    permits: Arc<Semaphore>,
}

impl InboundListener {
    /// Bind the listening socket, retrying with exponential delay
    pub async fn bind(config: ListenerConfig, engine: Arc<ForwardingEngine>) -> TransportResult<Self> {
        let listener = bind_with_retry(&config.bind_addr(), config.bind_attempts.max(1)).await?;
        let local_addr = listener.local_addr()?;

        engine
            .events()
            .emit(RelayEvent::server_started(local_addr.to_string()));

        Ok(Self {
            listener,
            permits: Arc::new(Semaphore::new(config.max_inflight.max(1))),
            config,
            engine,
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawn the accept loop as a background task
    ///
    /// The task, and every connection task it starts, stays in the span
    /// current at the call.
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
            addr = %self.config.bind_addr(),
            max_inflight = self.config.max_inflight,
            "Inbound listener started"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, remote) = tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                        continue;
                    }
                },
            };

            let engine = self.engine.clone();
            let config = self.config.clone();
            tokio::spawn(
                async move {
                    handle_connection(stream, remote, permit, &engine, &config).await;
                }
                .in_current_span(),
            );
        }

        info!("Inbound listener shutting down");
    }
}

async fn bind_with_retry(addr: &str, attempts: u32) -> TransportResult<TcpListener> {
    let mut delay = BIND_RETRY_INITIAL;
    let mut attempt = 1;

    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if attempt < attempts => {
                warn!(addr, attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "Bind failed, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(BIND_RETRY_MAX);
                attempt += 1;
            }
            Err(source) => {
                return Err(TransportError::Bind {
                    addr: addr.to_string(),
                    attempts,
                    source,
                });
            }
        }
    }
}

/// Read one envelope, acknowledge it and hand it to the engine
///
/// `permit` is held while reading and acking only.
#[instrument(skip_all, fields(remote = %remote))]
async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    permit: OwnedSemaphorePermit,
    engine: &ForwardingEngine,
    config: &ListenerConfig,
) {
    let mut reader = BufReader::new(stream);

    let read = tokio::time::timeout(
        config.read_timeout,
        read_envelope(&mut reader, config.max_frame_bytes),
    )
    .await
    .map_err(|_| TransportError::Timeout(config.read_timeout))
    .and_then(|r| r.map_err(TransportError::from));

    let mut stream = reader.into_inner();
    match read {
        Ok(mut envelope) => {
            trace!(envelope_id = %envelope.id, "Envelope received");
            let ack = Ack::accepted(envelope.id, engine.self_name());
            reply(&mut stream, &ack).await;
            drop(stream);
            drop(permit);

            engine.dispatch(&mut envelope).await;
        }
        // reachability probes connect and close without sending anything
        Err(TransportError::Framing(FramingError::Empty)) => {
            trace!("Connection closed without data");
        }
        Err(e) => {
            engine
                .events()
                .emit(RelayEvent::invalid_envelope(e.to_string()));
            reply(&mut stream, &Ack::rejected(e.to_string())).await;
        }
    }
}

/// Best-effort ack; senders that do not read it are not affected
async fn reply(stream: &mut TcpStream, ack: &Ack) {
    let Ok(line) = frame_ack(ack) else {
        return;
    };
    if let Err(e) = stream.write_all(&line).await {
        debug!(error = %e, "Ack not delivered");
        return;
    }
    let _ = stream.shutdown().await;
}
