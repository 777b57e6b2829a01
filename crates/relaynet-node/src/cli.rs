//! Command line and environment configuration
//!
//! Every setting can be given as a flag or through the environment variable
//! of the same name in upper case, which is how container deployments
//! configure a node.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use relaynet_logging::{LogConfig, LogFormat};
use relaynet_routing::{BackoffConfig, HealingConfig};
use relaynet_transport::TcpLinkConfig;

use crate::config::{NodeConfig, parse_secs};
use crate::error::NodeResult;
use crate::generator::GeneratorConfig;

/// Relay node command line
#[derive(Debug, Parser)]
#[command(name = "relaynet-node", version, about = "Store-and-forward TCP relay node")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Name of this node (defaults to the hostname)
    #[arg(long, env = "SELF_NAME")]
    pub self_name: Option<String>,

    /// Direct neighbors as name:port,...
    #[arg(long, env = "PEERS", default_value = "")]
    pub peers: String,

    /// Destinations the traffic generator sends to
    #[arg(long, env = "DESTINATIONS")]
    pub destinations: Option<String>,

    #[arg(long, env = "DESTINOS", hide = true)]
    pub destinos: Option<String>,

    /// Static routes as destination:next_hop:port,...
    #[arg(long, env = "ROUTES", default_value = "")]
    pub routes: String,

    /// Bound on one outbound attempt, in seconds
    #[arg(long, env = "CONNECT_TIMEOUT", default_value = "5", value_parser = parse_secs)]
    pub connect_timeout: Duration,

    /// Extra direct attempts
    #[arg(long, env = "RETRIES_DIRECT", default_value_t = 1)]
    pub retries_direct: u32,

    /// Extra table-route attempts
    #[arg(long, env = "RETRIES_ROUTE", default_value_t = 1)]
    pub retries_route: u32,

    /// Extra attempts per reroute candidate
    #[arg(long, env = "RETRIES_REROUTE")]
    pub retries_reroute: Option<u32>,

    #[arg(long, env = "RETRIES_BROAD", hide = true)]
    pub retries_broad: Option<u32>,

    /// First backoff cooldown, in seconds
    #[arg(long, env = "BACKOFF_BASE", default_value = "1.0", value_parser = parse_secs)]
    pub backoff_base: Duration,

    /// Longest backoff cooldown, in seconds
    #[arg(long, env = "BACKOFF_MAX", default_value = "10.0", value_parser = parse_secs)]
    pub backoff_max: Duration,

    /// Random backoff slack as a fraction of the cooldown
    #[arg(long, env = "BACKOFF_JITTER", default_value_t = 0.25)]
    pub backoff_jitter: f64,

    /// Time between generator rounds, in seconds
    #[arg(long, env = "CLIENT_INTERVAL", default_value = "5", value_parser = parse_secs)]
    pub client_interval: Duration,

    /// Jitter on the generator interval, in seconds
    #[arg(long, env = "CLIENT_JITTER", default_value = "1.0", value_parser = parse_secs)]
    pub client_jitter: Duration,

    /// Delay before the first generator round, in seconds
    #[arg(long, env = "CLIENT_STARTUP_DELAY", default_value = "2", value_parser = parse_secs)]
    pub client_startup_delay: Duration,

    /// Generator pause when there are no destinations, in seconds
    #[arg(long, env = "IDLE_SLEEP", default_value = "1.0", value_parser = parse_secs)]
    pub idle_sleep: Duration,

    /// Padding bytes in generated payloads
    #[arg(long, env = "PAYLOAD_SIZE", default_value_t = 0)]
    pub payload_size: usize,

    /// Time between healing passes, in seconds
    #[arg(long, env = "HEAL_INTERVAL", default_value = "30", value_parser = parse_secs)]
    pub heal_interval: Duration,

    /// Connect timeout of a healing probe, in seconds
    #[arg(long, env = "PROBE_TIMEOUT", default_value = "2", value_parser = parse_secs)]
    pub probe_timeout: Duration,

    /// Wait for an acknowledgment line after each send
    #[arg(long, env = "EXPECT_ACK", default_value = "false", value_parser = BoolishValueParser::new())]
    pub expect_ack: bool,

    /// Inbound connections handled concurrently
    #[arg(long, env = "MAX_INFLIGHT", default_value_t = 256)]
    pub max_inflight: usize,

    /// Dial every peer at this host instead of its name
    #[arg(long, env = "DIAL_HOST")]
    pub dial_host: Option<String>,

    /// Default log level (RUST_LOG overrides it)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Console log format: json or pretty
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,

    /// Mirror logs into this file
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Node name, falling back to the hostname
    pub fn self_name(&self) -> String {
        self.self_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(hostname)
    }

    /// Build the node configuration
    pub fn node_config(&self) -> NodeResult<NodeConfig> {
        let destinations = self
            .destinations
            .as_deref()
            .or(self.destinos.as_deref())
            .unwrap_or("");
        let retries_reroute = self.retries_reroute.or(self.retries_broad).unwrap_or(0);

        let mut config = NodeConfig::new(self.self_name())
            .with_topology(&self.peers, &self.routes, destinations)?
            .with_listen(self.host.clone(), self.port)
            .with_link(TcpLinkConfig {
                connect_timeout: self.connect_timeout,
                expect_ack: self.expect_ack,
                dial_host: self.dial_host.clone(),
                ..TcpLinkConfig::default()
            })
            .with_backoff(BackoffConfig {
                base: self.backoff_base,
                max: self.backoff_max,
                jitter: self.backoff_jitter,
            })
            .with_healing(HealingConfig {
                interval: self.heal_interval,
                probe_timeout: self.probe_timeout,
            })
            .with_generator(GeneratorConfig {
                interval: self.client_interval,
                jitter: self.client_jitter,
                startup_delay: self.client_startup_delay,
                idle_sleep: self.idle_sleep,
                payload_size: self.payload_size,
            })
            .with_retries(self.retries_direct, self.retries_route, retries_reroute);
        config.listener.max_inflight = self.max_inflight;

        config.validate()?;
        Ok(config)
    }

    /// Build the logging configuration
    pub fn log_config(&self) -> LogConfig {
        let config = LogConfig::default()
            .with_level(self.log_level.clone())
            .with_format(self.log_format);
        match &self.log_file {
            Some(path) => config.with_file_path(path),
            None => config,
        }
    }
}

/// Hostname of this machine, as containers and shells expose it
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
