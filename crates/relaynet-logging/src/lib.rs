//! Structured JSONL logging for relaynet nodes
//!
//! Every relay node logs through `tracing`. This crate wires the subscriber:
//!
//! - **JSONL output** to the console by default, one object per line
//! - **Pretty output** for local development
//! - **File mirror** with optional daily/hourly rotation via tracing-appender
//! - **Node identity**: lines logged inside a [`node_span`] carry the node
//!   name and instance id
//!
//! `RUST_LOG` always overrides the configured default level.
//!
//! ```ignore
//! use relaynet_logging::{LogConfig, RelaySubscriberBuilder};
//!
//! let _guard = RelaySubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, LogFormat, RotationStrategy};
pub use context::{node_span, node_span_with_instance};
pub use layers::jsonl_layer;
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unknown log format: {0} (expected json or pretty)")]
    InvalidFormat(String),

    #[error("Cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create rolling log appender: {0}")]
    Appender(#[from] InitError),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Boxed layer over the base registry
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and initializing the relaynet subscriber
pub struct RelaySubscriberBuilder {
    config: LogConfig,
}

impl RelaySubscriberBuilder {
    /// Create a builder with the default configuration (JSONL to console)
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Configuration the subscriber will be built from
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Build the output layers without installing them
    ///
    /// The returned guard flushes the file writer when dropped and must be
    /// kept alive as long as file output is wanted.
    pub fn build_layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LoggingError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            let console = match self.config.console.format {
                LogFormat::Json => jsonl_layer(std::io::stdout, &self.config.jsonl),
                LogFormat::Pretty => tracing_subscriber::fmt::layer()
                    .with_ansi(self.config.console.ansi)
                    .with_target(true)
                    .boxed(),
            };
            layers.push(console);
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(jsonl_layer(writer, &self.config.jsonl));
            guard = Some(file_guard);
        }

        Ok((layers, guard))
    }

    /// Install the subscriber globally
    ///
    /// Fails if a global subscriber is already set.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));
        let (layers, guard) = self.build_layers()?;

        tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init()?;

        Ok(guard)
    }
}

impl Default for RelaySubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn file_writer(
    config: &FileConfig,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let rotation = match config.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => {
            let path = config.path();
            let file = fs::create_dir_all(&config.directory)
                .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
                .map_err(|source| LoggingError::File { path, source })?;
            return Ok(tracing_appender::non_blocking(file));
        }
    };

    let appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Result<(), LoggingError> {
    RelaySubscriberBuilder::new().init().map(|_| ())
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Result<(), LoggingError> {
    RelaySubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Initialize logging for tests; repeated calls are ignored
pub fn init_testing() {
    let _ = RelaySubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
