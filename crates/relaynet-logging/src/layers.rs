//! Formatting layers for relaynet

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{Layer, registry::LookupSpan};

use crate::config::JsonlConfig;

/// JSONL formatting layer writing to `writer`
///
/// Each line holds the event fields, the current span and, with
/// `include_spans`, every enclosing span with its fields. A line logged
/// inside a [`node_span`](crate::node_span) therefore names its node.
pub fn jsonl_layer<S, W>(writer: W, config: &JsonlConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
        .boxed()
}
