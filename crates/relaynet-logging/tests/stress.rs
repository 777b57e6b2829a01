//! Stress tests for node identity in log output
//!
//! Many nodes can share one process, and their tasks hop between tokio
//! worker threads. Every line must still name the node that wrote it.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use relaynet_logging::{JsonlConfig, jsonl_layer, node_span};
use serde_json::Value;
use tracing::Instrument;
use tracing::instrument::WithSubscriber;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_dispatch() -> (tracing::Dispatch, Capture) {
    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::registry()
        .with(jsonl_layer(move || writer.clone(), &JsonlConfig::default()));
    (tracing::Dispatch::new(subscriber), capture)
}

fn lines(capture: &Capture) -> Vec<Value> {
    String::from_utf8(capture.0.lock().clone())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_nodes_keep_their_identity() {
    const NODES: usize = 16;
    const LINES: usize = 50;

    let (dispatch, capture) = capture_dispatch();

    let mut handles = Vec::new();
    for n in 0..NODES {
        let node = format!("node-{n}");
        let span = tracing::dispatcher::with_default(&dispatch, || node_span(&node));

        let task = async move {
            for i in 0..LINES {
                tracing::info!(writer = %node, seq = i, "tick");
                tokio::task::yield_now().await;
            }
        }
        .instrument(span)
        .with_subscriber(dispatch.clone());
        handles.push(tokio::spawn(task));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let lines = lines(&capture);
    assert_eq!(lines.len(), NODES * LINES);

    let mut per_node: HashMap<String, usize> = HashMap::new();
    for line in &lines {
        assert_eq!(line["spans"][0]["node"], line["writer"], "line attributed to the wrong node: {line}");
        *per_node.entry(line["writer"].as_str().unwrap().to_string()).or_default() += 1;
    }
    assert_eq!(per_node.len(), NODES);
    assert!(per_node.values().all(|&count| count == LINES));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_instances_of_one_name_are_told_apart() {
    let (dispatch, capture) = capture_dispatch();

    for _ in 0..2 {
        let span = tracing::dispatcher::with_default(&dispatch, || node_span("A"));
        tokio::spawn(
            async {
                tracing::info!("started");
            }
            .instrument(span)
            .with_subscriber(dispatch.clone()),
        )
        .await
        .unwrap();
    }

    let lines = lines(&capture);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["spans"][0]["node"], "A");
    assert_eq!(lines[1]["spans"][0]["node"], "A");
    assert_ne!(lines[0]["spans"][0]["instance_id"], lines[1]["spans"][0]["instance_id"]);
}
