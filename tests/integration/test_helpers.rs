// tests/integration/test_helpers.rs

//! Shared fixture for driving a full `Orchestrator` instance against a
//! real (temp-file) SQLite database and a recording sink.

use acarshub_core::config::Config;
use acarshub_core::core::sink::RecordingSink;
use acarshub_core::core::Orchestrator;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

pub struct TestContext {
    pub orchestrator: Orchestrator,
    pub sink: Arc<RecordingSink>,
    _dir: tempfile::TempDir,
}

impl TestContext {
    /// Builds an orchestrator with no configured decoders (so no real
    /// listener tries to bind a socket) over a fresh on-disk database.
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        let dir = tempfile::tempdir().unwrap();
        config.database_path = dir.path().join("acarshub-test.db").display().to_string();

        let sink = Arc::new(RecordingSink::default());
        let orchestrator = Orchestrator::initialize(&config, sink.clone(), None).await.unwrap();
        orchestrator.start().await;

        Self {
            orchestrator,
            sink,
            _dir: dir,
        }
    }

    /// Pushes a raw payload directly onto the queue, as a listener would,
    /// and waits for the processor to consume it.
    pub async fn ingest(&self, kind: acarshub_core::config::DecoderKind, payload: serde_json::Value) {
        self.orchestrator.handle().queue.push(kind, payload, 0);
        self.wait_for_events(1).await;
    }

    /// Polls the recording sink until at least `count` events have been
    /// emitted, or a short timeout elapses.
    pub async fn wait_for_events(&self, count: usize) {
        for _ in 0..200 {
            if self.sink.events.lock().len() >= count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }
}
