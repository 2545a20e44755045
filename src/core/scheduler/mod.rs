// src/core/scheduler/mod.rs

//! The cooperative scheduler: a single task runs every periodic job on one
//! `tokio::select!` loop over several `tokio::time::interval`s plus the
//! shutdown signal. A failing task logs and yields to the next tick; it
//! never kills the scheduler.

use crate::config::TimeseriesRetentionConfig;
use crate::core::listener::ListenerFabric;
use crate::core::queue::MessageQueue;
use crate::core::sink::{EventSink, EVENT_SYSTEM_STATUS};
use crate::core::storage::Storage;
use crate::core::timeseries::{TimeseriesPruner, TimeseriesWriter};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::time::{self, Interval};
use tracing::{error, info};

/// Message save/alert retention settings the scheduler's prune task needs.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerRetention {
    pub message_save_days: u32,
    pub alert_save_days: u32,
    pub timeseries_prune_period: Duration,
}

pub struct Scheduler {
    storage: Storage,
    queue: MessageQueue,
    fabric: Arc<ListenerFabric>,
    sink: Arc<dyn EventSink>,
    retention: SchedulerRetention,
    timeseries_writer: tokio::sync::Mutex<TimeseriesWriter>,
    timeseries_pruner: TimeseriesPruner,
}

/// Builds the `system_status` event body from a live queue and fabric
/// snapshot. Shared by the scheduler's periodic tick and the orchestrator's
/// per-transition emission, so both report the same shape.
pub fn status_payload(queue: &MessageQueue, fabric: &ListenerFabric) -> serde_json::Value {
    let stats = queue.snapshot_statistics();
    let listener_stats = fabric.stats();
    json!({
        "queue_length": stats.length,
        "overflow_count": stats.overflow_count,
        "listeners": listener_stats.iter().map(|s| json!({
            "kind": s.kind.tag(),
            "transport": s.transport.to_string(),
            "endpoint": s.endpoint,
            "connected": s.connected,
            "frames_received": s.frames_received,
        })).collect::<Vec<_>>(),
    })
}

/// Builds an interval that first fires aligned to `second_of_minute`
/// within the current minute, then repeats every `period`.
fn aligned_interval(period: Duration, second_of_minute: u64) -> Interval {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let current_second = now.as_secs() % 60;
    let delay = if current_second <= second_of_minute {
        second_of_minute - current_second
    } else {
        60 - current_second + second_of_minute
    };
    let start = time::Instant::now() + Duration::from_secs(delay);
    time::interval_at(start, period)
}

impl Scheduler {
    pub fn new(
        storage: Storage,
        queue: MessageQueue,
        fabric: Arc<ListenerFabric>,
        sink: Arc<dyn EventSink>,
        retention: SchedulerRetention,
        timeseries_retention: TimeseriesRetentionConfig,
    ) -> Self {
        let timeseries_writer = TimeseriesWriter::new(storage.clone(), queue.clone());
        let timeseries_pruner = TimeseriesPruner::new(storage.clone(), timeseries_retention);
        Self {
            storage,
            queue,
            fabric,
            sink,
            retention,
            timeseries_writer: tokio::sync::Mutex::new(timeseries_writer),
            timeseries_pruner,
        }
    }

    /// Runs every periodic task on one cooperative loop until `shutdown`
    /// fires. Each branch is independent: a panic-free failure in one task
    /// logs and the loop continues waiting on the next tick of any task.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut status_tick = time::interval(Duration::from_secs(30));
        let mut prune_tick = aligned_interval(Duration::from_secs(60), 30);
        let mut merge_tick = time::interval(Duration::from_secs(5 * 60));
        let mut optimize_tick = time::interval(Duration::from_secs(6 * 3600));
        let mut health_tick = aligned_interval(Duration::from_secs(60), 45);
        let mut timeseries_prune_tick = time::interval(self.retention.timeseries_prune_period);
        let mut timeseries_write_tick = time::interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                _ = status_tick.tick() => self.broadcast_status().await,
                _ = prune_tick.tick() => self.prune_database().await,
                _ = merge_tick.tick() => self.storage.optimize_merge(2).await,
                _ = optimize_tick.tick() => self.storage.optimize_regular().await,
                _ = health_tick.tick() => self.health_check().await,
                _ = timeseries_prune_tick.tick() => self.timeseries_pruner.prune_tick().await,
                _ = timeseries_write_tick.tick() => self.timeseries_writer.lock().await.write_tick().await,
                _ = shutdown.recv() => {
                    info!("scheduler: shutdown received, stopping");
                    return;
                }
            }
        }
    }

    async fn broadcast_status(&self) {
        self.sink.emit(EVENT_SYSTEM_STATUS, status_payload(&self.queue, &self.fabric));
    }

    async fn prune_database(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        match self
            .storage
            .prune_database(self.retention.message_save_days, self.retention.alert_save_days, now)
            .await
        {
            Ok((pruned_messages, pruned_alerts)) => {
                info!("scheduler: pruned {pruned_messages} messages, {pruned_alerts} alert matches");
            }
            Err(e) => error!("scheduler: prune task failed: {e}"),
        }
    }

    async fn health_check(&self) {
        for stats in self.fabric.stats() {
            if !stats.connected {
                error!(
                    "scheduler: listener health check: {} {} is disconnected",
                    stats.kind, stats.endpoint
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aligned_interval_never_panics_at_either_edge_of_the_minute() {
        let _ = aligned_interval(Duration::from_secs(60), 0);
        let _ = aligned_interval(Duration::from_secs(60), 59);
    }
}
