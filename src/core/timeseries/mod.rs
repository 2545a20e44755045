// src/core/timeseries/mod.rs

//! The time-series writer and pruner: snapshots the queue's
//! last-minute counters at each minute boundary and appends one row per
//! active resolution on a fixed schedule; a separate pruner drops rows
//! older than each resolution's retention window.

use crate::config::TimeseriesRetentionConfig;
use crate::core::queue::MessageQueue;
use crate::core::storage::timeseries::{Resolution, TimeseriesCounts};
use crate::core::storage::Storage;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

pub struct TimeseriesWriter {
    storage: Storage,
    queue: MessageQueue,
    minute_tick: u64,
    hour_tick: u32,
}

impl TimeseriesWriter {
    pub fn new(storage: Storage, queue: MessageQueue) -> Self {
        Self {
            storage,
            queue,
            minute_tick: 0,
            hour_tick: 0,
        }
    }

    /// Called once per minute boundary. Always writes the 1-minute
    /// resolution; writes 5-minute/1-hour/6-hour resolutions only on their
    /// own cadence, measured in elapsed minutes since process start.
    pub async fn write_tick(&mut self) {
        let now = now_secs();
        let stats = self.queue.snapshot_statistics();
        let counts = counts_from_stats(&stats);

        self.write_resolution(Resolution::OneMinute, now, counts).await;

        self.minute_tick += 1;
        if self.minute_tick % 5 == 0 {
            self.write_resolution(Resolution::FiveMinute, now, counts).await;
        }
        if self.minute_tick % 60 == 0 {
            self.write_resolution(Resolution::OneHour, now, counts).await;
            self.hour_tick += 1;
        }
        if self.hour_tick > 0 && self.hour_tick % 6 == 0 && self.minute_tick % 60 == 0 {
            self.write_resolution(Resolution::SixHour, now, counts).await;
        }
    }

    async fn write_resolution(&self, resolution: Resolution, now: i64, counts: TimeseriesCounts) {
        let bucket = bucket_timestamp(resolution, now);
        if let Err(e) = self
            .storage
            .insert_timeseries_row(resolution, bucket, counts, now)
            .await
        {
            error!("failed to write {} timeseries row: {e}", resolution.tag());
        }
    }
}

fn counts_from_stats(stats: &crate::core::queue::QueueStatistics) -> TimeseriesCounts {
    use crate::config::DecoderKind;
    let get = |kind: DecoderKind| stats.per_kind.get(&kind).map(|c| c.total_last_minute as i64).unwrap_or(0);
    let get_err = |kind: DecoderKind| stats.per_kind.get(&kind).map(|c| c.errors_last_minute as i64).unwrap_or(0);

    let acars = get(DecoderKind::Acars);
    let vdlm = get(DecoderKind::Vdlm2);
    let hfdl = get(DecoderKind::Hfdl);
    let imsl = get(DecoderKind::Imsl);
    let irdm = get(DecoderKind::Irdm);
    let errors = DecoderKind::all().into_iter().map(get_err).sum();

    TimeseriesCounts {
        acars,
        vdlm,
        hfdl,
        imsl,
        irdm,
        total: acars + vdlm + hfdl + imsl + irdm,
        errors,
    }
}

fn bucket_timestamp(resolution: Resolution, now: i64) -> i64 {
    let bucket_secs = match resolution {
        Resolution::OneMinute => 60,
        Resolution::FiveMinute => 300,
        Resolution::OneHour => 3600,
        Resolution::SixHour => 21600,
    };
    (now / bucket_secs) * bucket_secs
}

/// Per-resolution retention pruner.
pub struct TimeseriesPruner {
    storage: Storage,
    retention: TimeseriesRetentionConfig,
}

impl TimeseriesPruner {
    pub fn new(storage: Storage, retention: TimeseriesRetentionConfig) -> Self {
        Self { storage, retention }
    }

    pub async fn prune_tick(&self) {
        let now = now_secs();
        let windows = [
            (Resolution::OneMinute, self.retention.one_min_days),
            (Resolution::FiveMinute, self.retention.five_min_days),
            (Resolution::OneHour, self.retention.one_hour_days),
            (Resolution::SixHour, self.retention.six_hour_days),
        ];
        for (resolution, days) in windows {
            let cutoff = now - (days as i64) * 86_400;
            if let Err(e) = self.storage.prune_timeseries(resolution, cutoff).await {
                error!("failed to prune {} timeseries rows: {e}", resolution.tag());
            }
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderKind;

    #[tokio::test]
    async fn write_tick_always_writes_one_minute_resolution() {
        let storage = Storage::open_in_memory().await.unwrap();
        let queue = MessageQueue::new(15);
        queue.push(DecoderKind::Acars, serde_json::json!({}), 0);
        let mut writer = TimeseriesWriter::new(storage.clone(), queue);

        writer.write_tick().await;

        let now = now_secs();
        let rows = storage
            .timeseries_range(Resolution::OneMinute, now - 120, now + 120)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].counts.acars, 1);
    }

    #[tokio::test]
    async fn five_minute_resolution_only_writes_on_its_cadence() {
        let storage = Storage::open_in_memory().await.unwrap();
        let queue = MessageQueue::new(15);
        let mut writer = TimeseriesWriter::new(storage.clone(), queue);

        for _ in 0..4 {
            writer.write_tick().await;
        }
        let now = now_secs();
        assert!(storage
            .timeseries_range(Resolution::FiveMinute, now - 120, now + 120)
            .await
            .unwrap()
            .is_empty());

        writer.write_tick().await;
        assert_eq!(
            storage
                .timeseries_range(Resolution::FiveMinute, now - 120, now + 120)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn pruner_respects_per_resolution_retention() {
        let storage = Storage::open_in_memory().await.unwrap();
        let retention = TimeseriesRetentionConfig {
            one_min_days: 0,
            five_min_days: 7,
            one_hour_days: 30,
            six_hour_days: 365,
        };
        let now = now_secs();
        storage
            .insert_timeseries_row(Resolution::OneMinute, now - 120, TimeseriesCounts::default(), now)
            .await
            .unwrap();

        let pruner = TimeseriesPruner::new(storage.clone(), retention);
        pruner.prune_tick().await;

        assert!(storage
            .timeseries_range(Resolution::OneMinute, now - 1000, now + 1000)
            .await
            .unwrap()
            .is_empty());
    }
}
