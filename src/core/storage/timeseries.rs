// src/core/storage/timeseries.rs

//! Persistence for the time-series rollups: one row per
//! `(resolution, timestamp)` bucket, with per-decoder-kind and error counts.

use super::Storage;
use crate::core::errors::Result;
use sqlx::Row;

/// A rollup resolution on the writer's fixed schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    OneMinute,
    FiveMinute,
    OneHour,
    SixHour,
}

impl Resolution {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::FiveMinute => "5min",
            Self::OneHour => "1hour",
            Self::SixHour => "6hour",
        }
    }

    pub const fn all() -> [Resolution; 4] {
        [Self::OneMinute, Self::FiveMinute, Self::OneHour, Self::SixHour]
    }
}

/// Per-decoder-kind counts for a single bucket.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeseriesCounts {
    pub acars: i64,
    pub vdlm: i64,
    pub hfdl: i64,
    pub imsl: i64,
    pub irdm: i64,
    pub total: i64,
    pub errors: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeseriesRow {
    pub timestamp: i64,
    pub resolution: Resolution,
    pub counts: TimeseriesCounts,
}

impl Storage {
    /// Inserts (or replaces, on a clock-jump collision) one bucket's row.
    pub async fn insert_timeseries_row(
        &self,
        resolution: Resolution,
        timestamp: i64,
        counts: TimeseriesCounts,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO timeseries_stats
                (timestamp, resolution, acars_count, vdlm_count, hfdl_count, imsl_count,
                 irdm_count, total_count, error_count, created_at)
               VALUES (?,?,?,?,?,?,?,?,?,?)
               ON CONFLICT(resolution, timestamp) DO UPDATE SET
                 acars_count = excluded.acars_count,
                 vdlm_count = excluded.vdlm_count,
                 hfdl_count = excluded.hfdl_count,
                 imsl_count = excluded.imsl_count,
                 irdm_count = excluded.irdm_count,
                 total_count = excluded.total_count,
                 error_count = excluded.error_count"#,
        )
        .bind(timestamp)
        .bind(resolution.tag())
        .bind(counts.acars)
        .bind(counts.vdlm)
        .bind(counts.hfdl)
        .bind(counts.imsl)
        .bind(counts.irdm)
        .bind(counts.total)
        .bind(counts.errors)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Deletes rows for `resolution` older than `cutoff_timestamp`. Returns
    /// the number of rows removed.
    pub async fn prune_timeseries(&self, resolution: Resolution, cutoff_timestamp: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM timeseries_stats WHERE resolution = ? AND timestamp < ?")
            .bind(resolution.tag())
            .bind(cutoff_timestamp)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn timeseries_range(
        &self,
        resolution: Resolution,
        start: i64,
        end: i64,
    ) -> Result<Vec<TimeseriesRow>> {
        let rows = sqlx::query(
            "SELECT timestamp, acars_count, vdlm_count, hfdl_count, imsl_count, irdm_count,
                    total_count, error_count
             FROM timeseries_stats
             WHERE resolution = ? AND timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC",
        )
        .bind(resolution.tag())
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| TimeseriesRow {
                timestamp: row.get("timestamp"),
                resolution,
                counts: TimeseriesCounts {
                    acars: row.get("acars_count"),
                    vdlm: row.get("vdlm_count"),
                    hfdl: row.get("hfdl_count"),
                    imsl: row.get("imsl_count"),
                    irdm: row.get("irdm_count"),
                    total: row.get("total_count"),
                    errors: row.get("error_count"),
                },
            })
            .collect())
    }

    /// Per-kind and total sums over the last hour of 1-minute buckets, the
    /// primary source for the external stats response.
    pub async fn sum_last_hour_by_kind(&self, now: i64) -> Result<TimeseriesCounts> {
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(acars_count),0), COALESCE(SUM(vdlm_count),0),
                    COALESCE(SUM(hfdl_count),0), COALESCE(SUM(imsl_count),0),
                    COALESCE(SUM(irdm_count),0), COALESCE(SUM(total_count),0)
             FROM timeseries_stats WHERE resolution = ? AND timestamp >= ?",
        )
        .bind(Resolution::OneMinute.tag())
        .bind(now - 3600)
        .fetch_one(self.pool())
        .await?;
        Ok(TimeseriesCounts {
            acars: row.0,
            vdlm: row.1,
            hfdl: row.2,
            imsl: row.3,
            irdm: row.4,
            total: row.5,
            errors: 0,
        })
    }
}
