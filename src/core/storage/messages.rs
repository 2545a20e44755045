// src/core/storage/messages.rs

//! Message insert, search, pruning and the per-kind/day counters that back
//! the frequency/level/count tables.

use super::Storage;
use crate::config::DecoderKind;
use crate::core::errors::Result;
use crate::core::message::Message;
use sqlx::Row;

/// What `add_message` returns to the processor.
#[derive(Debug, Clone, Default)]
pub struct InsertOutcome {
    pub uid: u64,
    pub persisted: bool,
}

/// One page of a search, plus the total matching row count (ignoring
/// limit/offset).
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub messages: Vec<Message>,
    pub total_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Time,
    Tail,
    Flight,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Any subset of the fields a search can filter on.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub tail: Option<String>,
    pub flight: Option<String>,
    pub icao: Option<String>,
    pub depa: Option<String>,
    pub dsta: Option<String>,
    pub label: Option<String>,
    pub msgno: Option<String>,
    pub text: Option<String>,
    pub freq: Option<String>,
    pub kind: Option<DecoderKind>,
    pub station_id: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for SortBy {
    fn default() -> Self {
        Self::Time
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }
}

/// Removes embedded double quotes (doubled) and control characters from an
/// FTS prefix query term.
fn sanitize_fts_term(term: &str) -> String {
    let doubled: String = term.chars().filter(|c| !c.is_control()).collect();
    doubled.replace('"', "\"\"")
}

impl Storage {
    /// Performs the storage side of handling one arrived message in one
    /// logical unit: frequency counter, save decision, level counter, then
    /// persistence. Alert matching itself is the caller's responsibility
    /// (it needs the in-memory alert cache); this just persists the
    /// resulting `alert_matches` rows the caller computed.
    pub async fn add_message(
        &self,
        message: &mut Message,
        save_all: bool,
    ) -> Result<InsertOutcome> {
        self.update_frequency_counter(message.kind.into(), &message.freq).await?;

        let non_empty = message.is_non_empty();
        let should_persist = save_all || non_empty;

        if let Ok(level) = message.level.trim().parse::<f64>() {
            self.update_level_counter(message.kind.into(), level).await?;
        }

        if !should_persist {
            self.increment_nonlogged(message.error > 0).await?;
            return Ok(InsertOutcome {
                uid: 0,
                persisted: false,
            });
        }

        let uid = self.next_uid();
        message.uid = uid;

        sqlx::query(
            r#"INSERT INTO messages
                (uid, kind, time, station_id, text, label, flight, tail, icao, depa, dsta,
                 freq, level, msgno, from_addr, to_addr, error, eta, gate_out, gate_in,
                 wheels_off, wheels_on, lat, lon, alt, libacars, channel)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(uid as i64)
        .bind(DecoderKind::from(message.kind).tag())
        .bind(message.time)
        .bind(&message.station_id)
        .bind(&message.text)
        .bind(&message.label)
        .bind(&message.flight)
        .bind(&message.tail)
        .bind(&message.icao)
        .bind(&message.depa)
        .bind(&message.dsta)
        .bind(&message.freq)
        .bind(&message.level)
        .bind(&message.msgno)
        .bind(&message.from_addr)
        .bind(&message.to_addr)
        .bind(message.error)
        .bind(&message.eta)
        .bind(&message.gate_out)
        .bind(&message.gate_in)
        .bind(&message.wheels_off)
        .bind(&message.wheels_on)
        .bind(&message.lat)
        .bind(&message.lon)
        .bind(&message.alt)
        .bind(&message.libacars)
        .bind(message.channel as i64)
        .execute(self.pool())
        .await?;

        self.increment_counts(message.error > 0).await?;

        Ok(InsertOutcome {
            uid,
            persisted: true,
        })
    }

    async fn update_frequency_counter(&self, kind: DecoderKind, freq: &str) -> Result<()> {
        if freq.trim().is_empty() {
            return Ok(());
        }
        let table = format!("freqs_{}", kind.tag());
        sqlx::query(&format!(
            "INSERT INTO {table} (freq, count) VALUES (?, 1)
             ON CONFLICT(freq) DO UPDATE SET count = count + 1"
        ))
        .bind(freq)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn update_level_counter(&self, kind: DecoderKind, level: f64) -> Result<()> {
        let table = format!("level_{}", kind.tag());
        sqlx::query(&format!(
            "INSERT INTO {table} (level, count) VALUES (?, 1)
             ON CONFLICT(level) DO UPDATE SET count = count + 1"
        ))
        .bind(level)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn increment_counts(&self, is_error: bool) -> Result<()> {
        if is_error {
            sqlx::query("UPDATE count SET total = total + 1, errors = errors + 1 WHERE id = 1")
                .execute(self.pool())
                .await?;
        } else {
            sqlx::query("UPDATE count SET total = total + 1, good = good + 1 WHERE id = 1")
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }

    async fn increment_nonlogged(&self, is_error: bool) -> Result<()> {
        if is_error {
            sqlx::query("UPDATE nonlogged_count SET nonlogged_errors = nonlogged_errors + 1 WHERE id = 1")
                .execute(self.pool())
                .await?;
        } else {
            sqlx::query("UPDATE nonlogged_count SET nonlogged_good = nonlogged_good + 1 WHERE id = 1")
                .execute(self.pool())
                .await?;
        }
        Ok(())
    }

    /// Records a station id; returns `true` if it had not been observed
    /// before (the processor uses this to decide whether to emit the
    /// updated `station_ids` set).
    pub async fn record_station_id(&self, station_id: &str) -> Result<bool> {
        if station_id.is_empty() {
            return Ok(false);
        }
        let result = sqlx::query("INSERT OR IGNORE INTO station_ids (station_id) VALUES (?)")
            .bind(station_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn all_station_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT station_id FROM station_ids")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// Substring matching on `station_id`/`icao`, FTS5 prefix matching on
    /// everything else, always returning a total count that ignores
    /// `limit`/`offset`.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult> {
        let use_substring = query.station_id.is_some() || query.icao.is_some();
        let fts_query = if use_substring {
            None
        } else {
            self.build_fts_match(query)
        };

        let order_col = match query.sort_by {
            SortBy::Time => "m.time",
            SortBy::Tail => "m.tail",
            SortBy::Flight => "m.flight",
            SortBy::Label => "m.label",
        };
        let order_dir = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) ");
        self.push_from_and_where(&mut count_builder, query, use_substring, &fts_query);
        let total_count: i64 = count_builder
            .build_query_scalar()
            .fetch_one(self.pool())
            .await?;

        let mut select_builder = sqlx::QueryBuilder::new(
            "SELECT m.uid, m.kind, m.time, m.station_id, m.text, m.label, m.flight, m.tail,
                    m.icao, m.depa, m.dsta, m.freq, m.level, m.msgno, m.from_addr, m.to_addr,
                    m.error, m.eta, m.gate_out, m.gate_in, m.wheels_off, m.wheels_on, m.lat,
                    m.lon, m.alt, m.libacars, m.channel ",
        );
        self.push_from_and_where(&mut select_builder, query, use_substring, &fts_query);
        select_builder.push(format!(" ORDER BY {order_col} {order_dir} LIMIT "));
        select_builder.push_bind(query.limit);
        select_builder.push(" OFFSET ");
        select_builder.push_bind(query.offset);

        let rows = select_builder.build().fetch_all(self.pool()).await?;
        let messages = rows.into_iter().map(row_to_message).collect();

        Ok(SearchResult {
            messages,
            total_count,
        })
    }

    fn push_from_and_where<'a>(
        &self,
        builder: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>,
        query: &'a SearchQuery,
        use_substring: bool,
        fts_query: &'a Option<String>,
    ) {
        if fts_query.is_some() {
            builder.push("FROM messages_fts f JOIN messages m ON m.id = f.rowid ");
        } else {
            builder.push("FROM messages m ");
        }

        let mut first = true;
        let mut and_or_where = |b: &mut sqlx::QueryBuilder<'a, sqlx::Sqlite>, first: &mut bool| {
            b.push(if *first { " WHERE " } else { " AND " });
            *first = false;
        };

        if let Some(fts) = fts_query {
            and_or_where(builder, &mut first);
            builder.push("f.messages_fts MATCH ");
            builder.push_bind(fts.clone());
        }
        if use_substring {
            if let Some(v) = &query.station_id {
                and_or_where(builder, &mut first);
                builder.push("m.station_id LIKE '%' || ");
                builder.push_bind(v.clone());
                builder.push(" || '%'");
            }
            if let Some(v) = &query.icao {
                and_or_where(builder, &mut first);
                builder.push("m.icao LIKE '%' || ");
                builder.push_bind(v.clone());
                builder.push(" || '%'");
            }
        }
        if let Some(k) = query.kind {
            and_or_where(builder, &mut first);
            builder.push("m.kind = ");
            builder.push_bind(k.tag());
        }
        if let Some(t) = query.start_time {
            and_or_where(builder, &mut first);
            builder.push("m.time >= ");
            builder.push_bind(t);
        }
        if let Some(t) = query.end_time {
            and_or_where(builder, &mut first);
            builder.push("m.time <= ");
            builder.push_bind(t);
        }
    }

    fn build_fts_match(&self, query: &SearchQuery) -> Option<String> {
        let mut tokens = Vec::new();
        let mut add = |field: &str, value: &Option<String>| {
            if let Some(v) = value {
                let sanitized = sanitize_fts_term(v);
                tokens.push(format!("{field}:\"{sanitized}\"*"));
            }
        };
        add("flight", &query.flight);
        add("tail", &query.tail);
        add("depa", &query.depa);
        add("dsta", &query.dsta);
        add("label", &query.label);
        add("freq", &query.freq);
        add("text", &query.text);

        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(" AND "))
        }
    }

    /// Deletes messages older than `message_save_days` unless protected by
    /// a recent alert match, then deletes alert matches older than
    /// `alert_save_days`.
    pub async fn prune_database(&self, message_save_days: u32, alert_save_days: u32, now: f64) -> Result<(u64, u64)> {
        let message_cutoff = now - (message_save_days as f64) * 86400.0;
        let alert_cutoff = now - (alert_save_days as f64) * 86400.0;

        let pruned_messages = sqlx::query(
            r#"DELETE FROM messages
               WHERE time < ?
                 AND uid NOT IN (SELECT message_uid FROM alert_matches WHERE matched_at >= ?)"#,
        )
        .bind(message_cutoff)
        .bind(alert_cutoff)
        .execute(self.pool())
        .await?
        .rows_affected();

        let pruned_alerts = sqlx::query("DELETE FROM alert_matches WHERE matched_at < ?")
            .bind(alert_cutoff)
            .execute(self.pool())
            .await?
            .rows_affected();

        Ok((pruned_messages, pruned_alerts))
    }

    /// Streams every message row, for alert regeneration.
    pub async fn all_messages(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT uid, kind, time, station_id, text, label, flight, tail, icao, depa, dsta,
                    freq, level, msgno, from_addr, to_addr, error, eta, gate_out, gate_in,
                    wheels_off, wheels_on, lat, lon, alt, libacars, channel FROM messages",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(row_to_message).collect())
    }
}

pub(super) fn row_to_message(row: sqlx::sqlite::SqliteRow) -> Message {
    let kind_tag: String = row.get("kind");
    let kind = match kind_tag.as_str() {
        "acars" => DecoderKind::Acars,
        "vdlm" => DecoderKind::Vdlm2,
        "hfdl" => DecoderKind::Hfdl,
        "imsl" => DecoderKind::Imsl,
        "irdm" => DecoderKind::Irdm,
        _ => DecoderKind::Acars,
    };
    Message {
        uid: row.get::<i64, _>("uid") as u64,
        kind: kind.into(),
        time: row.get("time"),
        station_id: row.get("station_id"),
        text: row.get("text"),
        label: row.get("label"),
        flight: row.get("flight"),
        tail: row.get("tail"),
        icao: row.get("icao"),
        depa: row.get("depa"),
        dsta: row.get("dsta"),
        freq: row.get("freq"),
        level: row.get("level"),
        msgno: row.get("msgno"),
        from_addr: row.get("from_addr"),
        to_addr: row.get("to_addr"),
        error: row.get("error"),
        eta: row.get("eta"),
        gate_out: row.get("gate_out"),
        gate_in: row.get("gate_in"),
        wheels_off: row.get("wheels_off"),
        wheels_on: row.get("wheels_on"),
        lat: row.get("lat"),
        lon: row.get("lon"),
        alt: row.get("alt"),
        libacars: row.get("libacars"),
        channel: row.get::<i64, _>("channel") as usize,
        metadata: crate::core::message::MessageMetadata::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_fetch_roundtrip() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut msg = Message {
            text: "UAL123 departed".to_string(),
            tail: "N8560Z".to_string(),
            flight: "UAL123".to_string(),
            icao: "ABCDEF".to_string(),
            freq: "1310000".to_string(),
            time: 1000.0,
            ..Default::default()
        };
        let outcome = storage.add_message(&mut msg, false).await.unwrap();
        assert!(outcome.persisted);
        assert_eq!(outcome.uid, 1);

        let all = storage.all_messages().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].flight, "UAL123");
    }

    #[tokio::test]
    async fn empty_message_without_save_all_is_not_persisted() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut msg = Message::default();
        let outcome = storage.add_message(&mut msg, false).await.unwrap();
        assert!(!outcome.persisted);
        assert!(storage.all_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_message_with_save_all_is_persisted() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut msg = Message::default();
        let outcome = storage.add_message(&mut msg, true).await.unwrap();
        assert!(outcome.persisted);
    }

    #[tokio::test]
    async fn uids_are_never_reused() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut a = Message {
            text: "a".to_string(),
            ..Default::default()
        };
        let mut b = Message {
            text: "b".to_string(),
            ..Default::default()
        };
        let out_a = storage.add_message(&mut a, false).await.unwrap();
        let out_b = storage.add_message(&mut b, false).await.unwrap();
        assert_ne!(out_a.uid, out_b.uid);
    }

    #[tokio::test]
    async fn station_id_reports_new_only_once() {
        let storage = Storage::open_in_memory().await.unwrap();
        assert!(storage.record_station_id("KJFK").await.unwrap());
        assert!(!storage.record_station_id("KJFK").await.unwrap());
    }

    #[tokio::test]
    async fn pruning_protects_messages_referenced_by_recent_alert_match() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut old_msg = Message {
            text: "hit".to_string(),
            time: 1.0,
            ..Default::default()
        };
        let out = storage.add_message(&mut old_msg, false).await.unwrap();

        storage
            .add_alert_match(out.uid, "HIT", crate::core::storage::alerts::MatchType::Text, 100.0)
            .await
            .unwrap();

        let now = 10_000_000.0;
        let (pruned_messages, _pruned_alerts) = storage
            .prune_database(1, 100_000, now)
            .await
            .unwrap();

        assert_eq!(pruned_messages, 0);
        assert_eq!(storage.all_messages().await.unwrap().len(), 1);
    }
}
