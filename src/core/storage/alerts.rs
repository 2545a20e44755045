// src/core/storage/alerts.rs

//! Persistence for the alerting subsystem: the configured term/ignore
//! sets, recorded matches, and the per-term match counters.

use super::Storage;
use crate::core::errors::Result;
use crate::core::message::Message;
use sqlx::Row;

/// Which field of a message an alert term matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Text,
    Icao,
    Tail,
    Flight,
}

impl MatchType {
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Icao => "icao",
            Self::Tail => "tail",
            Self::Flight => "flight",
        }
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "icao" => Self::Icao,
            "tail" => Self::Tail,
            "flight" => Self::Flight,
            _ => Self::Text,
        }
    }
}

/// A single persisted alert match, joined against its message.
#[derive(Debug, Clone)]
pub struct AlertMatch {
    pub message: Message,
    pub term: String,
    pub match_type: MatchType,
    pub matched_at: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AlertSearchResult {
    pub matches: Vec<AlertMatch>,
    pub total_count: i64,
}

impl Storage {
    /// Replaces the configured alert-term set with exactly `terms`: terms
    /// not already present are inserted with a zero count, and terms no
    /// longer present are removed. Calling this twice with the same set is
    /// a no-op the second time.
    pub async fn set_alert_terms(&self, terms: &[String]) -> Result<()> {
        for term in terms {
            let upper = term.to_uppercase();
            sqlx::query("INSERT OR IGNORE INTO alert_stats (term, count) VALUES (?, 0)")
                .bind(&upper)
                .execute(self.pool())
                .await?;
        }
        if terms.is_empty() {
            sqlx::query("DELETE FROM alert_stats").execute(self.pool()).await?;
        } else {
            let placeholders = terms.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("DELETE FROM alert_stats WHERE term NOT IN ({placeholders})");
            let mut q = sqlx::query(&sql);
            for term in terms {
                q = q.bind(term.to_uppercase());
            }
            q.execute(self.pool()).await?;
        }
        Ok(())
    }

    /// Replaces the ignore-term set the same way `set_alert_terms` does.
    pub async fn set_alert_ignore(&self, terms: &[String]) -> Result<()> {
        for term in terms {
            let upper = term.to_uppercase();
            sqlx::query("INSERT OR IGNORE INTO ignore_alert_terms (term) VALUES (?)")
                .bind(&upper)
                .execute(self.pool())
                .await?;
        }
        if terms.is_empty() {
            sqlx::query("DELETE FROM ignore_alert_terms").execute(self.pool()).await?;
        } else {
            let placeholders = terms.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!("DELETE FROM ignore_alert_terms WHERE term NOT IN ({placeholders})");
            let mut q = sqlx::query(&sql);
            for term in terms {
                q = q.bind(term.to_uppercase());
            }
            q.execute(self.pool()).await?;
        }
        Ok(())
    }

    pub async fn alert_terms(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT term FROM alert_stats ORDER BY term")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    pub async fn alert_ignore_terms(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT term FROM ignore_alert_terms ORDER BY term")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
    }

    /// Records a match and bumps that term's cumulative count.
    pub async fn add_alert_match(
        &self,
        message_uid: u64,
        term: &str,
        match_type: MatchType,
        matched_at: f64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_matches (message_uid, term, match_type, matched_at) VALUES (?,?,?,?)",
        )
        .bind(message_uid as i64)
        .bind(term)
        .bind(match_type.tag())
        .bind(matched_at)
        .execute(self.pool())
        .await?;

        sqlx::query(
            "INSERT INTO alert_stats (term, count) VALUES (?, 1)
             ON CONFLICT(term) DO UPDATE SET count = count + 1",
        )
        .bind(term)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Deletes every recorded match and zeroes every term's count, without
    /// touching the configured term/ignore sets themselves. Used by
    /// `regenerate_all_alert_matches` before replaying every message.
    pub async fn clear_alert_matches(&self) -> Result<()> {
        sqlx::query("DELETE FROM alert_matches").execute(self.pool()).await?;
        sqlx::query("UPDATE alert_stats SET count = 0").execute(self.pool()).await?;
        Ok(())
    }

    pub async fn search_alerts(&self, limit: i64, offset: i64) -> Result<AlertSearchResult> {
        self.search_alerts_inner(None, limit, offset).await
    }

    pub async fn search_alerts_by_term(
        &self,
        term: &str,
        limit: i64,
        offset: i64,
    ) -> Result<AlertSearchResult> {
        self.search_alerts_inner(Some(term), limit, offset).await
    }

    async fn search_alerts_inner(
        &self,
        term: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<AlertSearchResult> {
        let where_clause = if term.is_some() { "WHERE a.term = ?" } else { "" };

        let count_sql = format!("SELECT COUNT(*) FROM alert_matches a {where_clause}");
        let mut count_q = sqlx::query_scalar(&count_sql);
        if let Some(t) = term {
            count_q = count_q.bind(t);
        }
        let total_count: i64 = count_q.fetch_one(self.pool()).await?;

        let select_sql = format!(
            "SELECT a.term, a.match_type, a.matched_at,
                    m.uid, m.kind, m.time, m.station_id, m.text, m.label, m.flight, m.tail,
                    m.icao, m.depa, m.dsta, m.freq, m.level, m.msgno, m.from_addr, m.to_addr,
                    m.error, m.eta, m.gate_out, m.gate_in, m.wheels_off, m.wheels_on, m.lat,
                    m.lon, m.alt, m.libacars, m.channel
             FROM alert_matches a JOIN messages m ON m.uid = a.message_uid
             {where_clause}
             ORDER BY a.matched_at DESC
             LIMIT ? OFFSET ?"
        );
        let mut select_q = sqlx::query(&select_sql);
        if let Some(t) = term {
            select_q = select_q.bind(t);
        }
        select_q = select_q.bind(limit).bind(offset);
        let rows = select_q.fetch_all(self.pool()).await?;

        let matches = rows
            .into_iter()
            .map(|row| AlertMatch {
                term: row.get("term"),
                match_type: MatchType::from_tag(&row.get::<String, _>("match_type")),
                matched_at: row.get("matched_at"),
                message: super::messages::row_to_message(row),
            })
            .collect();

        Ok(AlertSearchResult {
            matches,
            total_count,
        })
    }

    /// `term -> cumulative match count` for every configured term.
    pub async fn alert_counts(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT term, count FROM alert_stats ORDER BY term")
            .fetch_all(self.pool())
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("term"), r.get::<i64, _>("count")))
            .collect())
    }

    /// Deletes alert matches older than `cutoff`; returns the number removed.
    pub async fn delete_old_alert_matches(&self, cutoff: f64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM alert_matches WHERE matched_at < ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setting_alert_terms_is_idempotent() {
        let storage = Storage::open_in_memory().await.unwrap();
        let terms = vec!["MAYDAY".to_string(), "PAN PAN".to_string()];
        storage.set_alert_terms(&terms).await.unwrap();
        storage.set_alert_terms(&terms).await.unwrap();
        assert_eq!(storage.alert_terms().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn setting_alert_terms_drops_removed_terms() {
        let storage = Storage::open_in_memory().await.unwrap();
        storage
            .set_alert_terms(&["MAYDAY".to_string(), "HIJACK".to_string()])
            .await
            .unwrap();
        storage.set_alert_terms(&["MAYDAY".to_string()]).await.unwrap();
        let terms = storage.alert_terms().await.unwrap();
        assert_eq!(terms, vec!["MAYDAY".to_string()]);
    }

    #[tokio::test]
    async fn add_alert_match_increments_term_count() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut msg = Message {
            text: "MAYDAY MAYDAY".to_string(),
            ..Default::default()
        };
        let outcome = storage.add_message(&mut msg, false).await.unwrap();
        storage
            .add_alert_match(outcome.uid, "MAYDAY", MatchType::Text, 123.0)
            .await
            .unwrap();
        storage
            .add_alert_match(outcome.uid, "MAYDAY", MatchType::Text, 124.0)
            .await
            .unwrap();

        let counts = storage.alert_counts().await.unwrap();
        assert_eq!(counts, vec![("MAYDAY".to_string(), 2)]);
    }

    #[tokio::test]
    async fn search_alerts_by_term_filters_and_paginates() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut msg = Message {
            text: "MAYDAY".to_string(),
            ..Default::default()
        };
        let outcome = storage.add_message(&mut msg, false).await.unwrap();
        storage
            .add_alert_match(outcome.uid, "MAYDAY", MatchType::Text, 1.0)
            .await
            .unwrap();

        let result = storage.search_alerts_by_term("MAYDAY", 10, 0).await.unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.matches[0].message.uid, outcome.uid);

        let empty = storage.search_alerts_by_term("HIJACK", 10, 0).await.unwrap();
        assert_eq!(empty.total_count, 0);
    }
}
