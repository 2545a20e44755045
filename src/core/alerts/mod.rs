// src/core/alerts/mod.rs

//! The alert cache: the process-wide source of truth for alert and ignore
//! terms, and the matching rules the processor's hot path consults.
//!
//! A small struct behind an `Arc`, guarded with `parking_lot::RwLock` for a
//! read-many/write-rarely access pattern.

use crate::core::errors::Result;
use crate::core::message::Message;
use crate::core::storage::alerts::MatchType;
use crate::core::storage::Storage;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;

/// One surviving alert hit against a message, prior to persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertHit {
    pub term: String,
    pub match_type: MatchType,
}

#[derive(Debug, Default, Clone)]
struct CacheState {
    terms: Vec<String>,
    ignore_terms: Vec<String>,
}

/// Holds the configured term/ignore sets in memory. Cheap to clone (wraps
/// an `Arc` internally via the caller holding it behind one).
#[derive(Default)]
pub struct AlertCache {
    state: RwLock<CacheState>,
}

impl AlertCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Replaces the term set, upper-cased and de-duplicated, preserving
    /// first-seen order.
    pub fn set_terms(&self, terms: &[String]) {
        self.state.write().terms = normalize(terms);
    }

    pub fn set_ignore(&self, terms: &[String]) {
        self.state.write().ignore_terms = normalize(terms);
    }

    pub fn terms(&self) -> Vec<String> {
        self.state.read().terms.clone()
    }

    pub fn ignore_terms(&self) -> Vec<String> {
        self.state.read().ignore_terms.clone()
    }

    /// Matches every configured term against the message's text, icao,
    /// tail, and flight fields, returning every surviving hit
    /// (ignore-suppressed hits are left out entirely).
    pub fn match_message(&self, message: &Message) -> Vec<AlertHit> {
        let state = self.state.read();
        if state.terms.is_empty() {
            return Vec::new();
        }

        let fields: [(&str, MatchType); 4] = [
            (message.text.as_str(), MatchType::Text),
            (message.icao.as_str(), MatchType::Icao),
            (message.tail.as_str(), MatchType::Tail),
            (message.flight.as_str(), MatchType::Flight),
        ];

        let mut hits = Vec::new();
        for term in &state.terms {
            for (haystack, match_type) in fields {
                if haystack.is_empty() {
                    continue;
                }
                if !field_matches(term, haystack, match_type) {
                    continue;
                }
                let suppressed = state
                    .ignore_terms
                    .iter()
                    .any(|ignore| field_matches(ignore, haystack, match_type));
                if !suppressed {
                    hits.push(AlertHit {
                        term: term.clone(),
                        match_type,
                    });
                }
            }
        }
        hits
    }
}

fn normalize(terms: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    terms
        .iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Text uses a cached case-insensitive word-boundary regex; identifier
/// fields use case-insensitive substring containment. Never swap the two:
/// a word-boundary match on an identifier field would miss partial tail
/// numbers and ICAO hexes a user expects substring matching to catch.
fn field_matches(term: &str, haystack: &str, match_type: MatchType) -> bool {
    match match_type {
        MatchType::Text => word_boundary_regex(term)
            .map(|re| re.is_match(haystack))
            .unwrap_or(false),
        MatchType::Icao | MatchType::Tail | MatchType::Flight => {
            haystack.to_uppercase().contains(&term.to_uppercase())
        }
    }
}

static WORD_BOUNDARY_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn word_boundary_regex(term: &str) -> Option<Regex> {
    if let Some(re) = WORD_BOUNDARY_CACHE.read().get(term) {
        return Some(re.clone());
    }
    let pattern = format!(r"(?i)\b{}\b", regex::escape(term));
    let re = Regex::new(&pattern).ok()?;
    WORD_BOUNDARY_CACHE.write().insert(term.to_string(), re.clone());
    Some(re)
}

/// Summary counts returned by a full alert-match regeneration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegenerationStats {
    pub total_messages: u64,
    pub matched_messages: u64,
    pub total_matches: u64,
}

/// Ties the in-memory cache to storage: the engine the processor and the
/// configuration endpoints actually hold.
pub struct AlertEngine {
    cache: AlertCache,
    storage: Storage,
}

impl AlertEngine {
    /// Loads the cache from storage's configured term/ignore sets.
    pub async fn load(storage: Storage) -> Result<Self> {
        let engine = Self {
            cache: AlertCache::new(),
            storage,
        };
        engine.cache.set_terms(&engine.storage.alert_terms().await?);
        engine.cache.set_ignore(&engine.storage.alert_ignore_terms().await?);
        Ok(engine)
    }

    pub async fn set_terms(&self, terms: Vec<String>) -> Result<()> {
        self.storage.set_alert_terms(&terms).await?;
        self.cache.set_terms(&terms);
        Ok(())
    }

    pub async fn set_ignore(&self, terms: Vec<String>) -> Result<()> {
        self.storage.set_alert_ignore(&terms).await?;
        self.cache.set_ignore(&terms);
        Ok(())
    }

    /// Matches a single already-persisted message against the cache,
    /// persisting every surviving hit. Called from the processor's hot
    /// path; each persistence failure is best-effort.
    pub async fn apply_and_persist(&self, uid: u64, message: &Message, now: f64) -> Vec<AlertHit> {
        let hits = self.cache.match_message(message);
        for hit in &hits {
            if let Err(e) = self
                .storage
                .add_alert_match(uid, &hit.term, hit.match_type, now)
                .await
            {
                tracing::error!("failed to persist alert match for uid {uid}: {e}");
            }
        }
        hits
    }

    /// `regenerateAllAlertMatches`: replaces the term sets, clears every
    /// existing match and counter, then replays the matching rule over
    /// every stored message.
    pub async fn regenerate_all(
        &self,
        terms: Vec<String>,
        ignore: Vec<String>,
        now: f64,
    ) -> Result<RegenerationStats> {
        self.set_terms(terms).await?;
        self.set_ignore(ignore).await?;
        self.storage.clear_alert_matches().await?;

        let messages = self.storage.all_messages().await?;
        let mut matched_messages = 0u64;
        let mut total_matches = 0u64;

        for message in &messages {
            let hits = self.cache.match_message(message);
            if hits.is_empty() {
                continue;
            }
            matched_messages += 1;
            for hit in &hits {
                self.storage
                    .add_alert_match(message.uid, &hit.term, hit.match_type, now)
                    .await?;
                total_matches += 1;
            }
        }

        Ok(RegenerationStats {
            total_messages: messages.len() as u64,
            matched_messages,
            total_matches,
        })
    }

    pub fn cache(&self) -> &AlertCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str, icao: &str, tail: &str, flight: &str) -> Message {
        Message {
            text: text.to_string(),
            icao: icao.to_string(),
            tail: tail.to_string(),
            flight: flight.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn text_match_is_word_bounded() {
        let cache = AlertCache::new();
        cache.set_terms(&["UAL".to_string()]);

        assert!(cache.match_message(&msg("UAL onward", "", "", "")).iter().any(|h| h.match_type == MatchType::Text));
        assert!(!cache
            .match_message(&msg("UAL123 departed", "", "", ""))
            .iter()
            .any(|h| h.match_type == MatchType::Text));
    }

    #[test]
    fn identifier_fields_use_substring_containment() {
        let cache = AlertCache::new();
        cache.set_terms(&["BF3".to_string()]);
        let hits = cache.match_message(&msg("", "ABF308", "", ""));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].match_type, MatchType::Icao);
    }

    #[test]
    fn ignore_term_suppresses_same_field_same_rule() {
        let cache = AlertCache::new();
        cache.set_terms(&["UAL".to_string()]);
        cache.set_ignore(&["TEST".to_string()]);
        let hits = cache.match_message(&msg("UAL test flight", "", "", ""));
        assert!(hits.is_empty());
    }

    #[test]
    fn end_to_end_scenario_three_matches_three_fields_not_icao() {
        let cache = AlertCache::new();
        cache.set_terms(&["UAL123".to_string(), "N8560Z".to_string()]);
        let message = msg("UAL123 departed", "ABCDEF", "N8560Z", "UAL123");
        let hits = cache.match_message(&message);

        assert!(hits.iter().any(|h| h.term == "UAL123" && h.match_type == MatchType::Text));
        assert!(hits.iter().any(|h| h.term == "UAL123" && h.match_type == MatchType::Flight));
        assert!(hits.iter().any(|h| h.term == "N8560Z" && h.match_type == MatchType::Tail));
        assert!(!hits.iter().any(|h| h.term == "UAL123" && h.match_type == MatchType::Icao));
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn setting_terms_twice_is_idempotent_and_deduplicates() {
        let cache = AlertCache::new();
        cache.set_terms(&["ual".to_string(), "UAL".to_string()]);
        assert_eq!(cache.terms(), vec!["UAL".to_string()]);
    }

    proptest::proptest! {
        #[test]
        fn term_embedded_in_identifier_field_always_matches_by_substring(
            prefix in "[A-Z0-9]{0,4}",
            term in "[A-Z]{3,6}",
            suffix in "[A-Z0-9]{0,4}",
        ) {
            let cache = AlertCache::new();
            cache.set_terms(&[term.clone()]);
            let haystack = format!("{prefix}{term}{suffix}");
            let hits = cache.match_message(&msg("", &haystack, "", ""));
            proptest::prop_assert!(hits.iter().any(|h| h.match_type == MatchType::Icao));
        }

        #[test]
        fn term_embedded_inside_a_longer_word_never_matches_as_text(
            prefix in "[a-z]{1,4}",
            term in "[a-z]{3,6}",
            suffix in "[a-z]{1,4}",
        ) {
            let cache = AlertCache::new();
            cache.set_terms(&[term.clone()]);
            let glued = format!("{prefix}{term}{suffix}");
            let hits = cache.match_message(&msg(&glued, "", "", ""));
            proptest::prop_assert!(!hits.iter().any(|h| h.match_type == MatchType::Text));
        }
    }

    #[tokio::test]
    async fn regenerating_twice_yields_identical_counters() {
        let storage = Storage::open_in_memory().await.unwrap();
        let mut m = Message {
            text: "MAYDAY MAYDAY".to_string(),
            ..Default::default()
        };
        storage.add_message(&mut m, true).await.unwrap();

        let engine = AlertEngine::load(storage).await.unwrap();
        let terms = vec!["MAYDAY".to_string()];
        let first = engine.regenerate_all(terms.clone(), vec![], 1.0).await.unwrap();
        let second = engine.regenerate_all(terms, vec![], 2.0).await.unwrap();

        assert_eq!(first, second);
    }
}
