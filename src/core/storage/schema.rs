// src/core/storage/schema.rs

//! Embedded, additive-only schema migrations. Every statement uses
//! `IF NOT EXISTS` so re-running the migration set at startup is always
//! safe.

use crate::config::DecoderKind;

pub const MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid INTEGER UNIQUE NOT NULL,
    kind TEXT NOT NULL,
    time REAL NOT NULL,
    station_id TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL DEFAULT '',
    label TEXT NOT NULL DEFAULT '',
    flight TEXT NOT NULL DEFAULT '',
    tail TEXT NOT NULL DEFAULT '',
    icao TEXT NOT NULL DEFAULT '',
    depa TEXT NOT NULL DEFAULT '',
    dsta TEXT NOT NULL DEFAULT '',
    freq TEXT NOT NULL DEFAULT '',
    level TEXT NOT NULL DEFAULT '',
    msgno TEXT NOT NULL DEFAULT '',
    from_addr TEXT NOT NULL DEFAULT '',
    to_addr TEXT NOT NULL DEFAULT '',
    error INTEGER NOT NULL DEFAULT 0,
    eta TEXT NOT NULL DEFAULT '',
    gate_out TEXT NOT NULL DEFAULT '',
    gate_in TEXT NOT NULL DEFAULT '',
    wheels_off TEXT NOT NULL DEFAULT '',
    wheels_on TEXT NOT NULL DEFAULT '',
    lat TEXT NOT NULL DEFAULT '',
    lon TEXT NOT NULL DEFAULT '',
    alt TEXT NOT NULL DEFAULT '',
    libacars TEXT NOT NULL DEFAULT '',
    channel INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_messages_time ON messages(time);
CREATE INDEX IF NOT EXISTS idx_messages_station_id ON messages(station_id);
CREATE INDEX IF NOT EXISTS idx_messages_icao ON messages(icao);
"#;

pub const MESSAGES_FTS_TABLE: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    flight, tail, icao, depa, dsta, label, freq, text,
    content='messages', content_rowid='id'
);
CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, flight, tail, icao, depa, dsta, label, freq, text)
    VALUES (new.id, new.flight, new.tail, new.icao, new.depa, new.dsta, new.label, new.freq, new.text);
END;
CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, flight, tail, icao, depa, dsta, label, freq, text)
    VALUES ('delete', old.id, old.flight, old.tail, old.icao, old.depa, old.dsta, old.label, old.freq, old.text);
END;
"#;

pub const ALERT_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS alert_matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_uid INTEGER NOT NULL,
    term TEXT NOT NULL,
    match_type TEXT NOT NULL,
    matched_at REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_matches_matched_at ON alert_matches(matched_at);
CREATE INDEX IF NOT EXISTS idx_alert_matches_term ON alert_matches(term);
CREATE INDEX IF NOT EXISTS idx_alert_matches_message_uid ON alert_matches(message_uid);

CREATE TABLE IF NOT EXISTS alert_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term TEXT UNIQUE NOT NULL,
    count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS ignore_alert_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term TEXT UNIQUE NOT NULL
);
"#;

pub const COUNT_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS count (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total INTEGER NOT NULL DEFAULT 0,
    good INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO count (id, total, good, errors) VALUES (1, 0, 0, 0);

CREATE TABLE IF NOT EXISTS nonlogged_count (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    nonlogged_good INTEGER NOT NULL DEFAULT 0,
    nonlogged_errors INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO nonlogged_count (id, nonlogged_good, nonlogged_errors) VALUES (1, 0, 0);
"#;

pub const TIMESERIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS timeseries_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    resolution TEXT NOT NULL,
    acars_count INTEGER NOT NULL DEFAULT 0,
    vdlm_count INTEGER NOT NULL DEFAULT 0,
    hfdl_count INTEGER NOT NULL DEFAULT 0,
    imsl_count INTEGER NOT NULL DEFAULT 0,
    irdm_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    error_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    UNIQUE(resolution, timestamp)
);
CREATE INDEX IF NOT EXISTS idx_timeseries_timestamp ON timeseries_stats(timestamp);
"#;

/// Per-kind frequency and level counter tables, named `freqs_<kind>` and
/// `level_<kind>`.
pub fn per_kind_tables(kind: DecoderKind) -> String {
    let tag = kind.tag();
    format!(
        r#"
CREATE TABLE IF NOT EXISTS freqs_{tag} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    freq TEXT UNIQUE NOT NULL,
    count INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS level_{tag} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    level REAL UNIQUE NOT NULL,
    count INTEGER NOT NULL DEFAULT 0
);
"#
    )
}

pub const STATION_IDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS station_ids (
    station_id TEXT PRIMARY KEY
);
"#;
