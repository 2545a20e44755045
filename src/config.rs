// src/config.rs

//! Configuration record for the ingestion core, and the connection-descriptor
//! grammar used to turn a decoder's connection string into a list of
//! listener endpoints.
//!
//! Loading this record from the environment is out of scope for the core
//! (an external layer is expected to build one and hand it over), but the
//! record type, its defaults, and the TOML-file convenience constructor used
//! by the binary and by tests live here.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::time::Duration;
use tracing::debug;

/// The radio protocol a message or listener originates from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    Acars,
    Vdlm2,
    Hfdl,
    Imsl,
    Irdm,
}

impl DecoderKind {
    /// The default listener port for this decoder, per the connection-string grammar.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Acars => 5550,
            Self::Vdlm2 => 5555,
            Self::Hfdl => 5556,
            Self::Imsl => 5557,
            Self::Irdm => 5558,
        }
    }

    /// Short table-name-safe tag used for per-kind storage tables and metrics.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Acars => "acars",
            Self::Vdlm2 => "vdlm",
            Self::Hfdl => "hfdl",
            Self::Imsl => "imsl",
            Self::Irdm => "irdm",
        }
    }

    pub const fn all() -> [DecoderKind; 5] {
        [
            Self::Acars,
            Self::Vdlm2,
            Self::Hfdl,
            Self::Imsl,
            Self::Irdm,
        ]
    }
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A transport a listener can be bound to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Udp,
    Tcp,
    Zmq,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::Zmq => "zmq",
        };
        f.write_str(s)
    }
}

/// An immutable listener endpoint: transport, host, and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionDescriptor {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.transport, self.host, self.port)
    }
}

/// Parses a comma-separated connection string into an ordered list of
/// `ConnectionDescriptor`s.
///
/// Each token is either a bare transport name (`udp`, `tcp`, `zmq`), which
/// binds to `0.0.0.0` on `default_port`, or a `<scheme>://<host>:<port>`
/// URL. A token that fails to parse, or whose port is out of `[1, 65535]`,
/// is silently skipped so the remaining tokens still produce descriptors.
pub fn parse_connections(raw: &str, default_port: u16) -> Vec<ConnectionDescriptor> {
    raw.split(',')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .filter_map(|tok| parse_token(tok, default_port))
        .collect()
}

fn parse_token(token: &str, default_port: u16) -> Option<ConnectionDescriptor> {
    let bare_transport = match token {
        "udp" => Some(Transport::Udp),
        "tcp" => Some(Transport::Tcp),
        "zmq" => Some(Transport::Zmq),
        _ => None,
    };
    if let Some(transport) = bare_transport {
        return Some(ConnectionDescriptor {
            transport,
            host: "0.0.0.0".to_string(),
            port: default_port,
        });
    }

    let (scheme, rest) = token.split_once("://")?;
    let transport = match scheme {
        "udp" => Transport::Udp,
        "tcp" => Transport::Tcp,
        "zmq" => Transport::Zmq,
        _ => {
            debug!("skipping connection token with unknown scheme: {token}");
            return None;
        }
    };
    let (host, port_str) = rest.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port: u16 = port_str.parse().ok()?;
    if port == 0 {
        return None;
    }
    Some(ConnectionDescriptor {
        transport,
        host: host.to_string(),
        port,
    })
}

/// Per-decoder-kind connection configuration: the raw connection string as
/// supplied by the environment layer, already resolved to descriptors.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    pub connections: Vec<ConnectionDescriptor>,
}

impl DecoderConfig {
    pub fn from_raw(raw: &str, kind: DecoderKind) -> Self {
        Self {
            connections: parse_connections(raw, kind.default_port()),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.connections.is_empty()
    }
}

/// Retention and maintenance settings consumed by the scheduler and pruner.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RetentionConfig {
    #[serde(default = "default_message_save_days")]
    pub message_save_days: u32,
    #[serde(default = "default_alert_save_days")]
    pub alert_save_days: u32,
    #[serde(default = "default_timeseries_retention")]
    pub timeseries_retention: TimeseriesRetentionConfig,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_save_days: default_message_save_days(),
            alert_save_days: default_alert_save_days(),
            timeseries_retention: default_timeseries_retention(),
        }
    }
}

fn default_message_save_days() -> u32 {
    7
}
fn default_alert_save_days() -> u32 {
    120
}

/// How long each time-series resolution's rows are kept, in days.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct TimeseriesRetentionConfig {
    pub one_min_days: u32,
    pub five_min_days: u32,
    pub one_hour_days: u32,
    pub six_hour_days: u32,
}

fn default_timeseries_retention() -> TimeseriesRetentionConfig {
    TimeseriesRetentionConfig {
        one_min_days: 2,
        five_min_days: 7,
        one_hour_days: 30,
        six_hour_days: 365,
    }
}

/// ADS-B snapshot poller configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AdsbConfig {
    pub enabled: bool,
    #[serde(default = "default_adsb_url")]
    pub url: String,
    #[serde(default = "default_adsb_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_adsb_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AdsbConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_adsb_url(),
            poll_interval_secs: default_adsb_poll_interval_secs(),
            timeout_secs: default_adsb_timeout_secs(),
        }
    }
}

impl AdsbConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_adsb_url() -> String {
    "http://localhost:8080/data/aircraft.json".to_string()
}
fn default_adsb_poll_interval_secs() -> u64 {
    5
}
fn default_adsb_timeout_secs() -> u64 {
    5
}

/// The top-level configuration record consumed by the orchestrator.
///
/// Building this from the environment is out of scope for the core; an
/// external layer constructs one (or the `from_file`/`from_env` helpers
/// below are used by the thin binary wrapper and by tests).
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub database_path: String,
    pub queue_capacity: usize,
    pub save_all: bool,
    pub decoders: std::collections::HashMap<DecoderKind, DecoderConfig>,
    pub retention: RetentionConfig,
    pub adsb: AdsbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            database_path: "acarshub.db".to_string(),
            queue_capacity: default_queue_capacity(),
            save_all: false,
            decoders: std::collections::HashMap::new(),
            retention: RetentionConfig::default(),
            adsb: AdsbConfig::default(),
        }
    }
}

pub fn default_queue_capacity() -> usize {
    15
}

/// Raw, serde-friendly shape of the config file; connection strings are
/// plain strings here and get parsed into `DecoderConfig` by `from_file`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct RawConfig {
    #[serde(default = "default_log_level_str")]
    log_level: String,
    #[serde(default = "default_database_path")]
    database_path: String,
    #[serde(default = "default_queue_capacity")]
    queue_capacity: usize,
    #[serde(default)]
    save_all: bool,
    #[serde(default)]
    acars_connections: String,
    #[serde(default)]
    vdlm_connections: String,
    #[serde(default)]
    hfdl_connections: String,
    #[serde(default)]
    imsl_connections: String,
    #[serde(default)]
    irdm_connections: String,
    #[serde(default)]
    retention: RetentionConfig,
    #[serde(default)]
    adsb: AdsbConfig,
}

fn default_log_level_str() -> String {
    "info".to_string()
}
fn default_database_path() -> String {
    "acarshub.db".to_string()
}

impl Config {
    /// Loads configuration from a TOML file on disk.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML from '{path}'"))?;
        Ok(Self::from_raw(raw))
    }

    /// Loads configuration from environment variables, following the same
    /// `<KIND>_CONNECTIONS` grammar the original system uses
    /// (e.g. `ACARS_CONNECTIONS=udp`, `VDLM_CONNECTIONS=udp,tcp://remote:15550`).
    pub fn from_env() -> Result<Self> {
        let raw = RawConfig {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| default_log_level_str()),
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| default_database_path()),
            queue_capacity: std::env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_queue_capacity),
            save_all: std::env::var("SAVE_ALL")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            acars_connections: std::env::var("ACARS_CONNECTIONS").unwrap_or_default(),
            vdlm_connections: std::env::var("VDLM_CONNECTIONS").unwrap_or_default(),
            hfdl_connections: std::env::var("HFDL_CONNECTIONS").unwrap_or_default(),
            imsl_connections: std::env::var("IMSL_CONNECTIONS").unwrap_or_default(),
            irdm_connections: std::env::var("IRDM_CONNECTIONS").unwrap_or_default(),
            retention: RetentionConfig::default(),
            adsb: AdsbConfig::default(),
        };
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawConfig) -> Self {
        let mut decoders = std::collections::HashMap::new();
        decoders.insert(
            DecoderKind::Acars,
            DecoderConfig::from_raw(&raw.acars_connections, DecoderKind::Acars),
        );
        decoders.insert(
            DecoderKind::Vdlm2,
            DecoderConfig::from_raw(&raw.vdlm_connections, DecoderKind::Vdlm2),
        );
        decoders.insert(
            DecoderKind::Hfdl,
            DecoderConfig::from_raw(&raw.hfdl_connections, DecoderKind::Hfdl),
        );
        decoders.insert(
            DecoderKind::Imsl,
            DecoderConfig::from_raw(&raw.imsl_connections, DecoderKind::Imsl),
        );
        decoders.insert(
            DecoderKind::Irdm,
            DecoderConfig::from_raw(&raw.irdm_connections, DecoderKind::Irdm),
        );

        Self {
            log_level: raw.log_level,
            database_path: raw.database_path,
            queue_capacity: raw.queue_capacity,
            save_all: raw.save_all,
            decoders,
            retention: raw.retention,
            adsb: raw.adsb,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity cannot be 0"));
        }
        if self.database_path.trim().is_empty() {
            return Err(anyhow!("database_path cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_udp_uses_default_port() {
        let got = parse_connections("udp", DecoderKind::Acars.default_port());
        assert_eq!(
            got,
            vec![ConnectionDescriptor {
                transport: Transport::Udp,
                host: "0.0.0.0".to_string(),
                port: 5550,
            }]
        );
    }

    #[test]
    fn vdlm_default_port_is_not_acars_default_port() {
        // Regression guard for the historical VDL-M2 port mix-up.
        assert_ne!(DecoderKind::Acars.default_port(), DecoderKind::Vdlm2.default_port());
        assert_eq!(DecoderKind::Vdlm2.default_port(), 5555);
        assert_eq!(DecoderKind::Acars.default_port(), 5550);
    }

    #[test]
    fn mixed_tokens_parse_independently() {
        let got = parse_connections("udp,tcp://remote:15550", DecoderKind::Vdlm2.default_port());
        assert_eq!(
            got,
            vec![
                ConnectionDescriptor {
                    transport: Transport::Udp,
                    host: "0.0.0.0".to_string(),
                    port: 5555,
                },
                ConnectionDescriptor {
                    transport: Transport::Tcp,
                    host: "remote".to_string(),
                    port: 15550,
                },
            ]
        );
    }

    #[test]
    fn whitespace_around_commas_is_trimmed() {
        let got = parse_connections(" udp , tcp://h:1 ", 5550);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn empty_input_yields_no_descriptors() {
        assert!(parse_connections("", 5550).is_empty());
        assert!(parse_connections("   ", 5550).is_empty());
    }

    #[test]
    fn malformed_token_is_skipped_but_others_survive() {
        let got = parse_connections("not-a-token,udp,ftp://h:1,tcp://h:70000", 5550);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].transport, Transport::Udp);
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(parse_token("tcp://host:70000", 5550).is_none());
        assert!(parse_token("tcp://host:0", 5550).is_none());
    }

    proptest::proptest! {
        #[test]
        fn well_formed_url_tokens_always_parse(port in 1u16..=65535) {
            let token = format!("tcp://somehost:{port}");
            let got = parse_token(&token, 5550).unwrap();
            proptest::prop_assert_eq!(got.port, port);
            proptest::prop_assert_eq!(got.host, "somehost".to_string());
        }
    }
}
