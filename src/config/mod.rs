//! Configuration module for the Coral Club backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Credentials for an upstream hosted KV store speaking the REST dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamKv {
    /// Base URL without trailing slash
    pub url: String,
    pub token: String,
    /// Optional namespace sent as a header on every request
    pub namespace: Option<String>,
}

/// Keys under which the shared document and its revision counter live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKeys {
    pub state_key: String,
    pub rev_key: String,
}

impl Default for DocumentKeys {
    fn default() -> Self {
        Self {
            state_key: "coralclub:state".to_string(),
            rev_key: "coralclub:rev".to_string(),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Path to the local SQLite KV file, used when no upstream is configured.
    /// `:memory:` keeps the document in process memory only.
    pub db_path: PathBuf,
    /// Upstream KV store; `None` means the local SQLite table is the store
    pub upstream: Option<UpstreamKv>,
    pub keys: DocumentKeys,
    /// Upsert array elements by `id` instead of replacing arrays on merge
    pub merge_arrays_by_id: bool,
    /// Hard-coded admin PIN
    pub admin_pin: String,
    /// Minutes a pending reservation holds its tent
    pub hold_minutes: i64,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    /// Number of tents seeded into a fresh document
    pub tent_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            db_path: PathBuf::from("./data/kv.sqlite"),
            upstream: None,
            keys: DocumentKeys::default(),
            merge_arrays_by_id: false,
            admin_pin: "1234".to_string(),
            hold_minutes: 15,
            poll_interval: Duration::from_millis(1500),
            sweep_interval: Duration::from_secs(10),
            tent_count: 20,
        }
    }
}

impl Config {
    /// Whether the document should live in process memory instead of SQLite.
    pub fn in_memory(&self) -> bool {
        self.db_path.as_os_str() == ":memory:"
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let upstream = match (lookup("KV_REST_API_URL"), lookup("KV_REST_API_TOKEN")) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => {
                Some(UpstreamKv {
                    url: url.trim_end_matches('/').to_string(),
                    token,
                    namespace: lookup("KV_REST_NAMESPACE").filter(|ns| !ns.is_empty()),
                })
            }
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "Only one of KV_REST_API_URL / KV_REST_API_TOKEN is set; using local store"
                );
                None
            }
        };

        let keys = DocumentKeys {
            state_key: lookup("CORAL_STATE_KEY").unwrap_or(defaults.keys.state_key),
            rev_key: lookup("CORAL_REV_KEY").unwrap_or(defaults.keys.rev_key),
        };

        Self {
            bind_addr: parse_or("CORAL_BIND_ADDR", &lookup, defaults.bind_addr),
            log_level: log_level_from(&lookup),
            db_path: lookup("CORAL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            upstream,
            keys,
            merge_arrays_by_id: parse_or(
                "CORAL_MERGE_ARRAYS_BY_ID",
                &lookup,
                defaults.merge_arrays_by_id,
            ),
            admin_pin: lookup("CORAL_ADMIN_PIN").unwrap_or(defaults.admin_pin),
            hold_minutes: parse_positive("CORAL_HOLD_MINUTES", &lookup, defaults.hold_minutes),
            poll_interval: Duration::from_millis(parse_positive(
                "CORAL_POLL_INTERVAL_MS",
                &lookup,
                1500,
            )),
            sweep_interval: Duration::from_secs(parse_positive(
                "CORAL_SWEEP_INTERVAL_SECS",
                &lookup,
                10,
            )),
            tent_count: parse_or("CORAL_TENT_COUNT", &lookup, defaults.tent_count),
        }
    }
}

/// Log directive from the environment, readable before logging is set up.
pub fn log_level() -> String {
    dotenvy::dotenv().ok();
    log_level_from(&|name: &str| env::var(name).ok())
}

fn log_level_from<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("CORAL_LOG_LEVEL")
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

/// Like [`parse_or`], but zero and negative values also fall back.
fn parse_positive<T, F>(name: &str, lookup: &F, default: T) -> T
where
    T: FromStr + PartialOrd + Default + std::fmt::Display + Copy,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(name, lookup, default);
    if value > T::default() {
        return value;
    }
    tracing::warn!("{} must be positive, got {}; using default", name, value);
    default
}

fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid {} value {:?}, using default", name, raw);
            default
        }),
        None => default,
    }
}
