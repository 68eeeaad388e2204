//! Service configuration loaded from the environment.
//!
//! Everything is read once at startup. A missing connection string stops the
//! process before the listener is bound.

use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE: &str = "videosDB";
const DEFAULT_COLLECTION: &str = "videos";
const DEFAULT_PORT: u16 = 3001;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Where the established collection handle is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// One handle per manager instance.
    Instance,
    /// One handle for the whole process, reused when the manager is rebuilt.
    Process,
}

impl FromStr for CacheScope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instance" => Ok(CacheScope::Instance),
            "process" => Ok(CacheScope::Process),
            _ => Err(()),
        }
    }
}

/// Order of the listed videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOrder {
    /// `createdAt` descending, ties broken by id descending.
    Newest,
    /// Whatever order the store returns.
    Natural,
}

impl FromStr for ListOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(ListOrder::Newest),
            "natural" => Ok(ListOrder::Natural),
            _ => Err(()),
        }
    }
}

/// Driver settings, handed to the MongoDB client as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub cache_scope: CacheScope,
    pub connect_timeout: Option<Duration>,
    pub server_selection_timeout: Option<Duration>,
    /// Upper bound on a single store operation.
    pub socket_timeout: Option<Duration>,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    pub max_idle_time: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub port: u16,
    pub connect_eagerly: bool,
    pub list_order: ListOrder,
    pub mongo: MongoSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let uri = get("MONGODB_URI").ok_or(ConfigError::Missing("MONGODB_URI"))?;

        let mongo = MongoSettings {
            uri,
            database: get("MONGODB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            collection: get("MONGODB_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            cache_scope: parse_or("CONNECTION_CACHE", get("CONNECTION_CACHE"), CacheScope::Instance)?,
            connect_timeout: parse_millis("MONGODB_CONNECT_TIMEOUT_MS", get("MONGODB_CONNECT_TIMEOUT_MS"))?,
            server_selection_timeout: parse_millis(
                "MONGODB_SERVER_SELECTION_TIMEOUT_MS",
                get("MONGODB_SERVER_SELECTION_TIMEOUT_MS"),
            )?,
            socket_timeout: parse_millis("MONGODB_SOCKET_TIMEOUT_MS", get("MONGODB_SOCKET_TIMEOUT_MS"))?,
            max_pool_size: parse_opt("MONGODB_MAX_POOL_SIZE", get("MONGODB_MAX_POOL_SIZE"))?,
            min_pool_size: parse_opt("MONGODB_MIN_POOL_SIZE", get("MONGODB_MIN_POOL_SIZE"))?,
            max_idle_time: parse_millis("MONGODB_MAX_IDLE_TIME_MS", get("MONGODB_MAX_IDLE_TIME_MS"))?,
        };

        Ok(Settings {
            port: parse_or("PORT", get("PORT"), DEFAULT_PORT)?,
            connect_eagerly: parse_bool("MONGODB_CONNECT_EAGERLY", get("MONGODB_CONNECT_EAGERLY"), true)?,
            list_order: parse_or("VIDEO_LIST_ORDER", get("VIDEO_LIST_ORDER"), ListOrder::Newest)?,
            mongo,
        })
    }
}

fn parse_opt<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value })
    })
    .transpose()
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    Ok(parse_opt(key, raw)?.unwrap_or(default))
}

fn parse_millis(key: &'static str, raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    Ok(parse_opt::<u64>(key, raw)?.map(Duration::from_millis))
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
        }),
    }
}
