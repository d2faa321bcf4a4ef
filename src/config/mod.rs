//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "infinitewiki";
const ENV_PREFIX: &str = "INFINITEWIKI";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const MAX_CACHE_TTL_SECS: u64 = 86_400;
const DEFAULT_CACHE_PURGE_INTERVAL_SECS: u64 = 60;
const DEFAULT_NORMALIZER_CAPACITY: usize = 1_000;
const DEFAULT_LINK_BATCH_SIZE: usize = 100;
const MAX_LINK_BATCH_SIZE: usize = 1_000;
const DEFAULT_MIN_WORD_LEN: usize = 3;
const DEFAULT_GENERATION_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GENERATION_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_GENERATION_MAX_OUTPUT_TOKENS: u32 = 1_600;
const DEFAULT_GENERATION_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_GENERATION_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_WIKI_USER: &str = "user";
const DEFAULT_HOME_TITLE: &str = "Infinite Wiki";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub links: LinkSettings,
    pub generation: GenerationSettings,
    pub wiki: WikiSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl: Duration,
    pub purge_interval: Duration,
    pub normalizer_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub batch_size: NonZeroUsize,
    pub min_word_len: usize,
}

#[derive(Clone)]
pub struct GenerationSettings {
    /// Absent keys leave generation unconfigured; stored articles are still served.
    pub api_key: Option<String>,
    pub base_url: Url,
    pub model: String,
    pub timeout: Duration,
    pub max_output_tokens: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WikiSettings {
    /// Credited with discoveries when a request names no user.
    pub default_user: String,
    pub home_title: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(cli);
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate) | None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    links: RawLinkSettings,
    generation: RawGenerationSettings,
    wiki: RawWikiSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, cli: &CliArgs) {
        if let Some(url) = cli.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(key) = cli.generation_api_key.as_ref() {
            self.generation.api_key = Some(key.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(capacity) = overrides.cache_normalizer_capacity {
            self.cache.normalizer_capacity = Some(capacity);
        }
        if let Some(size) = overrides.links_batch_size {
            self.links.batch_size = Some(size);
        }
        if let Some(url) = overrides.generation_base_url.as_ref() {
            self.generation.base_url = Some(url.clone());
        }
        if let Some(model) = overrides.generation_model.as_ref() {
            self.generation.model = Some(model.clone());
        }
        if let Some(seconds) = overrides.generation_timeout_seconds {
            self.generation.timeout_seconds = Some(seconds);
        }
        if let Some(user) = overrides.wiki_default_user.as_ref() {
            self.wiki.default_user = Some(user.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            links,
            generation,
            wiki,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            links: build_link_settings(links)?,
            generation: build_generation_settings(generation)?,
            wiki: build_wiki_settings(wiki)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must be greater than zero; set cache.enabled = false to bypass the cache",
        ));
    }
    if ttl_seconds > MAX_CACHE_TTL_SECS {
        return Err(LoadError::invalid(
            "cache.ttl_seconds",
            "must not exceed 86400 (one day)",
        ));
    }

    let purge_seconds = cache
        .purge_interval_seconds
        .unwrap_or(DEFAULT_CACHE_PURGE_INTERVAL_SECS);
    if purge_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.purge_interval_seconds",
            "must be greater than zero",
        ));
    }

    let normalizer_capacity = NonZeroUsize::new(
        cache
            .normalizer_capacity
            .unwrap_or(DEFAULT_NORMALIZER_CAPACITY),
    )
    .ok_or_else(|| LoadError::invalid("cache.normalizer_capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        ttl: Duration::from_secs(ttl_seconds),
        purge_interval: Duration::from_secs(purge_seconds),
        normalizer_capacity,
    })
}

fn build_link_settings(links: RawLinkSettings) -> Result<LinkSettings, LoadError> {
    let batch_value = links.batch_size.unwrap_or(DEFAULT_LINK_BATCH_SIZE);
    if batch_value > MAX_LINK_BATCH_SIZE {
        return Err(LoadError::invalid(
            "links.batch_size",
            format!("must not exceed {MAX_LINK_BATCH_SIZE}"),
        ));
    }
    let batch_size = NonZeroUsize::new(batch_value)
        .ok_or_else(|| LoadError::invalid("links.batch_size", "must be greater than zero"))?;

    let min_word_len = links.min_word_len.unwrap_or(DEFAULT_MIN_WORD_LEN);
    if min_word_len == 0 {
        return Err(LoadError::invalid(
            "links.min_word_len",
            "must be greater than zero",
        ));
    }

    Ok(LinkSettings {
        batch_size,
        min_word_len,
    })
}

fn build_generation_settings(
    generation: RawGenerationSettings,
) -> Result<GenerationSettings, LoadError> {
    let base_url_value = generation
        .base_url
        .unwrap_or_else(|| DEFAULT_GENERATION_BASE_URL.to_string());
    let base_url = Url::parse(base_url_value.trim())
        .map_err(|err| LoadError::invalid("generation.base_url", err.to_string()))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "generation.base_url",
            "scheme must be http or https",
        ));
    }

    let model = non_blank(generation.model).unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string());

    let timeout_seconds = generation
        .timeout_seconds
        .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "generation.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_output_tokens = non_zero_u32(
        generation
            .max_output_tokens
            .unwrap_or(DEFAULT_GENERATION_MAX_OUTPUT_TOKENS)
            .into(),
        "generation.max_output_tokens",
    )?;
    let max_attempts = non_zero_u32(
        generation
            .max_attempts
            .unwrap_or(DEFAULT_GENERATION_MAX_ATTEMPTS)
            .into(),
        "generation.max_attempts",
    )?;

    Ok(GenerationSettings {
        api_key: non_blank(generation.api_key),
        base_url,
        model,
        timeout: Duration::from_secs(timeout_seconds),
        max_output_tokens,
        max_attempts,
        retry_backoff: Duration::from_millis(
            generation
                .retry_backoff_ms
                .unwrap_or(DEFAULT_GENERATION_RETRY_BACKOFF_MS),
        ),
    })
}

fn build_wiki_settings(wiki: RawWikiSettings) -> Result<WikiSettings, LoadError> {
    let home_title = non_blank(wiki.home_title).unwrap_or_else(|| DEFAULT_HOME_TITLE.to_string());
    if !home_title.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(LoadError::invalid(
            "wiki.home_title",
            "must contain at least one ASCII letter or digit",
        ));
    }

    Ok(WikiSettings {
        default_user: non_blank(wiki.default_user)
            .unwrap_or_else(|| DEFAULT_WIKI_USER.to_string()),
        home_title,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    ttl_seconds: Option<u64>,
    purge_interval_seconds: Option<u64>,
    normalizer_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLinkSettings {
    batch_size: Option<usize>,
    min_word_len: Option<usize>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawGenerationSettings {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_seconds: Option<u64>,
    max_output_tokens: Option<u32>,
    max_attempts: Option<u32>,
    retry_backoff_ms: Option<u64>,
}

impl std::fmt::Debug for RawGenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawGenerationSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWikiSettings {
    default_user: Option<String>,
    home_title: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
