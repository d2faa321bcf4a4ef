use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the InfiniteWiki binary.
#[derive(Debug, Parser)]
#[command(
    name = "infinitewiki",
    version,
    about = "Wiki whose articles are written on first visit"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "INFINITEWIKI_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the database connection URL.
    #[arg(long = "database-url", env = "DATABASE_URL", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// API key for the text generation service.
    #[arg(
        long = "generation-api-key",
        env = "OPENAI_API_KEY",
        value_name = "KEY",
        hide_env_values = true,
        global = true
    )]
    pub generation_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply database migrations and seed the home article, then exit.
    Migrate,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Enable or disable the read-through cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache entry lifetime.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the word normalizer memo capacity.
    #[arg(long = "cache-normalizer-capacity", value_name = "COUNT")]
    pub cache_normalizer_capacity: Option<usize>,

    /// Override the number of pointers checked per existence query.
    #[arg(long = "links-batch-size", value_name = "COUNT")]
    pub links_batch_size: Option<usize>,

    /// Override the generation service base URL.
    #[arg(long = "generation-base-url", value_name = "URL")]
    pub generation_base_url: Option<String>,

    /// Override the generation model.
    #[arg(long = "generation-model", value_name = "MODEL")]
    pub generation_model: Option<String>,

    /// Override the per-attempt generation timeout.
    #[arg(long = "generation-timeout-seconds", value_name = "SECONDS")]
    pub generation_timeout_seconds: Option<u64>,

    /// Override the identity credited when no user header is sent.
    #[arg(long = "wiki-default-user", value_name = "USER")]
    pub wiki_default_user: Option<String>,
}
