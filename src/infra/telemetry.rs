use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the service emits. Safe to call
/// more than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "infinitewiki_cache_hit_total",
            Unit::Count,
            "Read-through cache lookups served from the cache, by key kind."
        );
        describe_counter!(
            "infinitewiki_cache_miss_total",
            Unit::Count,
            "Read-through cache lookups that fell through to the store, by key kind."
        );
        describe_counter!(
            "infinitewiki_cache_degraded_total",
            Unit::Count,
            "Cache backend failures answered from the store instead."
        );
        describe_counter!(
            "infinitewiki_normalizer_hit_total",
            Unit::Count,
            "Word normalizations answered from the memo."
        );
        describe_counter!(
            "infinitewiki_articles_generated_total",
            Unit::Count,
            "Articles generated and stored for the first time."
        );
        describe_counter!(
            "infinitewiki_generation_retry_total",
            Unit::Count,
            "Generation attempts retried after a transient failure, by failure kind."
        );
        describe_counter!(
            "infinitewiki_generation_failed_total",
            Unit::Count,
            "Generations abandoned after a terminal failure, by failure kind."
        );
        describe_histogram!(
            "infinitewiki_generation_ms",
            Unit::Milliseconds,
            "Wall time of successful generations including retries."
        );
        describe_counter!(
            "infinitewiki_cache_purged_total",
            Unit::Count,
            "Expired cache entries removed by the background sweep."
        );
    });
}
