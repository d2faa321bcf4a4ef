use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use infinitewiki::{
    application::{
        error::AppError,
        generator::{GenerationPolicy, RetryPolicy},
        repos::{ArticlesRepo, ArticlesWriteRepo, DiscoveriesRepo},
        stats::StatsService,
        wiki::{WikiOptions, WikiService},
    },
    cache::{CacheConfig, MemoryCache, ReadThroughCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HealthProbe, HttpState},
        openai, seed, telemetry,
    },
};
use metrics::counter;
use tokio::sync::oneshot;
use tracing::{Dispatch, Level, debug, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    seed_home_article(&repositories, &settings).await?;
    info!(target = "infinitewiki::migrate", "database is up to date");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    seed_home_article(&repositories, &settings).await?;

    let cache_config = CacheConfig::from(&settings.cache);
    let (cache, memory) = ReadThroughCache::from_config(&cache_config);
    if let Some(memory) = memory {
        spawn_cache_sweeper(memory, cache_config.purge_interval);
    }

    let articles: Arc<dyn ArticlesRepo> = repositories.clone();
    let writer: Arc<dyn ArticlesWriteRepo> = repositories.clone();
    let discoveries: Arc<dyn DiscoveriesRepo> = repositories.clone();
    let health: Arc<dyn HealthProbe> = repositories.clone();
    let generator = openai::build_generator(&settings.generation).map_err(AppError::from)?;

    let options = WikiOptions {
        normalizer_capacity: cache_config.normalizer_capacity,
        batch_size: settings.links.batch_size,
        min_word_len: settings.links.min_word_len,
        generation: GenerationPolicy {
            max_output_tokens: settings.generation.max_output_tokens.get(),
            timeout: settings.generation.timeout,
            retry: RetryPolicy {
                max_attempts: settings.generation.max_attempts.get(),
                backoff: settings.generation.retry_backoff,
            },
        },
    };

    let wiki = Arc::new(WikiService::new(
        articles,
        writer,
        generator,
        cache.clone(),
        options,
    ));
    let stats = Arc::new(StatsService::new(discoveries, cache));

    let state = HttpState {
        wiki,
        stats,
        health,
        default_user: settings.wiki.default_user.clone(),
        home_title: settings.wiki.home_title.clone(),
    };

    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn seed_home_article(
    repositories: &PostgresRepositories,
    settings: &config::Settings,
) -> Result<(), AppError> {
    seed::seed_home_article(repositories, &settings.wiki.home_title)
        .await
        .map_err(|err| {
            AppError::from(InfraError::database(format!(
                "failed to seed home article: {err}"
            )))
        })?;
    Ok(())
}

fn spawn_cache_sweeper(memory: Arc<MemoryCache>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let purged = memory.purge_expired();
            if purged > 0 {
                counter!("infinitewiki_cache_purged_total").increment(purged as u64);
                debug!(
                    target = "infinitewiki::cache",
                    purged,
                    remaining = memory.len(),
                    "expired cache entries dropped"
                );
            }
        }
    });
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "infinitewiki::http",
        addr = %settings.server.addr,
        "listening"
    );

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stopping_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::from(InfraError::from(err)))?;
        }
        _ = async {
            if stopping_rx.await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(
                target = "infinitewiki::http",
                grace_seconds = grace.as_secs(),
                "shutdown grace period elapsed; dropping open connections"
            );
        }
    }

    info!(target = "infinitewiki::http", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "infinitewiki::http", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target = "infinitewiki::http", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "infinitewiki::http", "shutdown signal received; draining requests");
}
