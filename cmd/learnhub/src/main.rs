//! # learnhub
//!
//! Assembles the server from configuration: picks the storage backend and
//! the geo-ip locator, wires the services and hands them to the HTTP adapter.

use std::sync::Arc;

use anyhow::{Context, Result};
use api_adapters::AppState;
use auth_adapters::{Argon2PasswordHasher, RandomTokenGenerator};
use axum_extra::extract::cookie::Key;
use chrono::Duration;
use configs::{AppConfig, Backend, GeoConfig, ServerConfig};
use domains::{
    AuthAttemptRepository, Clock, Collection, CommentStore, EventEmitter, GeoLocator, Post,
    ProgressionRepository, QueryExecutor, SessionPolicy, SessionRepository, SystemClock,
    UserRepository, WatchlistRepository,
};
use secrecy::ExposeSecret;
use services::{
    AttemptPolicy, AuthService, CollectionService, CommentService, PostService,
    ProgressionService, SessionService, SessionSettings, WatchlistService,
};
use storage_adapters::{LoggingEventEmitter, MemoryStore, NoopGeoLocator};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// A store backing every persistence port at once.
trait Store:
    SessionRepository
    + UserRepository
    + AuthAttemptRepository
    + CommentStore
    + WatchlistRepository
    + ProgressionRepository
    + QueryExecutor<Post>
    + QueryExecutor<Collection>
    + 'static
{
}

impl<T> Store for T where
    T: SessionRepository
        + UserRepository
        + AuthAttemptRepository
        + CommentStore
        + WatchlistRepository
        + ProgressionRepository
        + QueryExecutor<Post>
        + QueryExecutor<Collection>
        + 'static
{
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

fn cookie_key(server: &ServerConfig) -> Key {
    match Key::try_from(server.cookie_key.expose_secret().as_bytes()) {
        Ok(key) => key,
        Err(_) => {
            warn!("server.cookie_key is missing or shorter than 64 bytes; using a random key, sessions end on restart");
            Key::generate()
        }
    }
}

fn session_settings(config: &AppConfig) -> SessionSettings {
    let session = &config.session;
    SessionSettings {
        policy: SessionPolicy {
            idle: Duration::minutes(session.idle_minutes),
            remember_years: session.remember_years,
        },
        cookie_name: session.cookie_name.clone(),
        cookie_max_age: Duration::days(365 * i64::from(session.remember_years)),
    }
}

#[cfg(feature = "geo-http")]
fn geo_locator(geo: &GeoConfig) -> Result<Arc<dyn GeoLocator>> {
    if !geo.enabled() {
        return Ok(Arc::new(NoopGeoLocator));
    }
    let locator = storage_adapters::HttpGeoLocator::new(
        geo.endpoint.clone(),
        std::time::Duration::from_secs(geo.timeout_secs),
    )?;
    info!(endpoint = %geo.endpoint, "geo lookups enabled");
    Ok(Arc::new(locator))
}

#[cfg(not(feature = "geo-http"))]
fn geo_locator(geo: &GeoConfig) -> Result<Arc<dyn GeoLocator>> {
    if geo.enabled() {
        warn!(endpoint = %geo.endpoint, "geo.endpoint is set but this build has no geo-http support");
    }
    Ok(Arc::new(NoopGeoLocator))
}

fn app_state<S: Store>(
    store: Arc<S>,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
    geo: Arc<dyn GeoLocator>,
) -> AppState {
    let events: Arc<dyn EventEmitter> = Arc::new(LoggingEventEmitter);
    let sessions = Arc::new(SessionService::new(
        store.clone(),
        geo,
        events.clone(),
        Arc::new(RandomTokenGenerator),
        clock.clone(),
        session_settings(config),
    ));
    let attempts = AttemptPolicy {
        max_attempts: config.auth.max_attempts,
        window: Duration::minutes(config.auth.window_minutes),
    };

    AppState {
        auth: Arc::new(AuthService::new(
            store.clone(),
            store.clone(),
            Arc::new(Argon2PasswordHasher::new()),
            sessions.clone(),
            clock.clone(),
            attempts,
        )),
        sessions,
        comments: Arc::new(CommentService::new(
            store.clone(),
            events,
            clock.clone(),
            config.server.identity_salt.expose_secret(),
        )),
        collections: Arc::new(CollectionService::new(store.clone())),
        posts: Arc::new(PostService::new(store.clone())),
        watchlist: Arc::new(WatchlistService::new(store.clone(), clock.clone())),
        progression: Arc::new(ProgressionService::new(store.clone(), clock)),
        users: store.clone(),
        session_logs: store,
        cookie_key: cookie_key(&config.server),
    }
}

#[cfg(feature = "db-postgres")]
async fn postgres_state(config: &AppConfig, clock: Arc<dyn Clock>, geo: Arc<dyn GeoLocator>) -> Result<AppState> {
    let db = &config.database;
    let store = storage_adapters::PgStore::connect(db.url.expose_secret(), db.max_connections, clock.clone())
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("running migrations")?;
    Ok(app_state(Arc::new(store), config, clock, geo))
}

#[cfg(not(feature = "db-postgres"))]
async fn postgres_state(_config: &AppConfig, _clock: Arc<dyn Clock>, _geo: Arc<dyn GeoLocator>) -> Result<AppState> {
    anyhow::bail!("database.backend = \"postgres\" needs a build with the db-postgres feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(config.server.json_logs);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let geo = geo_locator(&config.geo)?;

    let state = match config.database.backend {
        Backend::Memory => {
            warn!("using the in-memory store; nothing survives a restart");
            app_state(Arc::new(MemoryStore::new(clock.clone())), &config, clock, geo)
        }
        Backend::Postgres => postgres_state(&config, clock, geo).await?,
    };

    let addr = config.server.bind_addr();
    info!(%addr, backend = ?config.database.backend, "learnhub starting");
    api_adapters::serve(&addr, state).await?;
    Ok(())
}
