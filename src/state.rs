//! Shared application state (spec §3, §4.9). Constructed once at startup in `bin/server.rs` and handed to every
//! connection task behind an `Arc`; nothing in here is mutated directly — all mutation goes through the stores
//! and services it bundles.

//local shortcuts
use crate::config::AppConfig;
use crate::connection::ConnectionManager;
use crate::db::DbAdapter;
use crate::dispatch::Dispatcher;
use crate::services::Services;
use crate::stores::Stores;

//third-party shortcuts

//standard shortcuts
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

pub struct AppState
{
    pub config: AppConfig,
    pub stores: Arc<Stores>,
    pub services: Arc<Services>,
    pub connections: Arc<ConnectionManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub db: Arc<dyn DbAdapter>,
}

//-------------------------------------------------------------------------------------------------------------------
