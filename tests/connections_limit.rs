//! Multi-socket-per-session eviction: opening one more socket than `maxSocketsPerSession` allows must evict
//! the oldest socket on that session rather than reject the new one (spec §4.3, "Multi-socket sessions").

//local shortcuts
use chat_core::config::AppConfig;
use chat_core::connection::ConnectionManager;
use chat_core::db::InMemoryAdapter;
use chat_core::model::Role;
use chat_core::pubsub::NullPubSub;
use chat_core::services::Services;
use chat_core::stores::{ConnectionStore, Stores};

//standard shortcuts
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test]
async fn fourth_socket_on_a_session_evicts_the_first()
{
    let mut config = AppConfig::default();
    config.max_sockets_per_session = 3;

    let db = Arc::new(InMemoryAdapter::new());
    let stores = Arc::new(Stores::new());
    let (services, _presence_events) = Services::new(stores, db, config, Arc::new(NullPubSub));
    let services = Arc::new(services);
    let connection_store = Arc::new(ConnectionStore::new());
    let manager = ConnectionManager::new(connection_store, services.presence.clone(), config);

    let session_id = "shared-session".to_string();
    let first = manager.register(session_id.clone(), "alice".to_string(), Role::User);
    let second = manager.register(session_id.clone(), "alice".to_string(), Role::User);
    let third = manager.register(session_id.clone(), "alice".to_string(), Role::User);
    assert!(third.evicted.is_none());

    let fourth = manager.register(session_id.clone(), "alice".to_string(), Role::User);
    let evicted = fourth.evicted.expect("the fourth socket must evict the oldest one");
    assert_eq!(evicted.socket_id, first.handle.socket_id);

    assert!(manager.get(second.handle.socket_id).is_some());
    assert!(manager.get(third.handle.socket_id).is_some());
    assert!(manager.get(fourth.handle.socket_id).is_some());
    assert!(manager.get(first.handle.socket_id).is_none());
}
