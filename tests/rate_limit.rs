//! Exercises both layers of rate limiting from outside: the per-socket fixed-window send limiter (spec §4.2)
//! and the per-user sensitive-action limiter the router applies ahead of room-admin handlers (spec §4.4).

//local shortcuts
use chat_core::config::AppConfig;
use chat_core::connection::ConnectionManager;
use chat_core::db::InMemoryAdapter;
use chat_core::dispatch::Dispatcher;
use chat_core::model::Role;
use chat_core::pubsub::NullPubSub;
use chat_core::router;
use chat_core::services::Services;
use chat_core::stores::{ConnectionStore, SocketHandle, Stores};
use chat_core::AppState;

//third-party shortcuts
use serde_json::json;

//standard shortcuts
use std::sync::Arc;
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

fn build_app(mut config: AppConfig) -> Arc<AppState>
{
    // tight windows so the test doesn't need to wait out the production defaults
    config.send_limit.window = Duration::from_secs(60);
    config.send_limit.max_messages = 2;
    config.per_user_limit.sensitive_window = Duration::from_secs(60);
    config.per_user_limit.sensitive_max = 1;

    let db = Arc::new(InMemoryAdapter::new());
    let stores = Arc::new(Stores::new());
    let (services, _presence_events) = Services::new(stores.clone(), db.clone(), config, Arc::new(NullPubSub));
    let services = Arc::new(services);
    let connection_store = Arc::new(ConnectionStore::new());
    let connections = Arc::new(ConnectionManager::new(connection_store.clone(), services.presence.clone(), config));
    let dispatcher = Arc::new(Dispatcher::new(connection_store));
    Arc::new(AppState{ config, stores, services, connections, dispatcher, db })
}

fn register(app: &Arc<AppState>, user_id: &str) -> (Arc<SocketHandle>, tokio::sync::mpsc::Receiver<Vec<u8>>)
{
    let outcome = app.connections.register(format!("sess-{user_id}"), user_id.to_string(), Role::User);
    (outcome.handle, outcome.receiver)
}

async fn drain_types(receiver: &mut tokio::sync::mpsc::Receiver<Vec<u8>>) -> Vec<String>
{
    let mut types = Vec::new();
    while let Ok(bytes) = receiver.try_recv()
    {
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        types.push(value["type"].as_str().unwrap().to_string());
    }
    types
}

async fn say_hello(app: &Arc<AppState>, socket: &SocketHandle, receiver: &mut tokio::sync::mpsc::Receiver<Vec<u8>>)
{
    let hello = json!({"type": "HELLO", "version": "1.0"});
    router::route_frame(app, socket, hello.to_string().as_bytes()).await;
    drain_types(receiver).await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test]
async fn send_limit_exceeded_yields_message_error_without_closing()
{
    let app = build_app(AppConfig::default());
    let (alice, mut alice_rx) = register(&app, "alice");
    register(&app, "bob");
    say_hello(&app, &alice, &mut alice_rx).await;

    for _ in 0..2
    {
        let send = json!({"type": "MESSAGE_SEND", "recipientId": "bob", "content": "hi"});
        let action = router::route_frame(&app, &alice, send.to_string().as_bytes()).await;
        assert_eq!(action, router::RouterAction::Continue);
        drain_types(&mut alice_rx).await;
    }

    let send = json!({"type": "MESSAGE_SEND", "recipientId": "bob", "content": "one too many"});
    let action = router::route_frame(&app, &alice, send.to_string().as_bytes()).await;
    assert_eq!(action, router::RouterAction::Continue);

    let frames = drain_types(&mut alice_rx).await;
    assert_eq!(frames, vec!["MESSAGE_ERROR".to_string()]);
}

#[tokio::test]
async fn sensitive_per_user_limit_blocks_second_room_create()
{
    let app = build_app(AppConfig::default());
    let (alice, mut alice_rx) = register(&app, "alice");
    say_hello(&app, &alice, &mut alice_rx).await;

    let create = json!({"type": "ROOM_CREATE", "name": "first"});
    router::route_frame(&app, &alice, create.to_string().as_bytes()).await;
    let frames = drain_types(&mut alice_rx).await;
    assert_eq!(frames, vec!["ROOM_CREATED".to_string()]);

    let create_again = json!({"type": "ROOM_CREATE", "name": "second"});
    router::route_frame(&app, &alice, create_again.to_string().as_bytes()).await;
    let frames = drain_types(&mut alice_rx).await;
    assert_eq!(frames, vec!["MESSAGE_ERROR".to_string()]);
}
