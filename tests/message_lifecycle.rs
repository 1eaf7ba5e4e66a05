//! Message send dedupe by clientMessageId, the delivered/read confirmation chain, and edit/delete mutation acks
//! (spec §4.5).

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

//-------------------------------------------------------------------------------------------------------------------

fn build_app() -> Arc<AppState>
{
    let config = AppConfig::default();
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

async fn drain_values(receiver: &mut tokio::sync::mpsc::Receiver<Vec<u8>>) -> Vec<serde_json::Value>
{
    let mut values = Vec::new();
    while let Ok(bytes) = receiver.try_recv()
    {
        values.push(serde_json::from_slice(&bytes).unwrap());
    }
    values
}

async fn say_hello(app: &Arc<AppState>, socket: &SocketHandle, receiver: &mut tokio::sync::mpsc::Receiver<Vec<u8>>)
{
    let hello = json!({"type": "HELLO", "version": "1.0"});
    router::route_frame(app, socket, hello.to_string().as_bytes()).await;
    drain_values(receiver).await;
}

//-------------------------------------------------------------------------------------------------------------------

#[tokio::test]
async fn resending_same_client_message_id_returns_the_original_ack()
{
    let app = build_app();
    let (alice, mut alice_rx) = register(&app, "alice");
    register(&app, "bob");
    say_hello(&app, &alice, &mut alice_rx).await;

    let send = json!({"type": "MESSAGE_SEND", "recipientId": "bob", "content": "hi", "clientMessageId": "c1"});
    router::route_frame(&app, &alice, send.to_string().as_bytes()).await;
    let first = drain_values(&mut alice_rx).await;
    let first_message_id = first[0]["messageId"].as_str().unwrap().to_string();
    assert_eq!(first[0]["duplicate"], serde_json::Value::Bool(false));

    router::route_frame(&app, &alice, send.to_string().as_bytes()).await;
    let second = drain_values(&mut alice_rx).await;
    assert_eq!(second[0]["messageId"], first_message_id);
    assert_eq!(second[0]["duplicate"], serde_json::Value::Bool(true));
}

#[tokio::test]
async fn delivered_then_read_confirm_advances_lifecycle_state()
{
    let app = build_app();
    let (alice, mut alice_rx) = register(&app, "alice");
    let (bob, mut bob_rx) = register(&app, "bob");
    say_hello(&app, &alice, &mut alice_rx).await;
    say_hello(&app, &bob, &mut bob_rx).await;

    let send = json!({"type": "MESSAGE_SEND", "recipientId": "bob", "content": "hi"});
    router::route_frame(&app, &alice, send.to_string().as_bytes()).await;
    let ack = drain_values(&mut alice_rx).await;
    let message_id = ack[0]["messageId"].as_str().unwrap().to_string();
    drain_values(&mut bob_rx).await;

    let delivered = json!({"type": "MESSAGE_DELIVERED_CONFIRM", "messageId": message_id});
    router::route_frame(&app, &bob, delivered.to_string().as_bytes()).await;
    drain_values(&mut bob_rx).await;

    let read = json!({"type": "MESSAGE_READ", "messageId": message_id});
    router::route_frame(&app, &bob, read.to_string().as_bytes()).await;
    drain_values(&mut bob_rx).await;

    let stored = app.db.find_message(&message_id).await.unwrap().unwrap();
    assert_eq!(stored.state, chat_core::model::MessageState::Read);
}

#[tokio::test]
async fn editing_someone_elses_message_is_forbidden()
{
    let app = build_app();
    let (alice, mut alice_rx) = register(&app, "alice");
    let (bob, mut bob_rx) = register(&app, "bob");
    say_hello(&app, &alice, &mut alice_rx).await;
    say_hello(&app, &bob, &mut bob_rx).await;

    let send = json!({"type": "MESSAGE_SEND", "recipientId": "bob", "content": "hi"});
    router::route_frame(&app, &alice, send.to_string().as_bytes()).await;
    let ack = drain_values(&mut alice_rx).await;
    let message_id = ack[0]["messageId"].as_str().unwrap().to_string();
    drain_values(&mut bob_rx).await;

    let edit = json!({"type": "MESSAGE_EDIT", "messageId": message_id, "content": "not mine to edit"});
    router::route_frame(&app, &bob, edit.to_string().as_bytes()).await;
    let frames = drain_values(&mut bob_rx).await;
    assert_eq!(frames[0]["type"], "ERROR");
}
