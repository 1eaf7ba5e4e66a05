//! Room creation, membership, fan-out, delivery-completion tracking, and ownership transfer on leave, all
//! driven through the router exactly as a client would (spec §4.6).

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
async fn room_message_fans_out_to_members_excluding_sender()
{
    let app = build_app();
    let (owner, mut owner_rx) = register(&app, "owner");
    let (member, mut member_rx) = register(&app, "member");
    say_hello(&app, &owner, &mut owner_rx).await;
    say_hello(&app, &member, &mut member_rx).await;

    let create = json!({"type": "ROOM_CREATE", "name": "general"});
    router::route_frame(&app, &owner, create.to_string().as_bytes()).await;
    let created = drain_values(&mut owner_rx).await;
    let room_id = created[0]["room"]["roomId"].as_str().unwrap().to_string();

    let join = json!({"type": "ROOM_JOIN", "roomId": room_id});
    router::route_frame(&app, &member, join.to_string().as_bytes()).await;
    drain_values(&mut member_rx).await;

    let send = json!({"type": "ROOM_MESSAGE", "roomId": room_id, "content": "hey room"});
    router::route_frame(&app, &owner, send.to_string().as_bytes()).await;

    let owner_frames = drain_values(&mut owner_rx).await;
    assert!(owner_frames.iter().all(|f| f["type"] != "ROOM_MESSAGE"), "sender must not receive its own fan-out");

    let member_frames = drain_values(&mut member_rx).await;
    let received = member_frames.iter().find(|f| f["type"] == "ROOM_MESSAGE").expect("member should receive the room message");
    assert_eq!(received["content"], "hey room");
}

#[tokio::test]
async fn owner_leaving_transfers_ownership_to_oldest_remaining_admin()
{
    let app = build_app();
    let (owner, mut owner_rx) = register(&app, "owner");
    let (admin, mut admin_rx) = register(&app, "admin");
    say_hello(&app, &owner, &mut owner_rx).await;
    say_hello(&app, &admin, &mut admin_rx).await;

    let create = json!({"type": "ROOM_CREATE", "name": "general"});
    router::route_frame(&app, &owner, create.to_string().as_bytes()).await;
    let created = drain_values(&mut owner_rx).await;
    let room_id = created[0]["room"]["roomId"].as_str().unwrap().to_string();

    let join = json!({"type": "ROOM_JOIN", "roomId": room_id});
    router::route_frame(&app, &admin, join.to_string().as_bytes()).await;
    drain_values(&mut admin_rx).await;

    let set_role = json!({"type": "ROOM_SET_ROLE", "roomId": room_id, "memberId": "admin", "role": "ADMIN"});
    router::route_frame(&app, &owner, set_role.to_string().as_bytes()).await;
    drain_values(&mut owner_rx).await;

    let leave = json!({"type": "ROOM_LEAVE", "roomId": room_id});
    router::route_frame(&app, &owner, leave.to_string().as_bytes()).await;
    drain_values(&mut owner_rx).await;

    let room = app.services.rooms.rooms_for_user("admin").into_iter().find(|r| r.room_id == room_id).unwrap();
    assert_eq!(room.roles.get("admin"), Some(&chat_core::model::RoomRole::Owner));
}
