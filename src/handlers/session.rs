//! Session-level handlers (spec §4.4): protocol handshake, state sync, reconnect resume, and the liveness noise
//! types that never touch a service. Thin by design — each function validates just enough to call into a service
//! or store, then replies through the dispatcher.

//local shortcuts
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::model::MessageType;
use crate::protocol::{HelloPayload, OutboundFrame, ResumePayload, RoomSummary};
use crate::state::AppState;
use crate::stores::SocketHandle;

//third-party shortcuts

//standard shortcuts
use std::sync::atomic::Ordering;
use std::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

/// HELLO must be the first frame on every socket (spec §4.4, "HELLO-first"); the router enforces that ordering
/// before this is ever called. `version` here is the negotiation input rather than a value to check against a
/// prior negotiation (spec §6) — a version the server doesn't support fails the handshake with VERSION_MISMATCH
/// instead of being silently accepted.
pub async fn handle_hello(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: HelloPayload,
) -> ServiceResult<()>
{
    if payload.version != crate::protocol::SUPPORTED_VERSION
    {
        return Err(ServiceError::new(
            ErrorCode::VersionMismatch,
            format!("unsupported protocol version '{}', server supports '{}'", payload.version, crate::protocol::SUPPORTED_VERSION),
        ));
    }

    socket.hello_received.store(true, Ordering::SeqCst);
    *socket.negotiated_version.lock().unwrap_or_else(|e| e.into_inner()) = Some(payload.version.clone());
    state.dispatcher.send_to_socket(socket, OutboundFrame::HelloAck{ version: payload.version }, correlation_id);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

/// Builds the rehydration snapshot a client needs after a gap: unread direct count plus every room it belongs to
/// (spec §6, "STATE_SYNC_RESPONSE").
pub async fn handle_state_sync(state: &AppState, socket: &SocketHandle, correlation_id: Option<String>) -> ServiceResult<()>
{
    let response = build_state_sync_response(state, &socket.context.user_id).await?;
    state.dispatcher.send_to_socket(socket, response, correlation_id);
    Ok(())
}

pub async fn build_state_sync_response(state: &AppState, user_id: &str) -> ServiceResult<OutboundFrame>
{
    let candidates = state
        .db
        .replay_candidates_for_user(user_id, None, state.config.replay_max_limit)
        .await
        .map_err(|e| ServiceError::new(ErrorCode::InternalError, e.to_string()))?;
    let unread_direct = candidates
        .iter()
        .filter(|m| m.message_type == MessageType::Direct && m.state < crate::model::MessageState::Delivered)
        .count();

    let rooms = state.services.rooms.rooms_for_user(user_id).iter().map(RoomSummary::from).collect();
    Ok(OutboundFrame::StateSyncResponse{ unread_direct, rooms })
}

//-------------------------------------------------------------------------------------------------------------------

/// RESUME re-triggers replay from `lastMessageId` and schedules a state-sync response once replay lands (spec
/// §6, "Upon accept", reconnect branch). The actual replay delivery itself is driven through
/// [`crate::handlers::messages::handle_message_replay`]; this handler owns only the delayed `STATE_SYNC_RESPONSE`.
pub async fn handle_resume(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: ResumePayload,
) -> ServiceResult<()>
{
    super::messages::replay_and_send(state, socket, None, payload.last_message_id, None).await?;
    let response = build_state_sync_response(state, &socket.context.user_id).await?;
    state.dispatcher.send_to_socket(socket, response, correlation_id);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

/// Application-level liveness ping, distinct from the transport-level WS ping/pong used for the heartbeat
/// timeout sweep (spec §4.3). Refreshes the pong clock so a chatty client never looks stale.
pub fn handle_presence_ping(socket: &SocketHandle)
{
    *socket.last_pong_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
}

/// CLIENT_ACK is purely informational telemetry from the client; nothing to persist or reply to.
pub fn handle_client_ack()
{
}

/// Same liveness effect as [`handle_presence_ping`]; kept as a distinct frame type because some clients send
/// bare PING instead of the named PRESENCE_PING (spec §4.4 frame set).
pub fn handle_ping(socket: &SocketHandle)
{
    handle_presence_ping(socket);
}

//-------------------------------------------------------------------------------------------------------------------
