//! Typing-indicator handlers (spec §4.1(i), §4.2). Rate-limited per `(userId, roomId)` independent of the
//! per-socket safety gate; a violation is a silent drop, never a NACK or close.

//local shortcuts
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::protocol::{OutboundFrame, TypingPayload};
use crate::state::AppState;
use crate::stores::SocketHandle;

//third-party shortcuts

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

fn room_recipients_or_not_member(state: &AppState, user_id: &str, room_id: &str) -> ServiceResult<Vec<String>>
{
    let room = state
        .stores
        .rooms
        .get(room_id)
        .filter(|room| room.roles.contains_key(user_id))
        .ok_or_else(|| ServiceError::new(ErrorCode::NotAMember, "user is not a member of this room"))?;
    Ok(room.recipients_excluding(user_id).into_iter().collect())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_typing_start(state: &AppState, socket: &SocketHandle, payload: TypingPayload) -> ServiceResult<()>
{
    if !state.stores.typing.try_count(&socket.context.user_id, &payload.room_id, &state.config)
    {
        return Ok(());
    }
    let recipients = room_recipients_or_not_member(state, &socket.context.user_id, &payload.room_id)?;
    state.dispatcher.broadcast_to_users(
        &recipients,
        OutboundFrame::TypingStart{ room_id: payload.room_id, user_id: socket.context.user_id.clone() },
    );
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_typing_stop(state: &AppState, socket: &SocketHandle, payload: TypingPayload) -> ServiceResult<()>
{
    if !state.stores.typing.try_count(&socket.context.user_id, &payload.room_id, &state.config)
    {
        return Ok(());
    }
    let recipients = room_recipients_or_not_member(state, &socket.context.user_id, &payload.room_id)?;
    state.dispatcher.broadcast_to_users(
        &recipients,
        OutboundFrame::TypingStop{ room_id: payload.room_id, user_id: socket.context.user_id.clone() },
    );
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------
