//! Room handlers (spec §4.6). Membership and role mutations all funnel through [`crate::services::RoomService`];
//! this layer's only job is translating a service result into the right broadcast shape for the room's members.

//local shortcuts
use crate::error::ServiceResult;
use crate::model::{MessageState, Room};
use crate::protocol::{
    OutboundFrame, RoomAddMembersPayload, RoomCreatePayload, RoomIdPayload, RoomMemberSummary, RoomMessagePayload,
    RoomRemoveMemberPayload, RoomSetRolePayload, RoomSummary, RoomUpdateMetaPayload,
};
use crate::state::AppState;
use crate::stores::SocketHandle;

//third-party shortcuts

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

fn members_updated_frame(room: &Room) -> OutboundFrame
{
    let members = room
        .roles
        .iter()
        .map(|(user_id, role)| RoomMemberSummary{ user_id: user_id.clone(), role: *role })
        .collect();
    OutboundFrame::RoomMembersUpdated{ room_id: room.room_id.clone(), members, version: room.version }
}

fn broadcast_members_updated(state: &AppState, room: &Room)
{
    let recipients: Vec<_> = room.members().cloned().collect();
    state.dispatcher.broadcast_to_users(&recipients, members_updated_frame(room));
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_create(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomCreatePayload,
) -> ServiceResult<()>
{
    let room = state.services.rooms.create_room(socket.context.user_id.clone(), payload.name, payload.thumbnail_url).await?;
    state.dispatcher.send_to_socket(socket, OutboundFrame::RoomCreated{ room: RoomSummary::from(&room) }, correlation_id);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_join(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomIdPayload,
) -> ServiceResult<()>
{
    let room = state.services.rooms.join_room(socket.context.user_id.clone(), payload.room_id).await?;
    broadcast_members_updated(state, &room);
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_leave(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomIdPayload,
) -> ServiceResult<()>
{
    let (room, _promoted) = state.services.rooms.leave_room(&socket.context.user_id, &payload.room_id).await?;
    if let Some(room) = room
    {
        broadcast_members_updated(state, &room);
    }
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

/// ROOM_MESSAGE (spec §4.6, "Fan-out"). Every recipient gets the same frame carrying the canonical
/// `roomMessageId` as its `messageId`; per-recipient delivery state is tracked separately (see
/// [`crate::handlers::messages::handle_confirm`]).
pub async fn handle_room_message(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomMessagePayload,
) -> ServiceResult<()>
{
    let fanout = state
        .services
        .rooms
        .send_room_message(socket.context.user_id.clone(), payload.room_id.clone(), payload.content.clone())
        .await?;

    state.dispatcher.send_to_socket(
        socket,
        OutboundFrame::MessageAck{
            message_id: fanout.canonical_message_id.clone(),
            client_message_id: None,
            state: MessageState::Sent,
            timestamp: fanout.timestamp,
            duplicate: false,
        },
        correlation_id,
    );

    let frame = OutboundFrame::RoomMessage{
        room_id: payload.room_id,
        room_message_id: fanout.room_message_id.clone(),
        message_id: fanout.room_message_id,
        sender_id: fanout.sender_id,
        content: fanout.content,
        timestamp: fanout.timestamp,
    };
    state.dispatcher.broadcast_to_users(&fanout.recipients, frame);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_info(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomIdPayload,
) -> ServiceResult<()>
{
    let room = state
        .stores
        .rooms
        .get(&payload.room_id)
        .filter(|room| room.roles.contains_key(&socket.context.user_id))
        .ok_or_else(|| crate::error::ServiceError::new(crate::error::ErrorCode::NotAMember, "user is not a member of this room"))?;
    state.dispatcher.send_to_socket(socket, OutboundFrame::RoomUpdated{ room: RoomSummary::from(&room) }, correlation_id);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_list(state: &AppState, socket: &SocketHandle, correlation_id: Option<String>) -> ServiceResult<()>
{
    let rooms = state.services.rooms.rooms_for_user(&socket.context.user_id).iter().map(RoomSummary::from).collect();
    state.dispatcher.send_to_socket(socket, OutboundFrame::RoomsSnapshot{ rooms }, correlation_id);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_members(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomIdPayload,
) -> ServiceResult<()>
{
    let room = state
        .stores
        .rooms
        .get(&payload.room_id)
        .filter(|room| room.roles.contains_key(&socket.context.user_id))
        .ok_or_else(|| crate::error::ServiceError::new(crate::error::ErrorCode::NotAMember, "user is not a member of this room"))?;
    state.dispatcher.send_to_socket(socket, members_updated_frame(&room), correlation_id);
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_update_meta(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomUpdateMetaPayload,
) -> ServiceResult<()>
{
    let room = state
        .services
        .rooms
        .update_meta(&socket.context.user_id, &payload.room_id, payload.name, payload.thumbnail_url)
        .await?;
    let recipients: Vec<_> = room.members().cloned().collect();
    state.dispatcher.broadcast_to_users(&recipients, OutboundFrame::RoomUpdated{ room: RoomSummary::from(&room) });
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_add_members(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomAddMembersPayload,
) -> ServiceResult<()>
{
    let room = state.services.rooms.add_members(&socket.context.user_id, &payload.room_id, payload.member_ids).await?;
    broadcast_members_updated(state, &room);
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_remove_member(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomRemoveMemberPayload,
) -> ServiceResult<()>
{
    let room = state
        .services
        .rooms
        .remove_member(&socket.context.user_id, &payload.room_id, &payload.member_id)
        .await?;
    broadcast_members_updated(state, &room);
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_set_role(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomSetRolePayload,
) -> ServiceResult<()>
{
    let room = state
        .services
        .rooms
        .set_role(&socket.context.user_id, &payload.room_id, &payload.member_id, payload.role)
        .await?;
    broadcast_members_updated(state, &room);
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn handle_room_delete(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    payload: RoomIdPayload,
) -> ServiceResult<()>
{
    let members: Vec<_> = state.stores.rooms.get(&payload.room_id).map(|room| room.members().cloned().collect()).unwrap_or_default();
    state.services.rooms.delete_room(&socket.context.user_id, &payload.room_id).await?;
    state.dispatcher.broadcast_to_users(&members, OutboundFrame::RoomDeleted{ room_id: payload.room_id });
    let _ = correlation_id;
    Ok(())
}

//-------------------------------------------------------------------------------------------------------------------
