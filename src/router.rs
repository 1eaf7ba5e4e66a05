//! Protocol router (spec §4.4): the single entry point every inbound frame passes through, in order —
//! envelope parse, safety gate, HELLO-first enforcement, zombie check, schema validation, per-user rate limits,
//! handler dispatch, error translation. No handler is reachable except through this sequence.

//local shortcuts
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::model::MessageState;
use crate::protocol::frame_type;
use crate::protocol::{
    HelloPayload, InboundEnvelope, MessageConfirmPayload, MessageDeletePayload, MessageEditPayload,
    MessageReplayPayload, MessageSendPayload, OutboundFrame, ResumePayload, RoomAddMembersPayload, RoomCreatePayload,
    RoomIdPayload, RoomMessagePayload, RoomRemoveMemberPayload, RoomSetRolePayload, RoomUpdateMetaPayload,
    TypingPayload,
};
use crate::safety::GateDecision;
use crate::state::AppState;
use crate::stores::SocketHandle;

//third-party shortcuts
use serde::de::DeserializeOwned;

//standard shortcuts
use std::sync::atomic::Ordering;

//-------------------------------------------------------------------------------------------------------------------

/// What the transport's connection loop should do after [`route_frame`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterAction
{
    Continue,
    Close{ code: u16 },
}

//-------------------------------------------------------------------------------------------------------------------

fn send_error(state: &AppState, socket: &SocketHandle, correlation_id: Option<String>, code: ErrorCode, message: impl Into<String>)
{
    state.dispatcher.send_to_socket(socket, OutboundFrame::Error{ code, message: message.into() }, correlation_id);
}

fn send_message_error(
    state: &AppState,
    socket: &SocketHandle,
    correlation_id: Option<String>,
    code: ErrorCode,
    message: impl Into<String>,
    retry_after_ms: Option<u64>,
)
{
    state.dispatcher.send_to_socket(
        socket,
        OutboundFrame::MessageError{ code, message: message.into(), retry_after_ms },
        correlation_id,
    );
}

fn parse<T: DeserializeOwned>(raw: &serde_json::Value) -> ServiceResult<T>
{
    serde_json::from_value(raw.clone()).map_err(|e| ServiceError::new(ErrorCode::ValidationError, e.to_string()))
}

//-------------------------------------------------------------------------------------------------------------------

pub async fn route_frame(state: &AppState, socket: &SocketHandle, raw: &[u8]) -> RouterAction
{
    let envelope: InboundEnvelope = match serde_json::from_slice(raw)
    {
        Ok(envelope) => envelope,
        Err(_) =>
        {
            let decision = {
                let mut safety = socket.safety.lock().unwrap_or_else(|e| e.into_inner());
                safety.record_malformed(&state.config)
            };
            match decision
            {
                GateDecision::Drop =>
                {
                    crate::observability::message_dropped(socket.socket_id, "unknown", "malformed frame past violation threshold");
                }
                GateDecision::Reject{ error, .. } => send_error(state, socket, None, error.code, error.message),
                _ => send_error(state, socket, None, ErrorCode::InvalidPayload, "malformed frame"),
            }
            return RouterAction::Continue;
        }
    };

    let frame_type = envelope.frame_type.as_str();
    let correlation_id = envelope.correlation_id.clone();

    let gate_decision = {
        let mut safety = socket.safety.lock().unwrap_or_else(|e| e.into_inner());
        safety.check_inbound(frame_type, raw.len(), &state.config)
    };

    match gate_decision
    {
        GateDecision::Drop =>
        {
            crate::observability::message_dropped(socket.socket_id, frame_type, "typing-limiter or noise drop");
            return RouterAction::Continue;
        }
        GateDecision::Reject{ error, retry_after_ms, close_socket } =>
        {
            crate::observability::safety_checked(socket.socket_id, frame_type, "rejected");
            send_message_error(state, socket, correlation_id, error.code, error.message, retry_after_ms);
            return if close_socket { RouterAction::Close{ code: 1008 } } else { RouterAction::Continue };
        }
        GateDecision::AllowWithWarning =>
        {
            crate::observability::safety_checked(socket.socket_id, frame_type, "allowed_with_warning");
            state.dispatcher.send_to_socket(socket, OutboundFrame::RateLimitWarning{ retry_after_ms: 0 }, None);
        }
        GateDecision::Allow =>
        {
            crate::observability::safety_checked(socket.socket_id, frame_type, "allowed");
        }
    }

    if frame_type != frame_type::HELLO && !socket.hello_received.load(Ordering::SeqCst)
    {
        send_error(state, socket, correlation_id, ErrorCode::HelloRequired, "HELLO must be sent before any other frame");
        return RouterAction::Close{ code: 1008 };
    }

    // A frame's own `version` is the negotiation input for HELLO; every other frame type must match whatever
    // version HELLO already negotiated (spec §6).
    if frame_type != frame_type::HELLO
    {
        if let Some(frame_version) = &envelope.version
        {
            let negotiated = socket.negotiated_version.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if negotiated.as_deref() != Some(frame_version.as_str())
            {
                send_error(state, socket, correlation_id, ErrorCode::VersionMismatch, "frame version does not match the negotiated protocol version");
                return RouterAction::Continue;
            }
        }
    }

    if state.connections.is_zombie(socket)
    {
        return RouterAction::Close{ code: 4004 };
    }

    let user_rate_ok = if frame_type::SENSITIVE_TYPES.contains(&frame_type)
    {
        state.stores.per_user_limits.try_sensitive(&socket.context.user_id, &state.config)
    }
    else if !frame_type::NOISE_TYPES.contains(&frame_type)
    {
        state.stores.per_user_limits.try_general(&socket.context.user_id, &state.config)
    }
    else
    {
        true
    };

    if !user_rate_ok
    {
        send_message_error(state, socket, correlation_id, ErrorCode::RateLimited, "per-user rate limit exceeded", None);
        return RouterAction::Continue;
    }

    if let Err(err) = dispatch(state, socket, frame_type, correlation_id.clone(), &envelope.raw).await
    {
        send_error(state, socket, correlation_id, err.code, err.message);
    }

    RouterAction::Continue
}

//-------------------------------------------------------------------------------------------------------------------

async fn dispatch(
    state: &AppState,
    socket: &SocketHandle,
    frame_type: &str,
    correlation_id: Option<String>,
    raw: &serde_json::Value,
) -> ServiceResult<()>
{
    use crate::handlers::{messages, presence, rooms, session};

    match frame_type
    {
        t if t == frame_type::HELLO => session::handle_hello(state, socket, correlation_id, parse::<HelloPayload>(raw)?).await,
        t if t == frame_type::STATE_SYNC => session::handle_state_sync(state, socket, correlation_id).await,
        t if t == frame_type::RESUME => session::handle_resume(state, socket, correlation_id, parse::<ResumePayload>(raw)?).await,
        t if t == frame_type::PRESENCE_PING =>
        {
            session::handle_presence_ping(socket);
            Ok(())
        }
        t if t == frame_type::CLIENT_ACK =>
        {
            session::handle_client_ack();
            Ok(())
        }
        t if t == frame_type::PING =>
        {
            session::handle_ping(socket);
            Ok(())
        }

        t if t == frame_type::MESSAGE_SEND =>
        {
            messages::handle_message_send(state, socket, correlation_id, parse::<MessageSendPayload>(raw)?).await
        }
        t if t == frame_type::MESSAGE_READ || t == frame_type::MESSAGE_READ_CONFIRM =>
        {
            messages::handle_confirm(state, socket, correlation_id, parse::<MessageConfirmPayload>(raw)?, MessageState::Read).await
        }
        t if t == frame_type::MESSAGE_DELIVERED_CONFIRM =>
        {
            messages::handle_confirm(state, socket, correlation_id, parse::<MessageConfirmPayload>(raw)?, MessageState::Delivered).await
        }
        t if t == frame_type::MESSAGE_EDIT =>
        {
            messages::handle_message_edit(state, socket, correlation_id, parse::<MessageEditPayload>(raw)?).await
        }
        t if t == frame_type::MESSAGE_DELETE =>
        {
            messages::handle_message_delete(state, socket, correlation_id, parse::<MessageDeletePayload>(raw)?).await
        }
        t if t == frame_type::MESSAGE_REPLAY =>
        {
            messages::handle_message_replay(state, socket, correlation_id, parse::<MessageReplayPayload>(raw)?).await
        }

        t if t == frame_type::TYPING_START => presence::handle_typing_start(state, socket, parse::<TypingPayload>(raw)?).await,
        t if t == frame_type::TYPING_STOP => presence::handle_typing_stop(state, socket, parse::<TypingPayload>(raw)?).await,

        t if t == frame_type::ROOM_CREATE =>
        {
            rooms::handle_room_create(state, socket, correlation_id, parse::<RoomCreatePayload>(raw)?).await
        }
        t if t == frame_type::ROOM_JOIN => rooms::handle_room_join(state, socket, correlation_id, parse::<RoomIdPayload>(raw)?).await,
        t if t == frame_type::ROOM_LEAVE => rooms::handle_room_leave(state, socket, correlation_id, parse::<RoomIdPayload>(raw)?).await,
        t if t == frame_type::ROOM_MESSAGE =>
        {
            rooms::handle_room_message(state, socket, correlation_id, parse::<RoomMessagePayload>(raw)?).await
        }
        t if t == frame_type::ROOM_INFO => rooms::handle_room_info(state, socket, correlation_id, parse::<RoomIdPayload>(raw)?).await,
        t if t == frame_type::ROOM_LIST => rooms::handle_room_list(state, socket, correlation_id).await,
        t if t == frame_type::ROOM_MEMBERS =>
        {
            rooms::handle_room_members(state, socket, correlation_id, parse::<RoomIdPayload>(raw)?).await
        }
        t if t == frame_type::ROOM_UPDATE_META =>
        {
            rooms::handle_room_update_meta(state, socket, correlation_id, parse::<RoomUpdateMetaPayload>(raw)?).await
        }
        t if t == frame_type::ROOM_ADD_MEMBERS =>
        {
            rooms::handle_room_add_members(state, socket, correlation_id, parse::<RoomAddMembersPayload>(raw)?).await
        }
        t if t == frame_type::ROOM_REMOVE_MEMBER =>
        {
            rooms::handle_room_remove_member(state, socket, correlation_id, parse::<RoomRemoveMemberPayload>(raw)?).await
        }
        t if t == frame_type::ROOM_SET_ROLE =>
        {
            rooms::handle_room_set_role(state, socket, correlation_id, parse::<RoomSetRolePayload>(raw)?).await
        }
        t if t == frame_type::ROOM_DELETE =>
        {
            rooms::handle_room_delete(state, socket, correlation_id, parse::<RoomIdPayload>(raw)?).await
        }

        other => Err(ServiceError::new(ErrorCode::UnknownType, format!("unrecognized frame type '{other}'"))),
    }
}

//-------------------------------------------------------------------------------------------------------------------
