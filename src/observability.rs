//! Structured observability events (spec §9). Each named point below corresponds 1:1 to the event names the
//! spec calls out; everything is emitted through `tracing` rather than ad-hoc console logging.

//local shortcuts
use crate::ids::{CorrelationId, MessageId, RoomId, SessionId, SocketId, UserId};

//third-party shortcuts
use tracing::{info, warn};

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

pub fn message_created(message_id: &MessageId, sender_id: &UserId, correlation_id: Option<&CorrelationId>)
{
    info!(event = "MESSAGE_CREATED", %message_id, %sender_id, correlation_id = ?correlation_id);
}

pub fn message_sent(message_id: &MessageId)
{
    info!(event = "MESSAGE_SENT", %message_id);
}

pub fn message_delivered(message_id: &MessageId, user_id: &UserId)
{
    info!(event = "MESSAGE_DELIVERED", %message_id, %user_id);
}

pub fn message_failed(message_id: &MessageId, reason: &str)
{
    warn!(event = "MESSAGE_FAILED", %message_id, reason);
}

pub fn message_dropped(socket_id: SocketId, frame_type: &str, reason: &str)
{
    warn!(event = "MESSAGE_DROPPED", socket_id, frame_type, reason);
}

pub fn safety_checked(socket_id: SocketId, frame_type: &str, outcome: &str)
{
    info!(event = "SAFETY_CHECKED", socket_id, frame_type, outcome);
}

pub fn connection_open(socket_id: SocketId, session_id: &SessionId, user_id: &UserId)
{
    info!(event = "CONNECTION_OPEN", socket_id, %session_id, %user_id);
}

pub fn connection_close(socket_id: SocketId, session_id: &SessionId, code: u16)
{
    info!(event = "CONNECTION_CLOSE", socket_id, %session_id, code);
}

pub fn presence_online(user_id: &UserId)
{
    info!(event = "PRESENCE_ONLINE", %user_id);
}

pub fn presence_offline(user_id: &UserId)
{
    info!(event = "PRESENCE_OFFLINE", %user_id);
}

pub fn room_fanout(room_id: &RoomId, recipient_count: usize)
{
    info!(event = "ROOM_FANOUT", %room_id, recipient_count);
}

pub fn heartbeat_rtt(socket_id: SocketId, rtt_millis: u64)
{
    info!(event = "HEARTBEAT_RTT", socket_id, rtt_millis);
}

//-------------------------------------------------------------------------------------------------------------------
