//! Outbound frame types (spec §6, "Key outbound types").
//!
//! Unlike inbound frames, outbound frames are entirely constructed by this service, so a single internally-tagged
//! enum serializes cleanly — no two-stage parse is needed on the way out.

//local shortcuts
use crate::ids::*;
use crate::model::{MessageState, Room, RoomRole};

//third-party shortcuts
use serde::Serialize;

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundFrame
{
    SystemCapabilities
    {
        admin: bool,
    },
    ConnectionEstablished
    {
        #[serde(rename = "isReconnect")]
        is_reconnect: bool,
        #[serde(rename = "connectionCount")]
        connection_count: usize,
    },
    PresenceSnapshot
    {
        online: Vec<UserId>,
    },
    StateSyncResponse
    {
        #[serde(rename = "unreadDirect")]
        unread_direct: usize,
        rooms: Vec<RoomSummary>,
    },
    HelloAck
    {
        version: String,
    },
    MessageAck
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "clientMessageId")]
        client_message_id: Option<ClientMessageId>,
        state: MessageState,
        timestamp: i64,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        duplicate: bool,
    },
    MessageNack
    {
        #[serde(rename = "clientMsgId")]
        client_msg_id: Option<ClientMessageId>,
        code: crate::error::ErrorCode,
        message: String,
        #[serde(rename = "serverTs")]
        server_ts: i64,
    },
    MessageReceive
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "senderId")]
        sender_id: UserId,
        content: String,
        timestamp: i64,
    },
    DeliveryStatus
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        status: DeliveryStatusValue,
    },
    MessageStateUpdate
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        state: MessageState,
    },
    MessageRead
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "readerId")]
        reader_id: UserId,
    },
    MessageMutation
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        kind: MutationKind,
        content: Option<String>,
    },
    MessageMutationAck
    {
        #[serde(rename = "messageId")]
        message_id: MessageId,
        kind: MutationKind,
    },
    RoomMessage
    {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "roomMessageId")]
        room_message_id: RoomMessageId,
        #[serde(rename = "messageId")]
        message_id: MessageId,
        #[serde(rename = "senderId")]
        sender_id: UserId,
        content: String,
        timestamp: i64,
    },
    RoomDeliveryUpdate
    {
        #[serde(rename = "roomMessageId")]
        room_message_id: RoomMessageId,
        delivered: usize,
        total: usize,
        complete: bool,
    },
    RoomCreated
    {
        room: RoomSummary,
    },
    RoomMembersUpdated
    {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        members: Vec<RoomMemberSummary>,
        version: u64,
    },
    RoomUpdated
    {
        room: RoomSummary,
    },
    RoomDeleted
    {
        #[serde(rename = "roomId")]
        room_id: RoomId,
    },
    RoomsSnapshot
    {
        rooms: Vec<RoomSummary>,
    },
    PresenceUpdate
    {
        #[serde(rename = "userId")]
        user_id: UserId,
        status: crate::model::PresenceStatus,
    },
    TypingStart
    {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    TypingStop
    {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    MessageReplayComplete
    {
        messages: Vec<OutboundFrame>,
        #[serde(rename = "messageCount")]
        message_count: usize,
        #[serde(rename = "lastMessageId")]
        last_message_id: Option<MessageId>,
        #[serde(rename = "requestedAfter")]
        requested_after: Option<MessageId>,
    },
    ResyncStart,
    ResyncComplete,
    RateLimitWarning
    {
        #[serde(rename = "retryAfterMs")]
        retry_after_ms: u64,
    },
    Error
    {
        code: crate::error::ErrorCode,
        message: String,
    },
    MessageError
    {
        code: crate::error::ErrorCode,
        message: String,
        #[serde(rename = "retryAfterMs", skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    ServerShutdown,
}

impl OutboundFrame
{
    /// Attaches a correlation id by wrapping in the generic envelope (every outbound frame may carry one, spec §6).
    pub fn with_correlation(self, correlation_id: Option<CorrelationId>) -> EnvelopedOutbound
    {
        EnvelopedOutbound{ frame: self, correlation_id }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Wraps an [`OutboundFrame`] with the correlation id of the inbound frame that triggered it, when applicable.
#[derive(Debug, Clone, Serialize)]
pub struct EnvelopedOutbound
{
    #[serde(flatten)]
    pub frame: OutboundFrame,
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatusValue
{
    Delivered,
    RecipientOffline,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind
{
    Edit,
    Delete,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RoomSummary
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    pub name: String,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
    #[serde(rename = "memberCount")]
    pub member_count: usize,
    pub version: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
}

impl From<&Room> for RoomSummary
{
    fn from(room: &Room) -> Self
    {
        Self{
            room_id: room.room_id.clone(),
            name: room.meta.name.clone(),
            thumbnail_url: room.meta.thumbnail_url.clone(),
            member_count: room.roles.len(),
            version: room.version,
            updated_at: room.updated_at,
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RoomMemberSummary
{
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub role: RoomRole,
}

//-------------------------------------------------------------------------------------------------------------------
