//! Inbound frame types (spec §4.4, "Inbound frame set").
//!
//! Frames are parsed in two stages: [`InboundEnvelope`] extracts the dispatch key (`type`), the optional
//! `correlationId`, and the optional `version`, leaving the rest as a raw [`serde_json::Value`]; the router then
//! deserializes that raw value into the per-type payload named here. This mirrors the "parse -> schema validate"
//! split in spec §4.2/§4.4 and lets an unrecognized-but-well-formed `type` be distinguished from truly malformed
//! JSON (SPEC_FULL §4.4).

//local shortcuts
use crate::ids::*;

//third-party shortcuts
use serde::Deserialize;

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope
{
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: Option<CorrelationId>,
    pub version: Option<String>,
    #[serde(flatten)]
    pub raw: serde_json::Value,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct HelloPayload
{
    pub version: String,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MessageSendPayload
{
    #[serde(rename = "recipientId")]
    pub recipient_id: UserId,
    pub content: String,
    #[serde(rename = "clientMessageId")]
    pub client_message_id: Option<ClientMessageId>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfirmPayload
{
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MessageEditPayload
{
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
    pub content: String,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeletePayload
{
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MessageReplayPayload
{
    #[serde(rename = "lastMessageId")]
    pub last_message_id: Option<MessageId>,
    pub limit: Option<usize>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ResumePayload
{
    #[serde(rename = "lastMessageId")]
    pub last_message_id: Option<MessageId>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TypingPayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomCreatePayload
{
    pub name: String,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomIdPayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomMessagePayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    pub content: String,
    #[serde(rename = "clientMessageId")]
    pub client_message_id: Option<ClientMessageId>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomUpdateMetaPayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    pub name: Option<String>,
    #[serde(rename = "thumbnailUrl")]
    pub thumbnail_url: Option<String>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomAddMembersPayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(rename = "memberIds")]
    pub member_ids: Vec<UserId>,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomRemoveMemberPayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(rename = "memberId")]
    pub member_id: UserId,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RoomSetRolePayload
{
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
    #[serde(rename = "memberId")]
    pub member_id: UserId,
    pub role: crate::model::RoomRole,
}

//-------------------------------------------------------------------------------------------------------------------

/// The dispatch key for every inbound frame, named 1:1 with spec §4.4's frame set.
pub mod frame_type
{
    pub const HELLO: &str = "HELLO";
    pub const MESSAGE_SEND: &str = "MESSAGE_SEND";
    pub const MESSAGE_READ: &str = "MESSAGE_READ";
    pub const MESSAGE_READ_CONFIRM: &str = "MESSAGE_READ_CONFIRM";
    pub const MESSAGE_DELIVERED_CONFIRM: &str = "MESSAGE_DELIVERED_CONFIRM";
    pub const MESSAGE_EDIT: &str = "MESSAGE_EDIT";
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
    pub const MESSAGE_REPLAY: &str = "MESSAGE_REPLAY";
    pub const STATE_SYNC: &str = "STATE_SYNC";
    pub const RESUME: &str = "RESUME";
    pub const PRESENCE_PING: &str = "PRESENCE_PING";
    pub const CLIENT_ACK: &str = "CLIENT_ACK";
    pub const PING: &str = "PING";
    pub const TYPING_START: &str = "TYPING_START";
    pub const TYPING_STOP: &str = "TYPING_STOP";
    pub const ROOM_CREATE: &str = "ROOM_CREATE";
    pub const ROOM_JOIN: &str = "ROOM_JOIN";
    pub const ROOM_LEAVE: &str = "ROOM_LEAVE";
    pub const ROOM_MESSAGE: &str = "ROOM_MESSAGE";
    pub const ROOM_INFO: &str = "ROOM_INFO";
    pub const ROOM_LIST: &str = "ROOM_LIST";
    pub const ROOM_MEMBERS: &str = "ROOM_MEMBERS";
    pub const ROOM_UPDATE_META: &str = "ROOM_UPDATE_META";
    pub const ROOM_ADD_MEMBERS: &str = "ROOM_ADD_MEMBERS";
    pub const ROOM_REMOVE_MEMBER: &str = "ROOM_REMOVE_MEMBER";
    pub const ROOM_SET_ROLE: &str = "ROOM_SET_ROLE";
    pub const ROOM_DELETE: &str = "ROOM_DELETE";

    /// Noise types that bypass the generic per-socket rate limiter entirely (spec §4.2).
    pub const NOISE_TYPES: &[&str] = &[
        PING,
        CLIENT_ACK,
        MESSAGE_DELIVERED_CONFIRM,
        MESSAGE_READ_CONFIRM,
        PRESENCE_PING,
        RESUME,
        STATE_SYNC,
        MESSAGE_REPLAY,
        TYPING_START,
        TYPING_STOP,
    ];

    /// Sensitive room-admin actions subject to the stricter per-user limiter (spec §4.4).
    pub const SENSITIVE_TYPES: &[&str] = &[
        ROOM_CREATE,
        ROOM_DELETE,
        ROOM_SET_ROLE,
        ROOM_REMOVE_MEMBER,
        ROOM_ADD_MEMBERS,
    ];
}

//-------------------------------------------------------------------------------------------------------------------
