//! Core domain types shared by the stores, services, and protocol layers (spec §3).

//local shortcuts
use crate::ids::*;

//third-party shortcuts
use serde::{Deserialize, Serialize};

//standard shortcuts
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

/// Message lifecycle state. Forward-only: `Sending -> Sent -> Delivered -> Read` (spec §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState
{
    Sending,
    Sent,
    Delivered,
    Read,
    /// Terminal state reached when an outbound send fails against a persisted message (spec §4.2).
    FailedBackpressure,
}

impl MessageState
{
    /// True if `self -> next` is a legal forward transition along the lattice.
    ///
    /// `FailedBackpressure` is reachable from any non-terminal state (a send can fail at any point after
    /// persistence) but nothing transitions out of it.
    pub fn can_transition_to(self, next: MessageState) -> bool
    {
        use MessageState::*;
        match (self, next)
        {
            (Sending, Sent) => true,
            (Sent, Delivered) => true,
            (Delivered, Read) => true,
            (Sending | Sent | Delivered, FailedBackpressure) => true,
            _ => false,
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Per-recipient delivery state. Monotonic: `Persisted -> Sent -> Delivered -> Read` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryState
{
    Persisted,
    Sent,
    Delivered,
    Read,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType
{
    Direct,
    Room,
}

//-------------------------------------------------------------------------------------------------------------------

/// A persisted message row, mirrored in the in-memory message cache (spec §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message
{
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: Option<UserId>,
    pub room_id: Option<RoomId>,
    pub room_message_id: Option<RoomMessageId>,
    pub content: String,
    pub timestamp: i64,
    pub state: MessageState,
    pub client_message_id: Option<ClientMessageId>,
    pub message_type: MessageType,
    pub chat_id: String,
    pub edited_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

//-------------------------------------------------------------------------------------------------------------------

/// Ready state of a transport-level socket (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState
{
    Open,
    Closing,
    Closed,
}

//-------------------------------------------------------------------------------------------------------------------

/// Immutable per-socket context populated at connect/rehydrate time. Never reused across reconnects (spec §3).
#[derive(Debug, Clone)]
pub struct SocketContext
{
    pub user_id: UserId,
    pub role: Role,
    pub capabilities: Capabilities,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{
    Admin,
    User,
}

//-------------------------------------------------------------------------------------------------------------------

/// Capabilities derived from role at connect time (spec §6, "Upon accept").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities
{
    pub admin: bool,
    pub send_message: bool,
}

impl Capabilities
{
    pub fn for_role(role: Role) -> Self
    {
        match role
        {
            Role::Admin => Self{ admin: true, send_message: true },
            Role::User => Self{ admin: false, send_message: true },
        }
    }

    /// Validity check used by zombie detection (spec §4.3): the admin flag must match the role-derived capability.
    pub fn is_consistent_with(&self, role: Role) -> bool
    {
        self.admin == (role == Role::Admin)
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Room membership role (spec §4.6, RBAC matrix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomRole
{
    Member,
    Admin,
    Owner,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMeta
{
    pub name: String,
    pub thumbnail_url: Option<String>,
    pub created_at: i64,
    pub created_by: UserId,
}

//-------------------------------------------------------------------------------------------------------------------

/// Room record (spec §3). Membership, roles, and join order are tracked alongside metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room
{
    pub room_id: RoomId,
    pub meta: RoomMeta,
    pub roles: std::collections::HashMap<UserId, RoomRole>,
    pub joined_at: std::collections::HashMap<UserId, i64>,
    pub version: u64,
    pub updated_at: i64,
}

impl Room
{
    pub fn owner(&self) -> Option<&UserId>
    {
        self.roles.iter().find(|(_, role)| **role == RoomRole::Owner).map(|(id, _)| id)
    }

    /// Oldest member holding `role`, by join time, excluding `exclude`.
    pub fn oldest_with_role(&self, role: RoomRole, exclude: &str) -> Option<UserId>
    {
        self.roles
            .iter()
            .filter(|(id, r)| **r == role && id.as_str() != exclude)
            .filter_map(|(id, _)| self.joined_at.get(id).map(|t| (id.clone(), *t)))
            .min_by_key(|(_, t)| *t)
            .map(|(id, _)| id)
    }

    pub fn members(&self) -> impl Iterator<Item = &UserId>
    {
        self.roles.keys()
    }

    /// Deterministic recipient set for fan-out: all members minus `exclude`, sorted (spec §4.6).
    pub fn recipients_excluding(&self, exclude: &str) -> BTreeSet<UserId>
    {
        self.roles.keys().filter(|id| id.as_str() != exclude).cloned().collect()
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Tracks completion of a room broadcast: complete once `delivered.len() >= total_recipients` (spec §3).
#[derive(Debug, Clone, Default)]
pub struct RoomDeliveryAggregate
{
    pub total_recipients: usize,
    pub delivered: HashSet<UserId>,
}

impl RoomDeliveryAggregate
{
    pub fn is_complete(&self) -> bool
    {
        self.delivered.len() >= self.total_recipients
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus
{
    Online,
    Away,
    Offline,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PresenceRecord
{
    pub status: PresenceStatus,
    pub last_seen: i64,
}

//-------------------------------------------------------------------------------------------------------------------

/// A per-socket heartbeat round-trip sample, retained only for observability (spec §4.3, SPEC_FULL §3).
#[derive(Debug, Clone, Copy)]
pub struct LatencySample
{
    pub measured_at: Instant,
    pub rtt_millis: u64,
}

//-------------------------------------------------------------------------------------------------------------------

/// Bounded FIFO of recent heartbeat RTT samples (SPEC_FULL §3, "kept as a small ring buffer"). Oldest sample is
/// evicted once the buffer is full; never exposed over the wire, observability only.
const LATENCY_RING_CAPACITY: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct LatencyRingBuffer
{
    samples: VecDeque<LatencySample>,
}

impl LatencyRingBuffer
{
    pub fn push(&mut self, sample: LatencySample)
    {
        if self.samples.len() == LATENCY_RING_CAPACITY
        {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<LatencySample>
    {
        self.samples.back().copied()
    }

    pub fn samples(&self) -> impl Iterator<Item = &LatencySample>
    {
        self.samples.iter()
    }
}

//-------------------------------------------------------------------------------------------------------------------
