//module tree
pub mod memory;
pub mod sqlite;

//API exports
pub use memory::InMemoryAdapter;
pub use sqlite::SqliteAdapter;

//-------------------------------------------------------------------------------------------------------------------

//local shortcuts
use crate::error::DbResult;
use crate::ids::{ClientMessageId, MessageId, UserId};
use crate::model::{Message, MessageState, Room, RoomMeta, RoomRole};

//third-party shortcuts
use async_trait::async_trait;

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

/// Persistence boundary (spec §4.5, §6 "Persisted state layout"). Every mutation that must survive a crash goes
/// through here first; the in-memory stores are a cache in front of it, never the source of truth.
///
/// Kept as a trait (rather than a concrete `SqliteAdapter`) so tests and local tooling can swap in
/// [`InMemoryAdapter`] without touching the services that depend on it.
#[async_trait]
pub trait DbAdapter: Send + Sync
{
    async fn insert_message(&self, message: &Message) -> DbResult<()>;
    async fn find_message(&self, message_id: &str) -> DbResult<Option<Message>>;
    async fn update_message_state(&self, message_id: &str, state: MessageState) -> DbResult<()>;
    async fn mark_edited(&self, message_id: &str, content: &str, edited_at: i64) -> DbResult<()>;
    async fn mark_deleted(&self, message_id: &str, deleted_at: i64) -> DbResult<()>;

    /// Crash-safe idempotency check: has `sender_id` already persisted a message under `client_message_id`?
    /// This is the authoritative guard; the in-memory cache check is advisory and runs second (spec §4.5).
    async fn find_by_client_message_id(
        &self,
        sender_id: &str,
        client_message_id: &ClientMessageId,
    ) -> DbResult<Option<MessageId>>;

    async fn replay_chat(&self, chat_id: &str, after: Option<&str>, limit: usize) -> DbResult<Vec<Message>>;

    /// Every persisted per-recipient row for a room broadcast (spec §4.7, step 4) — lets a room delivery
    /// aggregate be reconstructed after a restart wiped the in-memory table.
    async fn find_room_message_recipients(&self, room_message_id: &str) -> DbResult<Vec<Message>>;

    /// Every message where `user_id` is the recipient (direct sends and per-recipient room rows alike),
    /// strictly after `after`, oldest-first, capped at `limit` — the flat candidate set the replay engine walks
    /// (spec §4.7, step 2).
    async fn replay_candidates_for_user(&self, user_id: &str, after: Option<&str>, limit: usize) -> DbResult<Vec<Message>>;

    async fn upsert_room(&self, room: &Room) -> DbResult<()>;
    async fn find_room(&self, room_id: &str) -> DbResult<Option<Room>>;
    async fn delete_room(&self, room_id: &str) -> DbResult<()>;
    async fn rooms_for_user(&self, user_id: &str) -> DbResult<Vec<Room>>;

    async fn set_room_role(&self, room_id: &str, user_id: &str, role: RoomRole) -> DbResult<()>;
    async fn remove_room_member(&self, room_id: &str, user_id: &str) -> DbResult<()>;
}

//-------------------------------------------------------------------------------------------------------------------

/// Helper shared by both adapters for reconstructing a [`RoomMeta`] default when inserting a freshly created room.
pub(crate) fn new_room_meta(name: String, thumbnail_url: Option<String>, created_by: UserId, created_at: i64) -> RoomMeta
{
    RoomMeta{ name, thumbnail_url, created_at, created_by }
}

//-------------------------------------------------------------------------------------------------------------------
