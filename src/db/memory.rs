//! In-process [`DbAdapter`] for tests and local development, backed by the same store types used for the hot
//! cache. Has no durability; a process restart loses everything.

//local shortcuts
use crate::db::DbAdapter;
use crate::error::{DbError, DbResult};
use crate::model::{Message, MessageState, Room, RoomRole};
use crate::stores::{MessageStore, RoomStore};

//third-party shortcuts
use async_trait::async_trait;
use dashmap::DashMap;

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryAdapter
{
    messages: MessageStore,
    rooms: RoomStore,
    client_message_index: DashMap<(String, String), String>,
}

impl InMemoryAdapter
{
    pub fn new() -> Self
    {
        Self::default()
    }
}

#[async_trait]
impl DbAdapter for InMemoryAdapter
{
    async fn insert_message(&self, message: &Message) -> DbResult<()>
    {
        if let Some(client_message_id) = &message.client_message_id
        {
            let key = (message.sender_id.clone(), client_message_id.clone());
            if self.client_message_index.contains_key(&key)
            {
                return Err(DbError::UniqueViolation("client_message_id"));
            }
            self.client_message_index.insert(key, message.message_id.clone());
        }
        self.messages.insert(message.clone());
        Ok(())
    }

    async fn find_message(&self, message_id: &str) -> DbResult<Option<Message>>
    {
        Ok(self.messages.get(message_id))
    }

    async fn update_message_state(&self, message_id: &str, state: MessageState) -> DbResult<()>
    {
        if self.messages.update_state(message_id, state) { Ok(()) } else { Err(DbError::NotFound) }
    }

    async fn mark_edited(&self, message_id: &str, content: &str, edited_at: i64) -> DbResult<()>
    {
        self.messages.mark_edited(message_id, content.to_string(), edited_at);
        Ok(())
    }

    async fn mark_deleted(&self, message_id: &str, deleted_at: i64) -> DbResult<()>
    {
        self.messages.mark_deleted(message_id, deleted_at);
        Ok(())
    }

    async fn find_by_client_message_id(
        &self,
        sender_id: &str,
        client_message_id: &crate::ids::ClientMessageId,
    ) -> DbResult<Option<String>>
    {
        Ok(self.client_message_index.get(&(sender_id.to_string(), client_message_id.to_string())).map(|e| e.clone()))
    }

    async fn replay_chat(&self, chat_id: &str, after: Option<&str>, limit: usize) -> DbResult<Vec<Message>>
    {
        Ok(self.messages.replay(chat_id, after, limit))
    }

    async fn replay_candidates_for_user(&self, user_id: &str, after: Option<&str>, limit: usize) -> DbResult<Vec<Message>>
    {
        Ok(self.messages.candidates_for_user(user_id, after, limit))
    }

    async fn find_room_message_recipients(&self, room_message_id: &str) -> DbResult<Vec<Message>>
    {
        Ok(self.messages.per_recipient_rows(room_message_id))
    }

    async fn upsert_room(&self, room: &Room) -> DbResult<()>
    {
        if self.rooms.exists(&room.room_id)
        {
            self.rooms.update_meta(&room.room_id, Some(room.meta.name.clone()), room.meta.thumbnail_url.clone(), room.updated_at);
        }
        else
        {
            let owner = room.owner().cloned().unwrap_or_default();
            self.rooms.create(room.room_id.clone(), room.meta.clone(), owner, room.meta.created_at);
        }
        Ok(())
    }

    async fn find_room(&self, room_id: &str) -> DbResult<Option<Room>>
    {
        Ok(self.rooms.get(room_id))
    }

    async fn delete_room(&self, room_id: &str) -> DbResult<()>
    {
        self.rooms.delete(room_id);
        Ok(())
    }

    async fn rooms_for_user(&self, user_id: &str) -> DbResult<Vec<Room>>
    {
        Ok(self.rooms.rooms_for_user(user_id))
    }

    async fn set_room_role(&self, room_id: &str, user_id: &str, role: RoomRole) -> DbResult<()>
    {
        self.rooms.set_role(room_id, user_id, role, 0);
        Ok(())
    }

    async fn remove_room_member(&self, room_id: &str, user_id: &str) -> DbResult<()>
    {
        self.rooms.remove_member(room_id, user_id, 0);
        Ok(())
    }
}

//-------------------------------------------------------------------------------------------------------------------
