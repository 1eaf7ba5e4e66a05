//! In-memory message cache (spec §3, §4.5, §4.8): a write-through cache in front of the persistence adapter,
//! keyed by message id and by chat id for replay/ordering. The DB remains the source of truth; this store exists
//! to serve hot reads (dedupe checks, recent replay) without a round trip.

//local shortcuts
use crate::ids::MessageId;
use crate::model::{Message, MessageState};

//third-party shortcuts
use dashmap::DashMap;

//standard shortcuts
use std::collections::BTreeMap;
use std::sync::RwLock;

//-------------------------------------------------------------------------------------------------------------------

/// Per-chat ordered index, message id sorted (ids are time-monotonic, spec §3 "Identifiers").
type ChatIndex = RwLock<BTreeMap<MessageId, ()>>;

//-------------------------------------------------------------------------------------------------------------------

pub struct MessageStore
{
    by_id: DashMap<MessageId, Message>,
    by_chat: DashMap<String, ChatIndex>,
    /// Idempotency cache for inbound `(senderId, clientMessageId)` pairs (spec §4.5, advisory — DB check is
    /// authoritative, this is a fast-path only).
    client_message_cache: DashMap<(String, String), MessageId>,
}

impl MessageStore
{
    pub fn new() -> Self
    {
        Self{ by_id: DashMap::new(), by_chat: DashMap::new(), client_message_cache: DashMap::new() }
    }

    pub fn insert(&self, message: Message)
    {
        self.by_chat
            .entry(message.chat_id.clone())
            .or_insert_with(|| RwLock::new(BTreeMap::new()))
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(message.message_id.clone(), ());

        if let Some(client_message_id) = message.client_message_id.clone()
        {
            self.client_message_cache.insert((message.sender_id.clone(), client_message_id), message.message_id.clone());
        }

        self.by_id.insert(message.message_id.clone(), message);
    }

    pub fn get(&self, message_id: &str) -> Option<Message>
    {
        self.by_id.get(message_id).map(|e| e.clone())
    }

    pub fn update_state(&self, message_id: &str, next: MessageState) -> bool
    {
        if let Some(mut entry) = self.by_id.get_mut(message_id)
        {
            if entry.state.can_transition_to(next)
            {
                entry.state = next;
                return true;
            }
        }
        false
    }

    pub fn mark_edited(&self, message_id: &str, content: String, edited_at: i64)
    {
        if let Some(mut entry) = self.by_id.get_mut(message_id)
        {
            entry.content = content;
            entry.edited_at = Some(edited_at);
        }
    }

    pub fn mark_deleted(&self, message_id: &str, deleted_at: i64)
    {
        if let Some(mut entry) = self.by_id.get_mut(message_id)
        {
            entry.deleted_at = Some(deleted_at);
        }
    }

    /// Advisory idempotency check: has this sender already minted a message under this client id?
    pub fn lookup_client_message(&self, sender_id: &str, client_message_id: &str) -> Option<MessageId>
    {
        self.client_message_cache.get(&(sender_id.to_string(), client_message_id.to_string())).map(|e| e.clone())
    }

    /// Messages in `chat_id` with id strictly greater than `after` (exclusive), oldest-first, capped at `limit`
    /// (spec §4.8, "Replay").
    pub fn replay(&self, chat_id: &str, after: Option<&str>, limit: usize) -> Vec<Message>
    {
        let Some(index) = self.by_chat.get(chat_id) else { return Vec::new() };
        let index = index.read().unwrap_or_else(|e| e.into_inner());

        index
            .keys()
            .filter(|id| after.map(|a| id.as_str() > a).unwrap_or(true))
            .take(limit)
            .filter_map(|id| self.by_id.get(id).map(|e| e.clone()))
            .collect()
    }

    /// Flat candidate set for the replay engine: every message where `user_id` is the recipient, strictly after
    /// `after`, oldest-first, capped at `limit` (spec §4.7).
    pub fn candidates_for_user(&self, user_id: &str, after: Option<&str>, limit: usize) -> Vec<Message>
    {
        let mut matches: Vec<Message> = self
            .by_id
            .iter()
            .filter(|e| e.recipient_id.as_deref() == Some(user_id))
            .filter(|e| after.map(|a| e.message_id.as_str() > a).unwrap_or(true))
            .map(|e| e.clone())
            .collect();
        matches.sort_by(|a, b| a.message_id.cmp(&b.message_id));
        matches.truncate(limit);
        matches
    }

    /// Every per-recipient row belonging to a room broadcast, i.e. rows with a `room_message_id` and an actual
    /// `recipient_id` (the canonical room-message row itself has `recipient_id: None` and is excluded). Used to
    /// rehydrate a room delivery aggregate that was never started in this process (spec §4.7, step 4).
    pub fn per_recipient_rows(&self, room_message_id: &str) -> Vec<Message>
    {
        self.by_id
            .iter()
            .filter(|e| e.room_message_id.as_deref() == Some(room_message_id) && e.recipient_id.is_some())
            .map(|e| e.clone())
            .collect()
    }
}

impl Default for MessageStore
{
    fn default() -> Self
    {
        Self::new()
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::model::MessageType;

    fn sample(id: &str, chat_id: &str) -> Message
    {
        Message{
            message_id: id.to_string(),
            sender_id: "u1".to_string(),
            recipient_id: Some("u2".to_string()),
            room_id: None,
            room_message_id: None,
            content: "hi".to_string(),
            timestamp: 0,
            state: MessageState::Sending,
            client_message_id: None,
            message_type: MessageType::Direct,
            chat_id: chat_id.to_string(),
            edited_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn replay_respects_after_and_limit()
    {
        let store = MessageStore::new();
        store.insert(sample("0000000000001_a", "direct:u1:u2"));
        store.insert(sample("0000000000002_b", "direct:u1:u2"));
        store.insert(sample("0000000000003_c", "direct:u1:u2"));

        let page = store.replay("direct:u1:u2", Some("0000000000001_a"), 10);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].message_id, "0000000000002_b");
    }

    #[test]
    fn state_transitions_reject_backward_moves()
    {
        let store = MessageStore::new();
        store.insert(sample("m1", "direct:u1:u2"));
        assert!(store.update_state("m1", MessageState::Sent));
        assert!(!store.update_state("m1", MessageState::Sending));
    }
}

//-------------------------------------------------------------------------------------------------------------------
