//! Message lifecycle service (spec §4.5). The only writer of message records; builds ACK/NACK payloads but
//! never sends them — callers (handlers, via the router) push the returned payload through the outbound path.
//!
//! Direct messages have exactly one recipient, so the message's own `state` doubles as that recipient's
//! delivery record; a dedicated per-recipient delivery table is only needed for room fan-out, where multiple
//! recipients track independent state against the same logical send (see [`crate::services::delivery`]).

//local shortcuts
use crate::config::AppConfig;
use crate::db::DbAdapter;
use crate::error::{DbError, ErrorCode, ServiceError, ServiceResult};
use crate::ids::{self, ClientMessageId, MessageId, UserId};
use crate::model::{Message, MessageState, MessageType};
use crate::stores::Stores;

//third-party shortcuts

//standard shortcuts
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

//-------------------------------------------------------------------------------------------------------------------

fn now_millis() -> i64
{
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

fn db_err(err: DbError) -> ServiceError
{
    ServiceError::new(ErrorCode::InternalError, err.to_string())
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MessageAckOutcome
{
    pub message_id: MessageId,
    pub client_message_id: Option<ClientMessageId>,
    pub state: MessageState,
    pub timestamp: i64,
    pub duplicate: bool,
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfirmOutcome
{
    pub message: Message,
    pub already_in_state: bool,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct LifecycleService
{
    stores: Arc<Stores>,
    db: Arc<dyn DbAdapter>,
    config: AppConfig,
}

impl LifecycleService
{
    pub fn new(stores: Arc<Stores>, db: Arc<dyn DbAdapter>, config: AppConfig) -> Self
    {
        Self{ stores, db, config }
    }

    fn ack_from(message: &Message, duplicate: bool) -> MessageAckOutcome
    {
        MessageAckOutcome{
            message_id: message.message_id.clone(),
            client_message_id: message.client_message_id.clone(),
            state: message.state,
            timestamp: message.timestamp,
            duplicate,
        }
    }

    /// Accept -> persist -> ACK, as one atomic-from-the-caller's-view operation per spec §4.5. ACK is never
    /// built before the DB write succeeds.
    pub async fn send_direct_message(
        &self,
        sender_id: UserId,
        recipient_id: UserId,
        content: String,
        client_message_id: Option<ClientMessageId>,
    ) -> ServiceResult<MessageAckOutcome>
    {
        if content.len() > self.config.max_content_length
        {
            return Err(ServiceError::new(ErrorCode::ContentTooLong, "message content exceeds the configured limit"));
        }

        if let Some(cmid) = &client_message_id
        {
            if let Some(existing_id) = self.stores.messages.lookup_client_message(&sender_id, cmid)
            {
                if let Some(existing) = self.stores.messages.get(&existing_id)
                {
                    return Ok(Self::ack_from(&existing, true));
                }
            }
            if let Some(existing_id) =
                self.db.find_by_client_message_id(&sender_id, cmid).await.map_err(db_err)?
            {
                if let Some(existing) = self.db.find_message(&existing_id).await.map_err(db_err)?
                {
                    self.stores.messages.insert(existing.clone());
                    return Ok(Self::ack_from(&existing, true));
                }
            }
        }

        let message_id = ids::new_message_id();
        let chat_id = ids::direct_chat_id(&sender_id, &recipient_id);
        let timestamp = now_millis();

        let message = Message{
            message_id: message_id.clone(),
            sender_id: sender_id.clone(),
            recipient_id: Some(recipient_id.clone()),
            room_id: None,
            room_message_id: None,
            content,
            timestamp,
            state: MessageState::Sending,
            client_message_id: client_message_id.clone(),
            message_type: MessageType::Direct,
            chat_id,
            edited_at: None,
            deleted_at: None,
        };

        match self.db.insert_message(&message).await
        {
            Ok(()) => {}
            Err(DbError::UniqueViolation(_)) =>
            {
                if let Some(cmid) = &client_message_id
                {
                    if let Some(existing_id) = self.db.find_by_client_message_id(&sender_id, cmid).await.map_err(db_err)?
                    {
                        if let Some(existing) = self.db.find_message(&existing_id).await.map_err(db_err)?
                        {
                            self.stores.messages.insert(existing.clone());
                            return Ok(Self::ack_from(&existing, true));
                        }
                    }
                }
                return Err(ServiceError::new(ErrorCode::InternalError, "duplicate message could not be resolved"));
            }
            Err(other) => return Err(db_err(other)),
        }

        crate::observability::message_created(&message_id, &sender_id, None);
        self.stores.messages.insert(message.clone());

        self.db.update_message_state(&message_id, MessageState::Sent).await.map_err(db_err)?;
        self.stores.messages.update_state(&message_id, MessageState::Sent);
        let mut final_state = MessageState::Sent;

        if recipient_id == sender_id
        {
            self.db.update_message_state(&message_id, MessageState::Delivered).await.map_err(db_err)?;
            self.stores.messages.update_state(&message_id, MessageState::Delivered);
            final_state = MessageState::Delivered;
        }

        crate::observability::message_sent(&message_id);

        Ok(MessageAckOutcome{ message_id, client_message_id, state: final_state, timestamp, duplicate: false })
    }

    /// Re-reads the DB row (authoritative), validates the transition, and writes state atomically. Idempotent:
    /// a message already at or past `target` returns `already_in_state:true` without writing (spec §4.5).
    pub async fn confirm_direct(&self, user_id: &str, message_id: &str, target: MessageState) -> ServiceResult<ConfirmOutcome>
    {
        self.confirm(user_id, message_id, target).await
    }

    /// Shared low-level transition used for both direct confirmations and per-recipient room confirmations.
    pub async fn confirm(&self, user_id: &str, message_id: &str, target: MessageState) -> ServiceResult<ConfirmOutcome>
    {
        let message = self.db.find_message(message_id).await.map_err(db_err)?
            .ok_or_else(|| ServiceError::new(ErrorCode::MessageNotFound, "message does not exist"))?;

        if message.message_type == MessageType::Direct
        {
            let recipient = message.recipient_id.as_deref().unwrap_or_default();
            if recipient != user_id
            {
                return Err(ServiceError::new(ErrorCode::Forbidden, "only the recipient may confirm this message"));
            }
        }

        if message.message_type == MessageType::Room && target == MessageState::Read
        {
            return Err(ServiceError::new(ErrorCode::RoomReadNotSupported, "room messages do not support READ"));
        }

        if message.state == target || (message.state > target && message.state != MessageState::FailedBackpressure)
        {
            return Ok(ConfirmOutcome{ message, already_in_state: true });
        }

        if !message.state.can_transition_to(target)
        {
            return Err(ServiceError::new(ErrorCode::InvalidTransition, "illegal message state transition"));
        }

        self.db.update_message_state(message_id, target).await.map_err(db_err)?;
        self.stores.messages.update_state(message_id, target);

        let mut updated = message;
        updated.state = target;
        crate::observability::message_delivered(&updated.message_id, &user_id.to_string());

        Ok(ConfirmOutcome{ message: updated, already_in_state: false })
    }

    /// Marks a persisted message as having failed outbound delivery (spec §4.2, "Outbound backpressure"). Reachable
    /// from any non-terminal state; a no-op if the message is already terminal.
    pub async fn mark_failed_backpressure(&self, message_id: &str)
    {
        let Some(message) = self.stores.messages.get(message_id) else { return };
        if !message.state.can_transition_to(MessageState::FailedBackpressure)
        {
            return;
        }
        if self.db.update_message_state(message_id, MessageState::FailedBackpressure).await.is_ok()
        {
            self.stores.messages.update_state(message_id, MessageState::FailedBackpressure);
            crate::observability::message_failed(&message_id.to_string(), "outbound backpressure");
        }
    }

    pub async fn edit_message(&self, user_id: &str, message_id: &str, content: String) -> ServiceResult<Message>
    {
        let message = self.db.find_message(message_id).await.map_err(db_err)?
            .ok_or_else(|| ServiceError::new(ErrorCode::MessageNotFound, "message does not exist"))?;
        if message.sender_id != user_id
        {
            return Err(ServiceError::new(ErrorCode::Forbidden, "only the sender may edit this message"));
        }
        if content.len() > self.config.max_content_length
        {
            return Err(ServiceError::new(ErrorCode::ContentTooLong, "message content exceeds the configured limit"));
        }

        let edited_at = now_millis();
        self.db.mark_edited(message_id, &content, edited_at).await.map_err(db_err)?;
        self.stores.messages.mark_edited(message_id, content.clone(), edited_at);

        let mut updated = message;
        updated.content = content;
        updated.edited_at = Some(edited_at);
        Ok(updated)
    }

    pub async fn delete_message(&self, user_id: &str, message_id: &str) -> ServiceResult<Message>
    {
        let message = self.db.find_message(message_id).await.map_err(db_err)?
            .ok_or_else(|| ServiceError::new(ErrorCode::MessageNotFound, "message does not exist"))?;
        if message.sender_id != user_id
        {
            return Err(ServiceError::new(ErrorCode::Forbidden, "only the sender may delete this message"));
        }

        let deleted_at = now_millis();
        self.db.mark_deleted(message_id, deleted_at).await.map_err(db_err)?;
        self.stores.messages.mark_deleted(message_id, deleted_at);

        let mut updated = message;
        updated.deleted_at = Some(deleted_at);
        Ok(updated)
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::db::InMemoryAdapter;

    fn service() -> LifecycleService
    {
        LifecycleService::new(Arc::new(Stores::new()), Arc::new(InMemoryAdapter::new()), AppConfig::default())
    }

    #[tokio::test]
    async fn duplicate_send_returns_same_message_id()
    {
        let service = service();
        let first = service
            .send_direct_message("u1".into(), "u2".into(), "hi".into(), Some("c1".into()))
            .await
            .unwrap();
        assert!(!first.duplicate);

        let second = service
            .send_direct_message("u1".into(), "u2".into(), "hi again".into(), Some("c1".into()))
            .await
            .unwrap();
        assert!(second.duplicate);
        assert_eq!(second.message_id, first.message_id);
    }

    #[tokio::test]
    async fn confirm_delivered_then_read_is_idempotent_on_repeat()
    {
        let service = service();
        let ack = service.send_direct_message("u1".into(), "u2".into(), "hi".into(), None).await.unwrap();

        let delivered = service.confirm("u2", &ack.message_id, MessageState::Delivered).await.unwrap();
        assert!(!delivered.already_in_state);

        let repeat = service.confirm("u2", &ack.message_id, MessageState::Delivered).await.unwrap();
        assert!(repeat.already_in_state);
    }

    #[tokio::test]
    async fn wrong_recipient_cannot_confirm()
    {
        let service = service();
        let ack = service.send_direct_message("u1".into(), "u2".into(), "hi".into(), None).await.unwrap();
        let result = service.confirm("u3", &ack.message_id, MessageState::Delivered).await;
        assert!(matches!(result, Err(e) if e.code == ErrorCode::Forbidden));
    }
}

//-------------------------------------------------------------------------------------------------------------------
