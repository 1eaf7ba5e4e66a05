//! Replay engine (spec §4.7). Re-delivers already-persisted-but-undelivered messages on reconnect. Never
//! persists new messages, never mutates content. The DB delivery check runs before the memory-cache check on
//! every candidate — the DB guard is crash-safe, the cache is advisory only.

//local shortcuts
use crate::config::AppConfig;
use crate::db::DbAdapter;
use crate::error::{ErrorCode, ServiceError, ServiceResult};
use crate::ids::MessageId;
use crate::model::{Message, MessageState, MessageType};
use crate::stores::Stores;

//third-party shortcuts
use tokio::time::timeout;

//standard shortcuts
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

pub struct ReplayOutcome
{
    pub messages: Vec<Message>,
    pub last_message_id: Option<MessageId>,
    pub requested_after: Option<MessageId>,
    /// For each direct message actually replayed, the sender to notify with a `MESSAGE_STATE_UPDATE`.
    pub sender_notifications: Vec<(String, MessageId)>,
    /// For each room message whose aggregate completed as a result of this replay, the sender to notify plus the
    /// final `(delivered, total)` counts.
    pub room_completions: Vec<(String, crate::ids::RoomMessageId, usize, usize)>,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct ReplayEngine
{
    stores: Arc<Stores>,
    db: Arc<dyn DbAdapter>,
    config: AppConfig,
}

impl ReplayEngine
{
    pub fn new(stores: Arc<Stores>, db: Arc<dyn DbAdapter>, config: AppConfig) -> Self
    {
        Self{ stores, db, config }
    }

    pub async fn replay(&self, user_id: &str, last_message_id: Option<MessageId>, limit: Option<usize>) -> ServiceResult<ReplayOutcome>
    {
        let soft_timeout = self.config.replay_soft_timeout;
        match timeout(soft_timeout, self.replay_inner(user_id, last_message_id.clone(), limit)).await
        {
            Ok(result) => result,
            Err(_elapsed) => Ok(ReplayOutcome{
                messages: Vec::new(),
                last_message_id: None,
                requested_after: last_message_id,
                sender_notifications: Vec::new(),
                room_completions: Vec::new(),
            }),
        }
    }

    async fn replay_inner(&self, user_id: &str, last_message_id: Option<MessageId>, limit: Option<usize>) -> ServiceResult<ReplayOutcome>
    {
        if let Some(ref id) = last_message_id
        {
            if self.db.find_message(id).await.map_err(|e| ServiceError::new(ErrorCode::InternalError, e.to_string()))?.is_none()
            {
                return Err(ServiceError::new(ErrorCode::InvalidLastMessageId, "lastMessageId does not exist"));
            }
        }

        let limit = limit.unwrap_or(self.config.replay_default_limit).min(self.config.replay_max_limit);

        let candidates = self
            .db
            .replay_candidates_for_user(user_id, last_message_id.as_deref(), limit)
            .await
            .map_err(|e| ServiceError::new(ErrorCode::InternalError, e.to_string()))?;

        let mut out_messages = Vec::new();
        let mut sender_notifications = Vec::new();
        let mut room_completions = Vec::new();
        let mut last_seen = last_message_id.clone();

        for candidate in candidates
        {
            if out_messages.len() >= limit
            {
                break;
            }

            // Guard (a): DB delivery check, crash-safe, runs first.
            if candidate.state >= MessageState::Delivered
            {
                continue;
            }

            // Guard (b): memory cache check, advisory.
            if let Some(cached) = self.stores.messages.get(&candidate.message_id)
            {
                if cached.state == MessageState::Delivered || cached.state == MessageState::Read
                {
                    continue;
                }
            }

            self.db
                .update_message_state(&candidate.message_id, MessageState::Delivered)
                .await
                .map_err(|e| ServiceError::new(ErrorCode::InternalError, e.to_string()))?;
            self.stores.messages.update_state(&candidate.message_id, MessageState::Delivered);

            let mut delivered_message = candidate.clone();
            delivered_message.state = MessageState::Delivered;

            if delivered_message.message_type == MessageType::Direct
            {
                sender_notifications.push((delivered_message.sender_id.clone(), delivered_message.message_id.clone()));
            }
            else if let Some(room_message_id) = delivered_message.room_message_id.clone()
            {
                if let Some((delivered, total, complete)) = self.stores.rooms.record_delivery(&room_message_id, user_id.to_string())
                {
                    if complete
                    {
                        room_completions.push((delivered_message.sender_id.clone(), room_message_id, delivered, total));
                    }
                }
            }

            last_seen = Some(delivered_message.message_id.clone());
            out_messages.push(delivered_message);
        }

        Ok(ReplayOutcome{
            last_message_id: last_seen,
            requested_after: last_message_id,
            sender_notifications,
            room_completions,
            messages: out_messages,
        })
    }

}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::db::InMemoryAdapter;
    use crate::services::LifecycleService;

    #[tokio::test]
    async fn replay_with_unknown_last_message_id_errors()
    {
        let stores = Arc::new(Stores::new());
        let db: Arc<dyn DbAdapter> = Arc::new(InMemoryAdapter::new());
        let engine = ReplayEngine::new(stores, db, AppConfig::default());

        let result = engine.replay("u1", Some("nope".into()), None).await;
        assert!(matches!(result, Err(e) if e.code == ErrorCode::InvalidLastMessageId));
    }

    #[tokio::test]
    async fn up_to_date_replay_returns_zero_messages()
    {
        let stores = Arc::new(Stores::new());
        let db: Arc<dyn DbAdapter> = Arc::new(InMemoryAdapter::new());
        let lifecycle = LifecycleService::new(stores.clone(), db.clone(), AppConfig::default());
        let ack = lifecycle.send_direct_message("u1".into(), "u2".into(), "hi".into(), None).await.unwrap();
        lifecycle.confirm("u2", &ack.message_id, MessageState::Delivered).await.unwrap();

        let engine = ReplayEngine::new(stores, db, AppConfig::default());
        let outcome = engine.replay("u2", None, None).await.unwrap();
        assert_eq!(outcome.messages.len(), 0);
    }
}

//-------------------------------------------------------------------------------------------------------------------
