//! Delivery & room fan-out service (spec §4.6). Owns room registry mutation, RBAC enforcement, and room-message
//! fan-out with per-recipient delivery records and aggregate completion tracking.

//local shortcuts
use crate::config::AppConfig;
use crate::db::DbAdapter;
use crate::error::{DbError, ErrorCode, ServiceError, ServiceResult};
use crate::ids::{self, MessageId, RoomId, RoomMessageId, UserId};
use crate::model::{Message, MessageState, MessageType, Room, RoomRole};
use crate::pubsub::RoomPubSub;
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

fn not_a_member() -> ServiceError
{
    ServiceError::new(ErrorCode::NotAMember, "user is not a member of this room")
}

fn forbidden() -> ServiceError
{
    ServiceError::new(ErrorCode::Forbidden, "insufficient role for this room action")
}

//-------------------------------------------------------------------------------------------------------------------

pub struct RoomMessageFanout
{
    pub room_message_id: RoomMessageId,
    pub canonical_message_id: MessageId,
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: i64,
    /// Deterministically ordered recipient set, excluding the sender (spec §4.6, "Fan-out").
    pub recipients: Vec<UserId>,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct RoomDeliveryUpdate
{
    pub delivered: usize,
    pub total: usize,
    pub complete: bool,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct RoomService
{
    stores: Arc<Stores>,
    db: Arc<dyn DbAdapter>,
    config: AppConfig,
    pubsub: Arc<dyn RoomPubSub>,
}

impl RoomService
{
    pub fn new(stores: Arc<Stores>, db: Arc<dyn DbAdapter>, config: AppConfig, pubsub: Arc<dyn RoomPubSub>) -> Self
    {
        Self{ stores, db, config, pubsub }
    }

    pub async fn create_room(&self, creator: UserId, name: String, thumbnail_url: Option<String>) -> ServiceResult<Room>
    {
        if self.stores.rooms.room_count() >= self.config.rooms.max_rooms
        {
            return Err(ServiceError::new(ErrorCode::ValidationError, "room capacity reached"));
        }

        let now = now_millis();
        let room_id = ids::new_session_id();
        let meta = crate::db::new_room_meta(name, thumbnail_url, creator.clone(), now);
        let room = self.stores.rooms.create(room_id, meta, creator, now);
        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok(room)
    }

    /// Adds `user_id` as a MEMBER. Auto-creates the room on first join if `rooms.auto_create` is set.
    /// Duplicate join is idempotent (spec §4.6).
    pub async fn join_room(&self, user_id: UserId, room_id: RoomId) -> ServiceResult<Room>
    {
        if !self.stores.rooms.exists(&room_id)
        {
            if !self.config.rooms.auto_create
            {
                return Err(ServiceError::new(ErrorCode::ValidationError, "room does not exist"));
            }
            let now = now_millis();
            let meta = crate::db::new_room_meta(room_id.clone(), None, user_id.clone(), now);
            let room = self.stores.rooms.create(room_id.clone(), meta, user_id, now);
            self.db.upsert_room(&room).await.map_err(db_err)?;
            return Ok(room);
        }

        if self.stores.rooms.role_of(&room_id, &user_id).is_some()
        {
            return self
                .stores
                .rooms
                .get(&room_id)
                .ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"));
        }

        let room = self.stores.rooms.get(&room_id).ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        if room.roles.len() >= self.config.rooms.max_members_per_room
        {
            return Err(ServiceError::new(ErrorCode::ValidationError, "room member capacity reached"));
        }

        let room = self
            .stores
            .rooms
            .add_members(&room_id, &[user_id], now_millis())
            .ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok(room)
    }

    pub async fn add_members(&self, actor: &str, room_id: &str, members: Vec<UserId>) -> ServiceResult<Room>
    {
        self.require_role_at_least(room_id, actor, RoomRole::Admin)?;

        let room = self.stores.rooms.get(room_id).ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        if room.roles.len() + members.len() > self.config.rooms.max_members_per_room
        {
            return Err(ServiceError::new(ErrorCode::ValidationError, "room member capacity reached"));
        }

        let room = self
            .stores
            .rooms
            .add_members(room_id, &members, now_millis())
            .ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok(room)
    }

    /// Removes a member. RBAC (spec §4.6): OWNER/ADMIN may remove a MEMBER; only OWNER may remove an ADMIN;
    /// nobody may remove the OWNER through this path (they must leave, see [`Self::leave_room`]).
    pub async fn remove_member(&self, actor: &str, room_id: &str, member_id: &str) -> ServiceResult<Room>
    {
        let actor_role = self.role_or_not_member(room_id, actor)?;
        let target_role = self
            .stores
            .rooms
            .role_of(room_id, member_id)
            .ok_or_else(not_a_member)?;

        let allowed = match target_role
        {
            RoomRole::Owner => false,
            RoomRole::Admin => actor_role == RoomRole::Owner,
            RoomRole::Member => actor_role == RoomRole::Owner || actor_role == RoomRole::Admin,
        };
        if !allowed
        {
            return Err(forbidden());
        }

        let (room, _promoted) = self
            .stores
            .rooms
            .remove_member(room_id, member_id, now_millis())
            .ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        self.db.remove_room_member(room_id, member_id).await.map_err(db_err)?;
        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok(room)
    }

    /// A member leaves voluntarily. If they were the sole OWNER, ownership transfers to the oldest ADMIN, else
    /// the oldest MEMBER, else the room is deleted (spec §4.6).
    pub async fn leave_room(&self, user_id: &str, room_id: &str) -> ServiceResult<(Option<Room>, Option<UserId>)>
    {
        self.role_or_not_member(room_id, user_id)?;

        let (room, promoted) = self
            .stores
            .rooms
            .remove_member(room_id, user_id, now_millis())
            .ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        self.db.remove_room_member(room_id, user_id).await.map_err(db_err)?;

        if room.roles.is_empty() && self.config.rooms.auto_delete_empty
        {
            self.stores.rooms.delete(room_id);
            self.db.delete_room(room_id).await.map_err(db_err)?;
            return Ok((None, None));
        }

        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok((Some(room), promoted))
    }

    /// RBAC for role assignment (spec §4.6 matrix): OWNER may set any non-OWNER role and may promote to OWNER;
    /// ADMIN may only set a MEMBER's role, and only to ADMIN.
    pub async fn set_role(&self, actor: &str, room_id: &str, member_id: &str, role: RoomRole) -> ServiceResult<Room>
    {
        let actor_role = self.role_or_not_member(room_id, actor)?;
        let target_role = self.stores.rooms.role_of(room_id, member_id).ok_or_else(not_a_member)?;

        let allowed = match (actor_role, role)
        {
            (RoomRole::Owner, RoomRole::Owner) => true,
            (RoomRole::Owner, _) => true,
            (RoomRole::Admin, RoomRole::Admin) if target_role == RoomRole::Member => true,
            _ => false,
        };
        if !allowed
        {
            return Err(forbidden());
        }

        // Promoting to OWNER demotes the previous sole owner to ADMIN to preserve the single-owner invariant.
        if role == RoomRole::Owner
        {
            if let Some(previous_owner) = self.stores.rooms.get(room_id).and_then(|r| r.owner().cloned())
            {
                self.stores.rooms.set_role(room_id, &previous_owner, RoomRole::Admin, now_millis());
            }
        }

        let room = self
            .stores
            .rooms
            .set_role(room_id, member_id, role, now_millis())
            .ok_or_else(not_a_member)?;
        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok(room)
    }

    pub async fn update_meta(&self, actor: &str, room_id: &str, name: Option<String>, thumbnail_url: Option<String>) -> ServiceResult<Room>
    {
        self.require_role_at_least(room_id, actor, RoomRole::Admin)?;
        let room = self
            .stores
            .rooms
            .update_meta(room_id, name, thumbnail_url, now_millis())
            .ok_or_else(|| ServiceError::new(ErrorCode::ValidationError, "room does not exist"))?;
        self.db.upsert_room(&room).await.map_err(db_err)?;
        Ok(room)
    }

    pub async fn delete_room(&self, actor: &str, room_id: &str) -> ServiceResult<()>
    {
        let role = self.role_or_not_member(room_id, actor)?;
        if role != RoomRole::Owner
        {
            return Err(forbidden());
        }
        self.stores.rooms.delete(room_id);
        self.db.delete_room(room_id).await.map_err(db_err)?;
        Ok(())
    }

    pub fn rooms_for_user(&self, user_id: &str) -> Vec<Room>
    {
        self.stores.rooms.rooms_for_user(user_id)
    }

    /// Persists the canonical room-message row and one per-recipient row, then returns the fan-out recipient
    /// set (members minus sender, deterministically ordered) for the caller to actually send to (spec §4.6).
    pub async fn send_room_message(
        &self,
        sender_id: UserId,
        room_id: RoomId,
        content: String,
    ) -> ServiceResult<RoomMessageFanout>
    {
        if content.len() > self.config.max_content_length
        {
            return Err(ServiceError::new(ErrorCode::ContentTooLong, "message content exceeds the configured limit"));
        }

        let room = self.stores.rooms.get(&room_id).ok_or_else(not_a_member)?;
        if !room.roles.contains_key(&sender_id)
        {
            return Err(not_a_member());
        }

        let room_message_id = ids::new_message_id();
        let canonical_message_id = room_message_id.clone();
        let timestamp = now_millis();
        let chat_id = ids::room_chat_id(&room_id);

        let canonical = Message{
            message_id: canonical_message_id.clone(),
            sender_id: sender_id.clone(),
            recipient_id: None,
            room_id: Some(room_id.clone()),
            room_message_id: Some(room_message_id.clone()),
            content: content.clone(),
            timestamp,
            state: MessageState::Sent,
            client_message_id: None,
            message_type: MessageType::Room,
            chat_id,
            edited_at: None,
            deleted_at: None,
        };
        self.db.insert_message(&canonical).await.map_err(db_err)?;
        self.stores.messages.insert(canonical);

        let recipients: Vec<UserId> = room.recipients_excluding(&sender_id).into_iter().collect();

        for recipient in &recipients
        {
            let per_recipient_id = ids::room_recipient_message_id(&room_message_id, recipient);
            let row = Message{
                message_id: per_recipient_id,
                sender_id: sender_id.clone(),
                recipient_id: Some(recipient.clone()),
                room_id: Some(room_id.clone()),
                room_message_id: Some(room_message_id.clone()),
                content: content.clone(),
                timestamp,
                state: MessageState::Sent,
                client_message_id: None,
                message_type: MessageType::Room,
                chat_id: ids::room_chat_id(&room_id),
                edited_at: None,
                deleted_at: None,
            };
            self.db.insert_message(&row).await.map_err(db_err)?;
            self.stores.messages.insert(row);
        }

        self.stores.rooms.start_delivery_aggregate(room_message_id.clone(), recipients.len());
        crate::observability::room_fanout(&room_id, recipients.len());
        self.pubsub.publish(&room_id, content.as_bytes());

        Ok(RoomMessageFanout{ room_message_id, canonical_message_id, sender_id, content, timestamp, recipients })
    }

    /// Records a per-recipient delivery/read confirmation against its `rm_<roomMessageId>_<memberId>` row and
    /// updates the aggregate. Returns the aggregate snapshot so the caller can decide whether to notify the
    /// sender (only once, on the transition into "complete", spec §4.6) — `RoomDeliveryUpdate::complete` is what
    /// the caller must gate on; the snapshot is returned on every confirmation, complete or not.
    pub async fn confirm_room_delivery(
        &self,
        lifecycle: &super::LifecycleService,
        user_id: &str,
        room_message_id: &str,
        target: MessageState,
    ) -> ServiceResult<(super::lifecycle::ConfirmOutcome, Option<RoomDeliveryUpdate>)>
    {
        let per_recipient_id = ids::room_recipient_message_id(&room_message_id.to_string(), user_id);
        let outcome = lifecycle.confirm(user_id, &per_recipient_id, target).await?;

        if outcome.already_in_state || target != MessageState::Delivered
        {
            return Ok((outcome, None));
        }

        let snapshot = match self.stores.rooms.record_delivery(room_message_id, user_id.to_string())
        {
            Some(snapshot) => snapshot,
            None => self.rehydrate_and_record(room_message_id, user_id).await?,
        };
        let (delivered, total, complete) = snapshot;
        Ok((outcome, Some(RoomDeliveryUpdate{ delivered, total, complete })))
    }

    /// Rebuilds a missing in-memory delivery aggregate from persisted per-recipient rows (spec §4.7, step 4),
    /// then records the just-confirmed delivery against it. The `Delivered`/`Read` state on `user_id`'s row was
    /// already committed by `lifecycle.confirm` above, so it's reflected in the rows this reads back.
    async fn rehydrate_and_record(&self, room_message_id: &str, user_id: &str) -> ServiceResult<(usize, usize, bool)>
    {
        let rows = self.db.find_room_message_recipients(room_message_id).await.map_err(db_err)?;
        let total_recipients = rows.len();
        let delivered: std::collections::HashSet<UserId> = rows
            .iter()
            .filter(|row| row.state >= MessageState::Delivered)
            .filter_map(|row| row.recipient_id.clone())
            .collect();
        Ok(self.stores.rooms.hydrate_delivery_aggregate(room_message_id.to_string(), delivered, total_recipients))
    }

    fn role_or_not_member(&self, room_id: &str, user_id: &str) -> ServiceResult<RoomRole>
    {
        self.stores.rooms.role_of(room_id, user_id).ok_or_else(not_a_member)
    }

    fn require_role_at_least(&self, room_id: &str, user_id: &str, minimum: RoomRole) -> ServiceResult<RoomRole>
    {
        let role = self.role_or_not_member(room_id, user_id)?;
        if role >= minimum { Ok(role) } else { Err(forbidden()) }
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::db::InMemoryAdapter;
    use crate::pubsub::NullPubSub;

    fn service() -> RoomService
    {
        RoomService::new(
            Arc::new(Stores::new()),
            Arc::new(InMemoryAdapter::new()),
            AppConfig::default(),
            Arc::new(NullPubSub),
        )
    }

    fn lifecycle_for(stores: Arc<Stores>, db: Arc<dyn crate::db::DbAdapter>) -> crate::services::LifecycleService
    {
        crate::services::LifecycleService::new(stores, db, AppConfig::default())
    }

    #[tokio::test]
    async fn confirm_room_delivery_rehydrates_a_missing_aggregate_from_persisted_rows()
    {
        let stores = Arc::new(Stores::new());
        let db: Arc<dyn crate::db::DbAdapter> = Arc::new(InMemoryAdapter::new());
        let service = RoomService::new(stores.clone(), db.clone(), AppConfig::default(), Arc::new(NullPubSub));
        let lifecycle = lifecycle_for(stores.clone(), db.clone());

        let room = service.create_room("u1".into(), "room".into(), None).await.unwrap();
        service.add_members("u1", &room.room_id, vec!["u2".into(), "u3".into()]).await.unwrap();
        let fanout = service.send_room_message("u1".into(), room.room_id.clone(), "hi".into()).await.unwrap();

        // Simulate a restart: the in-memory aggregate never started in this process, only the persisted rows did.
        stores.rooms.clear_delivery_aggregates();

        let (_, update) = service
            .confirm_room_delivery(&lifecycle, "u2", &fanout.room_message_id, MessageState::Delivered)
            .await
            .unwrap();
        let update = update.expect("rehydration must still produce a snapshot");
        assert_eq!(update.total, 2);
        assert_eq!(update.delivered, 1);
        assert!(!update.complete);
    }

    #[tokio::test]
    async fn fanout_excludes_sender_and_is_deterministically_ordered()
    {
        let service = service();
        let room = service.create_room("u1".into(), "room".into(), None).await.unwrap();
        service.add_members("u1", &room.room_id, vec!["u3".into(), "u2".into()]).await.unwrap();

        let fanout = service.send_room_message("u1".into(), room.room_id.clone(), "hi".into()).await.unwrap();
        assert_eq!(fanout.recipients, vec!["u2".to_string(), "u3".to_string()]);
    }

    #[tokio::test]
    async fn member_cannot_remove_admin()
    {
        let service = service();
        let room = service.create_room("owner".into(), "room".into(), None).await.unwrap();
        service.add_members("owner", &room.room_id, vec!["admin".into(), "member".into()]).await.unwrap();
        service.set_role("owner", &room.room_id, "admin", RoomRole::Admin).await.unwrap();

        let result = service.remove_member("member", &room.room_id, "admin").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn owner_leaving_promotes_oldest_admin()
    {
        let service = service();
        let room = service.create_room("owner".into(), "room".into(), None).await.unwrap();
        service.add_members("owner", &room.room_id, vec!["admin1".into(), "admin2".into()]).await.unwrap();
        service.set_role("owner", &room.room_id, "admin1", RoomRole::Admin).await.unwrap();
        service.set_role("owner", &room.room_id, "admin2", RoomRole::Admin).await.unwrap();

        let (room, promoted) = service.leave_room("owner", &room.room_id).await.unwrap();
        assert_eq!(promoted, Some("admin1".to_string()));
        assert_eq!(room.unwrap().roles.get("admin1"), Some(&RoomRole::Owner));
    }
}

//-------------------------------------------------------------------------------------------------------------------
