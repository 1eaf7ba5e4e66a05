//! Room registry (spec §3, §4.6): room metadata, membership, and roles, plus in-flight delivery aggregates used
//! to compute `ROOM_DELIVERY_UPDATE` completion.

//local shortcuts
use crate::ids::{RoomId, RoomMessageId, UserId};
use crate::model::{Room, RoomDeliveryAggregate, RoomMeta, RoomRole};

//third-party shortcuts
use dashmap::DashMap;

//standard shortcuts
use std::sync::RwLock;

//-------------------------------------------------------------------------------------------------------------------

pub struct RoomStore
{
    rooms: DashMap<RoomId, RwLock<Room>>,
    delivery_aggregates: DashMap<RoomMessageId, RwLock<RoomDeliveryAggregate>>,
}

impl RoomStore
{
    pub fn new() -> Self
    {
        Self{ rooms: DashMap::new(), delivery_aggregates: DashMap::new() }
    }

    pub fn create(&self, room_id: RoomId, meta: RoomMeta, owner: UserId, now: i64) -> Room
    {
        let mut roles = std::collections::HashMap::new();
        let mut joined_at = std::collections::HashMap::new();
        roles.insert(owner.clone(), RoomRole::Owner);
        joined_at.insert(owner, now);

        let room = Room{ room_id: room_id.clone(), meta, roles, joined_at, version: 1, updated_at: now };
        self.rooms.insert(room_id, RwLock::new(room.clone()));
        room
    }

    pub fn get(&self, room_id: &str) -> Option<Room>
    {
        self.rooms.get(room_id).map(|r| r.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    pub fn exists(&self, room_id: &str) -> bool
    {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize
    {
        self.rooms.len()
    }

    pub fn role_of(&self, room_id: &str, user_id: &str) -> Option<RoomRole>
    {
        self.rooms.get(room_id)?.read().unwrap_or_else(|e| e.into_inner()).roles.get(user_id).copied()
    }

    /// Adds members at `MEMBER` role, bumping the room version (spec §4.6).
    pub fn add_members(&self, room_id: &str, members: &[UserId], now: i64) -> Option<Room>
    {
        let entry = self.rooms.get(room_id)?;
        let mut room = entry.write().unwrap_or_else(|e| e.into_inner());
        for member in members
        {
            room.roles.entry(member.clone()).or_insert(RoomRole::Member);
            room.joined_at.entry(member.clone()).or_insert(now);
        }
        room.version += 1;
        room.updated_at = now;
        Some(room.clone())
    }

    /// Removes a member. If the member was the sole owner, promotes the oldest admin, or the oldest remaining
    /// member if there is no admin (spec §4.6, "Ownership transfer"). Returns `(room, promoted)`.
    pub fn remove_member(&self, room_id: &str, member_id: &str, now: i64) -> Option<(Room, Option<UserId>)>
    {
        let entry = self.rooms.get(room_id)?;
        let mut room = entry.write().unwrap_or_else(|e| e.into_inner());

        let was_owner = room.roles.get(member_id).copied() == Some(RoomRole::Owner);
        room.roles.remove(member_id);
        room.joined_at.remove(member_id);

        let mut promoted = None;
        if was_owner
        {
            let successor = room
                .oldest_with_role(RoomRole::Admin, member_id)
                .or_else(|| room.oldest_with_role(RoomRole::Member, member_id));
            if let Some(ref successor_id) = successor
            {
                room.roles.insert(successor_id.clone(), RoomRole::Owner);
                promoted = successor;
            }
        }

        room.version += 1;
        room.updated_at = now;
        Some((room.clone(), promoted))
    }

    pub fn set_role(&self, room_id: &str, member_id: &str, role: RoomRole, now: i64) -> Option<Room>
    {
        let entry = self.rooms.get(room_id)?;
        let mut room = entry.write().unwrap_or_else(|e| e.into_inner());
        if !room.roles.contains_key(member_id)
        {
            return None;
        }
        room.roles.insert(member_id.to_string(), role);
        room.version += 1;
        room.updated_at = now;
        Some(room.clone())
    }

    pub fn update_meta(&self, room_id: &str, name: Option<String>, thumbnail_url: Option<String>, now: i64) -> Option<Room>
    {
        let entry = self.rooms.get(room_id)?;
        let mut room = entry.write().unwrap_or_else(|e| e.into_inner());
        if let Some(name) = name
        {
            room.meta.name = name;
        }
        if thumbnail_url.is_some()
        {
            room.meta.thumbnail_url = thumbnail_url;
        }
        room.version += 1;
        room.updated_at = now;
        Some(room.clone())
    }

    pub fn delete(&self, room_id: &str) -> bool
    {
        self.rooms.remove(room_id).is_some()
    }

    pub fn rooms_for_user(&self, user_id: &str) -> Vec<Room>
    {
        self.rooms
            .iter()
            .filter(|e| e.read().unwrap_or_else(|err| err.into_inner()).roles.contains_key(user_id))
            .map(|e| e.read().unwrap_or_else(|err| err.into_inner()).clone())
            .collect()
    }

    pub fn start_delivery_aggregate(&self, room_message_id: RoomMessageId, total_recipients: usize)
    {
        self.delivery_aggregates.insert(
            room_message_id,
            RwLock::new(RoomDeliveryAggregate{ total_recipients, delivered: Default::default() }),
        );
    }

    /// Records a delivery and returns `(delivered_count, total, complete)`, or `None` if no aggregate is tracked.
    pub fn record_delivery(&self, room_message_id: &str, user_id: UserId) -> Option<(usize, usize, bool)>
    {
        let entry = self.delivery_aggregates.get(room_message_id)?;
        let mut aggregate = entry.write().unwrap_or_else(|e| e.into_inner());
        aggregate.delivered.insert(user_id);
        Some((aggregate.delivered.len(), aggregate.total_recipients, aggregate.is_complete()))
    }

    /// Seeds a delivery aggregate reconstructed from persisted per-recipient rows (spec §4.7, step 4) and
    /// returns its snapshot, for when the process never saw [`Self::start_delivery_aggregate`] for this message
    /// (e.g. a restart wiped the in-memory table). Once seeded, subsequent confirmations hit the fast path above.
    pub fn hydrate_delivery_aggregate(
        &self,
        room_message_id: RoomMessageId,
        delivered: std::collections::HashSet<UserId>,
        total_recipients: usize,
    ) -> (usize, usize, bool)
    {
        let aggregate = RoomDeliveryAggregate{ total_recipients, delivered };
        let snapshot = (aggregate.delivered.len(), aggregate.total_recipients, aggregate.is_complete());
        self.delivery_aggregates.insert(room_message_id, RwLock::new(aggregate));
        snapshot
    }

    /// Drops every in-memory delivery aggregate, as if the process had just restarted. Test-only: exercises the
    /// rehydration path in [`Self::hydrate_delivery_aggregate`] without an actual process restart.
    #[cfg(test)]
    pub fn clear_delivery_aggregates(&self)
    {
        self.delivery_aggregates.clear();
    }
}

impl Default for RoomStore
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

    #[test]
    fn removing_the_sole_owner_promotes_oldest_admin()
    {
        let store = RoomStore::new();
        let meta = RoomMeta{ name: "r".into(), thumbnail_url: None, created_at: 0, created_by: "owner".into() };
        store.create("r1".into(), meta, "owner".into(), 0);
        store.add_members("r1", &["admin1".into(), "admin2".into()], 1);
        store.set_role("r1", "admin1", RoomRole::Admin, 2);
        store.set_role("r1", "admin2", RoomRole::Admin, 3);

        let (room, promoted) = store.remove_member("r1", "owner", 4).unwrap();
        assert_eq!(promoted, Some("admin1".to_string()));
        assert_eq!(room.roles.get("admin1"), Some(&RoomRole::Owner));
    }
}

//-------------------------------------------------------------------------------------------------------------------
