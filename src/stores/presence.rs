//! Presence tracking (spec §4.7): online/away/offline status per user, with a grace window before a user with
//! zero live sockets is announced offline (covers reconnect races).

//local shortcuts
use crate::ids::UserId;
use crate::model::{PresenceRecord, PresenceStatus};

//third-party shortcuts
use dashmap::DashMap;

//standard shortcuts

//-------------------------------------------------------------------------------------------------------------------

pub struct PresenceStore
{
    records: DashMap<UserId, PresenceRecord>,
}

impl PresenceStore
{
    pub fn new() -> Self
    {
        Self{ records: DashMap::new() }
    }

    pub fn set_status(&self, user_id: UserId, status: PresenceStatus, now: i64)
    {
        self.records.insert(user_id, PresenceRecord{ status, last_seen: now });
    }

    pub fn get(&self, user_id: &str) -> Option<PresenceRecord>
    {
        self.records.get(user_id).map(|e| e.clone())
    }

    pub fn status(&self, user_id: &str) -> PresenceStatus
    {
        self.records.get(user_id).map(|e| e.status).unwrap_or(PresenceStatus::Offline)
    }

    /// Users whose status is not already `Offline` and whose `last_seen` predates `now - grace_ms`, i.e. past the
    /// reconnect grace window and due for an offline announcement (spec §4.7).
    pub fn due_for_offline(&self, now: i64, grace_ms: i64) -> Vec<UserId>
    {
        self.records
            .iter()
            .filter(|e| e.value().status != PresenceStatus::Offline && now - e.value().last_seen >= grace_ms)
            .map(|e| e.key().clone())
            .collect()
    }
}

impl Default for PresenceStore
{
    fn default() -> Self
    {
        Self::new()
    }
}

//-------------------------------------------------------------------------------------------------------------------
