//! Typing-indicator rate limiter store (spec §4.1(i)): buckets keyed by `(userId, roomId)`, independent of the
//! per-socket safety state since a user's typing activity is tracked per room regardless of which socket sent it.

//local shortcuts
use crate::config::AppConfig;
use crate::ids::{RoomId, UserId};
use crate::safety::TypingLimiter;

//third-party shortcuts
use dashmap::DashMap;

//standard shortcuts
use std::sync::Mutex;
use std::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

pub struct TypingLimiterStore
{
    buckets: DashMap<(UserId, RoomId), Mutex<TypingLimiter>>,
}

impl TypingLimiterStore
{
    pub fn new() -> Self
    {
        Self{ buckets: DashMap::new() }
    }

    /// Returns `true` if this typing event is allowed under the sliding window (spec §4.2, 4 events / 2 s,
    /// silent drop on violation).
    pub fn try_count(&self, user_id: &UserId, room_id: &RoomId, config: &AppConfig) -> bool
    {
        let entry = self
            .buckets
            .entry((user_id.clone(), room_id.clone()))
            .or_insert_with(|| Mutex::new(TypingLimiter::new(config.typing_limit)));
        let mut limiter = entry.lock().unwrap_or_else(|e| e.into_inner());
        limiter.try_count(Instant::now())
    }
}

impl Default for TypingLimiterStore
{
    fn default() -> Self
    {
        Self::new()
    }
}

//-------------------------------------------------------------------------------------------------------------------
