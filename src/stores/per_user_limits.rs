//! Per-user rate limiter store (spec §4.4): a general limiter plus a stricter limiter for sensitive room-admin
//! actions, keyed by user rather than by socket so the limit holds across every device a user has open.

//local shortcuts
use crate::config::AppConfig;
use crate::ids::UserId;
use crate::safety::FixedWindowLimiter;

//third-party shortcuts
use dashmap::DashMap;

//standard shortcuts
use std::sync::Mutex;
use std::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

struct PerUserBucket
{
    general: FixedWindowLimiter,
    sensitive: FixedWindowLimiter,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct PerUserLimiterStore
{
    buckets: DashMap<UserId, Mutex<PerUserBucket>>,
}

impl PerUserLimiterStore
{
    pub fn new() -> Self
    {
        Self{ buckets: DashMap::new() }
    }

    fn with_bucket<T>(&self, user_id: &UserId, config: &AppConfig, f: impl FnOnce(&mut PerUserBucket) -> T) -> T
    {
        let entry = self.buckets.entry(user_id.clone()).or_insert_with(|| {
            Mutex::new(PerUserBucket{
                general: FixedWindowLimiter::new(config.per_user_limit.general_window, config.per_user_limit.general_max),
                sensitive: FixedWindowLimiter::new(config.per_user_limit.sensitive_window, config.per_user_limit.sensitive_max),
            })
        });
        let mut bucket = entry.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut bucket)
    }

    pub fn try_general(&self, user_id: &UserId, config: &AppConfig) -> bool
    {
        self.with_bucket(user_id, config, |bucket| bucket.general.try_count(Instant::now()))
    }

    pub fn try_sensitive(&self, user_id: &UserId, config: &AppConfig) -> bool
    {
        self.with_bucket(user_id, config, |bucket| bucket.sensitive.try_count(Instant::now()))
    }
}

impl Default for PerUserLimiterStore
{
    fn default() -> Self
    {
        Self::new()
    }
}

//-------------------------------------------------------------------------------------------------------------------
