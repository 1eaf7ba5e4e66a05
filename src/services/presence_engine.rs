//! Lifecycle / presence engine (spec §4.8). The only writer of presence. Connect/disconnect transitions are
//! returned as [`PresenceEvent`]s over an unbounded channel rather than sent directly — services never send;
//! the connection manager (or whatever owns the sockets) drains the channel and performs the actual broadcast
//! (design note in spec §9: "replace event-emitter broadcasts with typed channels").

//local shortcuts
use crate::config::AppConfig;
use crate::ids::UserId;
use crate::model::PresenceStatus;
use crate::stores::Stores;

//third-party shortcuts
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::sleep;

//standard shortcuts
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum PresenceEvent
{
    Online{ user_id: UserId },
    Offline{ user_id: UserId },
}

//-------------------------------------------------------------------------------------------------------------------

fn now_millis() -> i64
{
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

//-------------------------------------------------------------------------------------------------------------------

pub struct PresenceEngine
{
    stores: Arc<Stores>,
    config: AppConfig,
    /// Per-user generation counter: bumped on every connect/disconnect request so an in-flight grace timer can
    /// recognize it has been superseded and become a no-op (spec §4.8, "cancelled atomically on reconnect").
    generations: DashMap<UserId, Arc<AtomicU64>>,
    events_tx: mpsc::UnboundedSender<PresenceEvent>,
}

impl PresenceEngine
{
    pub fn new(stores: Arc<Stores>, config: AppConfig) -> (Self, mpsc::UnboundedReceiver<PresenceEvent>)
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Self{ stores, config, generations: DashMap::new(), events_tx }, events_rx)
    }

    fn generation_for(&self, user_id: &str) -> Arc<AtomicU64>
    {
        self.generations.entry(user_id.to_string()).or_insert_with(|| Arc::new(AtomicU64::new(0))).clone()
    }

    /// Cancels any pending offline timer and transitions presence to online (spec §4.8, `onConnect`).
    pub fn on_connect(&self, user_id: UserId)
    {
        self.generation_for(&user_id).fetch_add(1, Ordering::SeqCst);

        let was_online = self.stores.presence.status(&user_id) == PresenceStatus::Online;
        self.stores.presence.set_status(user_id.clone(), PresenceStatus::Online, now_millis());

        if !was_online
        {
            crate::observability::presence_online(&user_id);
            let _ = self.events_tx.send(PresenceEvent::Online{ user_id });
        }
    }

    /// Schedules a single grace-window offline timer for `user_id` (spec §4.8, `requestDisconnect`). Any
    /// subsequent call to `on_connect` or `request_disconnect` for the same user bumps the generation and
    /// supersedes this one.
    pub fn request_disconnect(self: &Arc<Self>, user_id: UserId)
    {
        let generation = self.generation_for(&user_id);
        let expected = generation.fetch_add(1, Ordering::SeqCst) + 1;
        let grace = std::time::Duration::from_millis(self.config.presence_offline_grace_ms);

        let engine = self.clone();
        tokio::spawn(async move {
            sleep(grace).await;
            engine.finalize_disconnect(user_id, expected);
        });
    }

    fn finalize_disconnect(&self, user_id: UserId, expected_generation: u64)
    {
        let current = self.generation_for(&user_id).load(Ordering::SeqCst);
        if current != expected_generation
        {
            return; // superseded by a reconnect or another disconnect request
        }

        self.on_disconnect(user_id);
    }

    /// Idempotent: no-op if already offline (spec §4.8, `onDisconnect`).
    pub fn on_disconnect(&self, user_id: UserId)
    {
        if self.stores.presence.status(&user_id) == PresenceStatus::Offline
        {
            return;
        }
        self.stores.presence.set_status(user_id.clone(), PresenceStatus::Offline, now_millis());
        crate::observability::presence_offline(&user_id);
        let _ = self.events_tx.send(PresenceEvent::Offline{ user_id });
    }

    pub fn online_users_excluding(&self, exclude: &str) -> Vec<UserId>
    {
        self.stores.connections.online_users().into_iter().filter(|u| u != exclude).collect()
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_window_cancels_offline()
    {
        let stores = Arc::new(Stores::new());
        let config = AppConfig{ presence_offline_grace_ms: 50, ..AppConfig::default() };
        let (engine, mut events) = PresenceEngine::new(stores.clone(), config);
        let engine = Arc::new(engine);

        engine.on_connect("u1".to_string());
        assert!(matches!(events.recv().await, Some(PresenceEvent::Online{ .. })));

        engine.request_disconnect("u1".to_string());
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        engine.on_connect("u1".to_string());

        tokio::time::advance(std::time::Duration::from_millis(100)).await;
        assert_eq!(stores.presence.status("u1"), PresenceStatus::Online);
    }
}

//-------------------------------------------------------------------------------------------------------------------
