//! Connection registry (spec §3, §4.3): tracks every open socket, the session it belongs to, and the reverse
//! index from user to sessions. Grounded on the DashMap-per-key-store pattern used for the websocket connection
//! manager in the retrieval pack.

//local shortcuts
use crate::config::AppConfig;
use crate::ids::{SessionId, SocketId, UserId};
use crate::model::{Capabilities, LatencyRingBuffer, ReadyState, Role, SocketContext};
use crate::safety::{BackpressureGate, SocketSafetyState};

//third-party shortcuts
use dashmap::DashMap;
use tokio::sync::mpsc;

//standard shortcuts
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

/// A single live socket. Multiple sockets can share a `session_id` under the multi-socket-per-session model
/// (spec §4.3).
pub struct SocketHandle
{
    pub socket_id: SocketId,
    pub session_id: SessionId,
    pub context: SocketContext,
    pub ready_state: Mutex<ReadyState>,
    pub connected_at: Instant,
    pub last_pong_at: Mutex<Instant>,
    pub latency_samples: Mutex<LatencyRingBuffer>,
    pub hello_received: AtomicBool,
    /// Protocol version this socket negotiated on HELLO; `None` until HELLO lands (spec §3, §6).
    pub negotiated_version: Mutex<Option<String>>,
    pub safety: Mutex<SocketSafetyState>,
    pub backpressure: BackpressureGate,
    /// The most-recently-attached open socket on this session, used as the default target when only one socket
    /// is needed (spec Glossary, "Primary socket"). Reassigned to the newest remaining socket whenever the
    /// current primary detaches (spec §3).
    pub primary: AtomicBool,
}

impl SocketHandle
{
    pub fn is_open(&self) -> bool
    {
        *self.ready_state.lock().unwrap_or_else(|e| e.into_inner()) == ReadyState::Open
    }

    pub fn is_primary(&self) -> bool
    {
        self.primary.load(Ordering::SeqCst)
    }

    /// Zombie check: the role-derived admin capability must still match the socket's role (spec §4.3).
    pub fn capabilities_consistent(&self) -> bool
    {
        self.context.capabilities.is_consistent_with(self.context.role)
    }
}

//-------------------------------------------------------------------------------------------------------------------

struct SessionRecord
{
    user_id: UserId,
    sockets: HashSet<SocketId>,
}

//-------------------------------------------------------------------------------------------------------------------

/// Connection registry. One instance per server; cheaply cloned via `Arc` internals.
pub struct ConnectionStore
{
    sockets: DashMap<SocketId, Arc<SocketHandle>>,
    sessions: DashMap<SessionId, RwLock<SessionRecord>>,
    users: DashMap<UserId, RwLock<HashSet<SessionId>>>,
    next_socket_id: std::sync::atomic::AtomicU64,
}

impl ConnectionStore
{
    pub fn new() -> Self
    {
        Self{
            sockets: DashMap::new(),
            sessions: DashMap::new(),
            users: DashMap::new(),
            next_socket_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    pub fn next_socket_id(&self) -> SocketId
    {
        self.next_socket_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a newly-accepted socket under `session_id`, evicting the oldest socket on that session if
    /// `max_sockets_per_session` would otherwise be exceeded (spec §4.3, "Multi-socket sessions").
    ///
    /// Returns the handle plus any evicted socket that the caller must close.
    pub fn register(
        &self,
        session_id: SessionId,
        user_id: UserId,
        role: Role,
        config: &AppConfig,
    ) -> (Arc<SocketHandle>, mpsc::Receiver<Vec<u8>>, Option<Arc<SocketHandle>>)
    {
        let socket_id = self.next_socket_id();
        let (backpressure, receiver) = BackpressureGate::new(config.backpressure);

        let handle = Arc::new(SocketHandle{
            socket_id,
            session_id: session_id.clone(),
            context: SocketContext{ user_id: user_id.clone(), role, capabilities: Capabilities::for_role(role) },
            ready_state: Mutex::new(ReadyState::Open),
            connected_at: Instant::now(),
            last_pong_at: Mutex::new(Instant::now()),
            latency_samples: Mutex::new(LatencyRingBuffer::default()),
            hello_received: AtomicBool::new(false),
            negotiated_version: Mutex::new(None),
            safety: Mutex::new(SocketSafetyState::new(config)),
            backpressure,
            // The newest socket on a session is always the primary (spec Glossary); existing sockets are
            // demoted below.
            primary: AtomicBool::new(true),
        });
        self.sockets.insert(socket_id, handle.clone());

        let (evicted, previous_sockets) = {
            let mut record = self
                .sessions
                .entry(session_id.clone())
                .or_insert_with(|| RwLock::new(SessionRecord{ user_id: user_id.clone(), sockets: HashSet::new() }));
            let mut record = record.write().unwrap_or_else(|e| e.into_inner());

            let evicted_id = if record.sockets.len() >= config.max_sockets_per_session
            {
                record.sockets.iter().copied().min()
            }
            else
            {
                None
            };
            if let Some(id) = evicted_id
            {
                record.sockets.remove(&id);
            }
            let previous_sockets: Vec<SocketId> = record.sockets.iter().copied().collect();
            record.sockets.insert(socket_id);
            (evicted_id, previous_sockets)
        };
        let evicted_handle = evicted.and_then(|id| self.sockets.remove(&id)).map(|(_, h)| h);

        for id in previous_sockets
        {
            if let Some(existing) = self.get(id)
            {
                existing.primary.store(false, Ordering::SeqCst);
            }
        }

        self.users.entry(user_id).or_insert_with(|| RwLock::new(HashSet::new()))
            .write().unwrap_or_else(|e| e.into_inner())
            .insert(session_id);

        (handle, receiver, evicted_handle)
    }

    pub fn get(&self, socket_id: SocketId) -> Option<Arc<SocketHandle>>
    {
        self.sockets.get(&socket_id).map(|e| e.clone())
    }

    /// Removes a socket from the registry. If it was the session's last socket, also removes the session and
    /// its entry in the user's reverse index (spec §4.3). If the removed socket was the session's primary and
    /// others remain, reassigns primary to the newest remaining socket (spec §3, §4.3 "Close handling").
    pub fn unregister(&self, socket_id: SocketId) -> bool
    {
        let Some((_, handle)) = self.sockets.remove(&socket_id) else { return false };
        *handle.ready_state.lock().unwrap_or_else(|e| e.into_inner()) = ReadyState::Closed;

        let (session_now_empty, remaining) = if let Some(record) = self.sessions.get(&handle.session_id)
        {
            let mut record = record.write().unwrap_or_else(|e| e.into_inner());
            record.sockets.remove(&socket_id);
            (record.sockets.is_empty(), record.sockets.iter().copied().collect::<Vec<_>>())
        }
        else
        {
            (false, Vec::new())
        };

        if handle.is_primary()
        {
            if let Some(newest) = remaining.into_iter().max()
            {
                if let Some(successor) = self.get(newest)
                {
                    successor.primary.store(true, Ordering::SeqCst);
                }
            }
        }

        if session_now_empty
        {
            self.sessions.remove(&handle.session_id);
            if let Some(sessions) = self.users.get(&handle.context.user_id)
            {
                let mut sessions = sessions.write().unwrap_or_else(|e| e.into_inner());
                sessions.remove(&handle.session_id);
            }
        }

        session_now_empty
    }

    pub fn is_user_online(&self, user_id: &str) -> bool
    {
        self.users.get(user_id).map(|s| !s.read().unwrap_or_else(|e| e.into_inner()).is_empty()).unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<UserId>
    {
        self.users
            .iter()
            .filter(|e| !e.value().read().unwrap_or_else(|err| err.into_inner()).is_empty())
            .map(|e| e.key().clone())
            .collect()
    }

    /// All live socket handles belonging to `user_id`, used to fan out a frame to every device (spec §4.5).
    pub fn sockets_for_user(&self, user_id: &str) -> Vec<Arc<SocketHandle>>
    {
        let Some(sessions) = self.users.get(user_id) else { return Vec::new() };
        let sessions = sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions
            .iter()
            .filter_map(|sid| self.sessions.get(sid))
            .flat_map(|rec| rec.read().unwrap_or_else(|e| e.into_inner()).sockets.iter().copied().collect::<Vec<_>>())
            .filter_map(|socket_id| self.get(socket_id))
            .collect()
    }

    pub fn socket_count_for_session(&self, session_id: &str) -> usize
    {
        self.sessions.get(session_id).map(|r| r.read().unwrap_or_else(|e| e.into_inner()).sockets.len()).unwrap_or(0)
    }

    /// Every live socket, for the shutdown broadcast (spec §6, "Shutdown").
    pub fn all_sockets(&self) -> Vec<Arc<SocketHandle>>
    {
        self.sockets.iter().map(|e| e.value().clone()).collect()
    }

    /// Sockets whose pong is older than `timeout`, for the zombie-reaper sweep (spec §4.3).
    pub fn stale_sockets(&self, timeout: std::time::Duration) -> Vec<Arc<SocketHandle>>
    {
        let now = Instant::now();
        self.sockets
            .iter()
            .filter(|e| now.duration_since(*e.value().last_pong_at.lock().unwrap_or_else(|err| err.into_inner())) > timeout)
            .map(|e| e.value().clone())
            .collect()
    }
}

impl Default for ConnectionStore
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
    fn primary_reassigns_to_newest_remaining_socket_on_detach()
    {
        let config = AppConfig::default();
        let store = ConnectionStore::new();

        let (first, _rx1, _) = store.register("sess".into(), "alice".into(), Role::User, &config);
        assert!(first.is_primary());

        let (second, _rx2, _) = store.register("sess".into(), "alice".into(), Role::User, &config);
        assert!(!first.is_primary());
        assert!(second.is_primary());

        let (third, _rx3, _) = store.register("sess".into(), "alice".into(), Role::User, &config);
        assert!(!second.is_primary());
        assert!(third.is_primary());

        store.unregister(third.socket_id);
        assert!(second.is_primary(), "detaching the primary must reassign to the newest remaining socket");
    }
}

//-------------------------------------------------------------------------------------------------------------------
