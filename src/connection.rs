//! Connection manager (spec §4.3): wraps the connection store with the register/close/zombie-check operations
//! the transport layer calls into. Owns nothing the store doesn't already own; its job is sequencing — notify
//! presence on register, request a graced disconnect on last-socket close, log the named observability events.

//local shortcuts
use crate::config::AppConfig;
use crate::ids::{SessionId, SocketId, UserId};
use crate::model::Role;
use crate::services::PresenceEngine;
use crate::stores::{ConnectionStore, SocketHandle};

//third-party shortcuts
use tokio::sync::mpsc;

//standard shortcuts
use std::sync::Arc;
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

pub struct RegisterOutcome
{
    pub handle: Arc<SocketHandle>,
    pub receiver: mpsc::Receiver<Vec<u8>>,
    pub evicted: Option<Arc<SocketHandle>>,
    pub is_reconnect: bool,
    pub connection_count: usize,
}

//-------------------------------------------------------------------------------------------------------------------

pub struct ConnectionManager
{
    connections: Arc<ConnectionStore>,
    presence: Arc<PresenceEngine>,
    config: AppConfig,
}

impl ConnectionManager
{
    pub fn new(connections: Arc<ConnectionStore>, presence: Arc<PresenceEngine>, config: AppConfig) -> Self
    {
        Self{ connections, presence, config }
    }

    /// Registers a newly-accepted socket. `isReconnect` is true when the user already had at least one other
    /// live socket at the moment of attach (spec §6, "Upon accept").
    pub fn register(&self, session_id: SessionId, user_id: UserId, role: Role) -> RegisterOutcome
    {
        let is_reconnect = self.connections.is_user_online(&user_id);
        let (handle, receiver, evicted) = self.connections.register(session_id.clone(), user_id.clone(), role, &self.config);
        self.presence.on_connect(user_id.clone());
        crate::observability::connection_open(handle.socket_id, &session_id, &user_id);

        if let Some(ref evicted_socket) = evicted
        {
            crate::observability::connection_close(evicted_socket.socket_id, &evicted_socket.session_id, 4002);
        }

        let connection_count = self.connections.socket_count_for_session(&session_id);
        RegisterOutcome{ handle, receiver, evicted, is_reconnect, connection_count }
    }

    /// Close handling (spec §4.3): unregisters the socket and, if it was the user's last live socket, starts the
    /// presence grace timer. `close_code` is logged only, the transport has already sent/observed the close frame.
    pub fn handle_close(&self, socket: &SocketHandle, close_code: u16)
    {
        self.connections.unregister(socket.socket_id);
        crate::observability::connection_close(socket.socket_id, &socket.session_id, close_code);

        if !self.connections.is_user_online(&socket.context.user_id)
        {
            self.presence.request_disconnect(socket.context.user_id.clone());
        }
    }

    /// Zombie check (spec §4.3): run before routing any non-HELLO frame. A socket whose admin capability has
    /// drifted from its role (e.g. a stale context from before a role downgrade) fails this check and must be
    /// closed with code 4004.
    pub fn is_zombie(&self, socket: &SocketHandle) -> bool
    {
        !socket.capabilities_consistent()
    }

    pub fn get(&self, socket_id: SocketId) -> Option<Arc<SocketHandle>>
    {
        self.connections.get(socket_id)
    }

    pub fn get_all_online_sockets(&self) -> Vec<Arc<SocketHandle>>
    {
        self.connections.all_sockets()
    }

    pub fn heartbeat_interval(&self) -> Duration
    {
        self.config.heartbeat.interval
    }

    pub fn heartbeat_timeout(&self) -> Duration
    {
        self.config.heartbeat.timeout
    }

    /// Sockets past the heartbeat timeout with no pong observed, for a reaper sweep independent of each
    /// connection's own ticker (belt-and-suspenders: catches a task that stopped polling entirely).
    pub fn stale_sockets(&self) -> Vec<Arc<SocketHandle>>
    {
        self.connections.stale_sockets(self.heartbeat_timeout())
    }
}

//-------------------------------------------------------------------------------------------------------------------
