//! Outbound dispatch (spec §4.2, §4.5 "outbound safety path"): the only place that turns an [`OutboundFrame`]
//! into bytes on a wire. Every handler and service result flows through here before it touches a socket, so the
//! backpressure gate and the FAILED_BACKPRESSURE transition live in one spot rather than being re-implemented
//! per call site.

//local shortcuts
use crate::ids::{SocketId, UserId};
use crate::model::ReadyState;
use crate::protocol::{EnvelopedOutbound, OutboundFrame};
use crate::safety::SendOutcome;
use crate::stores::{ConnectionStore, SocketHandle};

//third-party shortcuts

//standard shortcuts
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

pub struct Dispatcher
{
    connections: Arc<ConnectionStore>,
}

impl Dispatcher
{
    pub fn new(connections: Arc<ConnectionStore>) -> Self
    {
        Self{ connections }
    }

    /// Serializes and enqueues `frame` on `socket`'s outbound queue. A queue overflow past the configured
    /// threshold marks the socket `Closing`; the transport's writer loop is responsible for actually tearing
    /// down the connection once it observes that state.
    pub fn send_to_socket(&self, socket: &SocketHandle, frame: OutboundFrame, correlation_id: Option<String>) -> SendOutcome
    {
        if !socket.is_open()
        {
            return SendOutcome::Rejected;
        }

        let envelope = EnvelopedOutbound{ frame, correlation_id };
        let bytes = match serde_json::to_vec(&envelope)
        {
            Ok(bytes) => bytes,
            Err(_) => return SendOutcome::Rejected,
        };

        let outcome = socket.backpressure.try_enqueue(bytes);
        if outcome == SendOutcome::SlowConsumerClose
        {
            *socket.ready_state.lock().unwrap_or_else(|e| e.into_inner()) = ReadyState::Closing;
        }
        outcome
    }

    /// Fans `frame` out to every live socket belonging to `user_id`, skipping `exclude_socket` (the sender's
    /// origin socket for room fan-out, spec §4.6). Returns the number of sockets the frame actually reached.
    pub fn send_to_user(
        &self,
        user_id: &UserId,
        frame: OutboundFrame,
        exclude_socket: Option<SocketId>,
    ) -> usize
    {
        let mut delivered = 0;
        for socket in self.connections.sockets_for_user(user_id)
        {
            if Some(socket.socket_id) == exclude_socket
            {
                continue;
            }
            if self.send_to_socket(&socket, frame.clone(), None) == SendOutcome::Sent
            {
                delivered += 1;
            }
        }
        delivered
    }

    pub fn broadcast_to_users(&self, user_ids: &[UserId], frame: OutboundFrame)
    {
        for user_id in user_ids
        {
            self.send_to_user(user_id, frame.clone(), None);
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------
