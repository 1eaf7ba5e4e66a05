//! Cross-node fan-out hook (spec §4.6, "Cross-node hook"). Described but not implemented: a single-node
//! deployment fans out to its own sockets directly and publishes the envelope so that, in a multi-node
//! deployment, peers subscribed to the same room id would mirror the send to their own local sockets. Sticky
//! sessions by connection are assumed at the load balancer, so a room's writers may still be spread across
//! nodes while each socket's reader stays pinned to one.

//local shortcuts
use crate::ids::RoomId;

//third-party shortcuts

//standard shortcuts
use std::sync::Arc;

//-------------------------------------------------------------------------------------------------------------------

pub trait RoomPubSub: Send + Sync
{
    fn publish(&self, room_id: &RoomId, payload: &[u8]);
    fn subscribe(&self, room_id: &RoomId, handler: Arc<dyn Fn(&[u8]) + Send + Sync>);
}

//-------------------------------------------------------------------------------------------------------------------

/// No-op implementation for single-node deployments: `publish` is a deliberate no-op (there are no peers to
/// notify) and `subscribe` never fires. Swap in a real backend (e.g. a pub/sub broker) for multi-node fan-out.
#[derive(Default)]
pub struct NullPubSub;

impl RoomPubSub for NullPubSub
{
    fn publish(&self, _room_id: &RoomId, _payload: &[u8]) {}

    fn subscribe(&self, _room_id: &RoomId, _handler: Arc<dyn Fn(&[u8]) + Send + Sync>) {}
}

//-------------------------------------------------------------------------------------------------------------------
