//module tree
pub mod connections;
pub mod messages;
pub mod per_user_limits;
pub mod presence;
pub mod rooms;
pub mod typing;

//API exports
pub use connections::{ConnectionStore, SocketHandle};
pub use messages::MessageStore;
pub use per_user_limits::PerUserLimiterStore;
pub use presence::PresenceStore;
pub use rooms::RoomStore;
pub use typing::TypingLimiterStore;

//-------------------------------------------------------------------------------------------------------------------

/// Aggregate of every in-process store, shared across the server behind an `Arc` (spec §3).
#[derive(Default)]
pub struct Stores
{
    pub connections: ConnectionStore,
    pub messages: MessageStore,
    pub rooms: RoomStore,
    pub presence: PresenceStore,
    pub typing: TypingLimiterStore,
    pub per_user_limits: PerUserLimiterStore,
}

impl Stores
{
    pub fn new() -> Self
    {
        Self::default()
    }
}

//-------------------------------------------------------------------------------------------------------------------
