//local shortcuts

//third-party shortcuts
use rand::Rng;

//standard shortcuts
use std::time::{SystemTime, UNIX_EPOCH};

//-------------------------------------------------------------------------------------------------------------------

pub type UserId = String;
pub type SessionId = String;
pub type SocketId = u64;
pub type MessageId = String;
pub type RoomId = String;
pub type RoomMessageId = String;
pub type CorrelationId = String;
pub type ClientMessageId = String;

//-------------------------------------------------------------------------------------------------------------------

fn now_millis() -> u128
{
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

//-------------------------------------------------------------------------------------------------------------------

/// Generates a time-monotonic, sortable message id: `<millis-base36>_<random-suffix>`.
///
/// The millis prefix preserves ordering semantics under coarse sort (spec §3, "Identifiers"); the random suffix
/// breaks ties between messages minted within the same millisecond.
pub fn new_message_id() -> MessageId
{
    let millis = now_millis();
    let suffix: u32 = rand::thread_rng().gen();
    format!("{:013}_{:08x}", millis, suffix)
}

//-------------------------------------------------------------------------------------------------------------------

/// Per-recipient message id for room fan-out: `rm_<roomMessageId>_<memberId>` (spec §4.5, "Room messages").
pub fn room_recipient_message_id(room_message_id: &RoomMessageId, member_id: &str) -> MessageId
{
    format!("rm_{}_{}", room_message_id, member_id)
}

//-------------------------------------------------------------------------------------------------------------------

pub fn new_correlation_id() -> CorrelationId
{
    uuid::Uuid::new_v4().to_string()
}

//-------------------------------------------------------------------------------------------------------------------

pub fn new_session_id() -> SessionId
{
    uuid::Uuid::new_v4().to_string()
}

//-------------------------------------------------------------------------------------------------------------------

/// Canonical chat id for a direct conversation: `direct:<userA>:<userB>` with the pair lexicographically sorted
/// (spec §6, "Persisted state layout").
pub fn direct_chat_id(user_a: &str, user_b: &str) -> String
{
    if user_a <= user_b
    {
        format!("direct:{}:{}", user_a, user_b)
    }
    else
    {
        format!("direct:{}:{}", user_b, user_a)
    }
}

//-------------------------------------------------------------------------------------------------------------------

pub fn room_chat_id(room_id: &str) -> String
{
    format!("room:{}", room_id)
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn direct_chat_id_is_order_independent()
    {
        assert_eq!(direct_chat_id("u1", "u2"), direct_chat_id("u2", "u1"));
    }

    #[test]
    fn message_ids_are_monotonic_under_sort()
    {
        let a = new_message_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_message_id();
        assert!(a < b);
    }
}

//-------------------------------------------------------------------------------------------------------------------
