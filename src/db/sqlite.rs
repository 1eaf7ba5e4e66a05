//! SQLite-backed [`DbAdapter`] (spec §6, "Persisted state layout"). Grounded on the bundled-rusqlite,
//! migrate-on-open pattern from the retrieval pack's chat server: one `Connection` behind a `Mutex`, WAL mode,
//! `CREATE TABLE IF NOT EXISTS` migrations run once at startup.
//!
//! `rusqlite` is synchronous, so every call is dispatched through `spawn_blocking` to keep the async runtime's
//! worker threads free.

//local shortcuts
use crate::db::DbAdapter;
use crate::error::{DbError, DbResult};
use crate::model::{Message, MessageState, MessageType, Room, RoomMeta, RoomRole};

//third-party shortcuts
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

//standard shortcuts
use std::sync::Mutex;

//-------------------------------------------------------------------------------------------------------------------

pub struct SqliteAdapter
{
    conn: Mutex<Connection>,
}

impl SqliteAdapter
{
    pub fn open(path: &str) -> DbResult<Self>
    {
        let conn = Connection::open(path).map_err(|e| DbError::Backend(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| DbError::Backend(e.to_string()))?;
        let adapter = Self{ conn: Mutex::new(conn) };
        adapter.migrate()?;
        Ok(adapter)
    }

    pub fn open_in_memory() -> DbResult<Self>
    {
        let conn = Connection::open_in_memory().map_err(|e| DbError::Backend(e.to_string()))?;
        let adapter = Self{ conn: Mutex::new(conn) };
        adapter.migrate()?;
        Ok(adapter)
    }

    fn room_ids_for_user(&self, user_id: &str) -> DbResult<Vec<String>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare("SELECT room_id FROM room_members WHERE user_id = ?1")
            .map_err(|e| DbError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))
            .map_err(|e| DbError::Backend(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(rows)
    }

    fn migrate(&self) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                recipient_id TEXT,
                room_id TEXT,
                room_message_id TEXT,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                state TEXT NOT NULL,
                client_message_id TEXT,
                message_type TEXT NOT NULL,
                chat_id TEXT NOT NULL,
                edited_at INTEGER,
                deleted_at INTEGER,
                UNIQUE(sender_id, client_message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id, message_id);

            CREATE TABLE IF NOT EXISTS rooms (
                room_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                thumbnail_url TEXT,
                created_at INTEGER NOT NULL,
                created_by TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS room_members (
                room_id TEXT NOT NULL REFERENCES rooms(room_id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                joined_at INTEGER NOT NULL,
                PRIMARY KEY(room_id, user_id)
            );",
        )
        .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message>
    {
        let state: String = row.get("state")?;
        let message_type: String = row.get("message_type")?;
        Ok(Message{
            message_id: row.get("message_id")?,
            sender_id: row.get("sender_id")?,
            recipient_id: row.get("recipient_id")?,
            room_id: row.get("room_id")?,
            room_message_id: row.get("room_message_id")?,
            content: row.get("content")?,
            timestamp: row.get("timestamp")?,
            state: parse_message_state(&state),
            client_message_id: row.get("client_message_id")?,
            message_type: if message_type == "room" { MessageType::Room } else { MessageType::Direct },
            chat_id: row.get("chat_id")?,
            edited_at: row.get("edited_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }
}

fn message_state_label(state: MessageState) -> &'static str
{
    match state
    {
        MessageState::Sending => "sending",
        MessageState::Sent => "sent",
        MessageState::Delivered => "delivered",
        MessageState::Read => "read",
        MessageState::FailedBackpressure => "failed_backpressure",
    }
}

fn parse_message_state(label: &str) -> MessageState
{
    match label
    {
        "sent" => MessageState::Sent,
        "delivered" => MessageState::Delivered,
        "read" => MessageState::Read,
        "failed_backpressure" => MessageState::FailedBackpressure,
        _ => MessageState::Sending,
    }
}

fn room_role_label(role: RoomRole) -> &'static str
{
    match role
    {
        RoomRole::Member => "member",
        RoomRole::Admin => "admin",
        RoomRole::Owner => "owner",
    }
}

fn parse_room_role(label: &str) -> RoomRole
{
    match label
    {
        "admin" => RoomRole::Admin,
        "owner" => RoomRole::Owner,
        _ => RoomRole::Member,
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[async_trait]
impl DbAdapter for SqliteAdapter
{
    async fn insert_message(&self, message: &Message) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO messages (message_id, sender_id, recipient_id, room_id, room_message_id, content,
                timestamp, state, client_message_id, message_type, chat_id, edited_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                message.message_id,
                message.sender_id,
                message.recipient_id,
                message.room_id,
                message.room_message_id,
                message.content,
                message.timestamp,
                message_state_label(message.state),
                message.client_message_id,
                if message.message_type == MessageType::Room { "room" } else { "direct" },
                message.chat_id,
                message.edited_at,
                message.deleted_at,
            ],
        )
        .map_err(|e| match e
        {
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::UniqueViolation("client_message_id")
            }
            other => DbError::Backend(other.to_string()),
        })?;
        Ok(())
    }

    async fn find_message(&self, message_id: &str) -> DbResult<Option<Message>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row("SELECT * FROM messages WHERE message_id = ?1", params![message_id], Self::row_to_message)
            .optional()
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    async fn update_message_state(&self, message_id: &str, state: MessageState) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let rows = conn
            .execute(
                "UPDATE messages SET state = ?1 WHERE message_id = ?2",
                params![message_state_label(state), message_id],
            )
            .map_err(|e| DbError::Backend(e.to_string()))?;
        if rows == 0 { Err(DbError::NotFound) } else { Ok(()) }
    }

    async fn mark_edited(&self, message_id: &str, content: &str, edited_at: i64) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "UPDATE messages SET content = ?1, edited_at = ?2 WHERE message_id = ?3",
            params![content, edited_at, message_id],
        )
        .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn mark_deleted(&self, message_id: &str, deleted_at: i64) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("UPDATE messages SET deleted_at = ?1 WHERE message_id = ?2", params![deleted_at, message_id])
            .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn find_by_client_message_id(
        &self,
        sender_id: &str,
        client_message_id: &crate::ids::ClientMessageId,
    ) -> DbResult<Option<String>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.query_row(
            "SELECT message_id FROM messages WHERE sender_id = ?1 AND client_message_id = ?2",
            params![sender_id, client_message_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| DbError::Backend(e.to_string()))
    }

    async fn replay_chat(&self, chat_id: &str, after: Option<&str>, limit: usize) -> DbResult<Vec<Message>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let after = after.unwrap_or("");
        let mut stmt = conn
            .prepare(
                "SELECT * FROM messages WHERE chat_id = ?1 AND message_id > ?2 ORDER BY message_id ASC LIMIT ?3",
            )
            .map_err(|e| DbError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![chat_id, after, limit as i64], Self::row_to_message)
            .map_err(|e| DbError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| DbError::Backend(e.to_string()))
    }

    async fn find_room_message_recipients(&self, room_message_id: &str) -> DbResult<Vec<Message>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare("SELECT * FROM messages WHERE room_message_id = ?1 AND recipient_id IS NOT NULL")
            .map_err(|e| DbError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![room_message_id], Self::row_to_message)
            .map_err(|e| DbError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| DbError::Backend(e.to_string()))
    }

    async fn replay_candidates_for_user(&self, user_id: &str, after: Option<&str>, limit: usize) -> DbResult<Vec<Message>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let after = after.unwrap_or("");
        let mut stmt = conn
            .prepare(
                "SELECT * FROM messages WHERE recipient_id = ?1 AND message_id > ?2 ORDER BY message_id ASC LIMIT ?3",
            )
            .map_err(|e| DbError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id, after, limit as i64], Self::row_to_message)
            .map_err(|e| DbError::Backend(e.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(|e| DbError::Backend(e.to_string()))
    }

    async fn upsert_room(&self, room: &Room) -> DbResult<()>
    {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let tx = conn.transaction().map_err(|e| DbError::Backend(e.to_string()))?;
        tx.execute(
            "INSERT INTO rooms (room_id, name, thumbnail_url, created_at, created_by, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(room_id) DO UPDATE SET name = excluded.name, thumbnail_url = excluded.thumbnail_url,
                version = excluded.version, updated_at = excluded.updated_at",
            params![
                room.room_id,
                room.meta.name,
                room.meta.thumbnail_url,
                room.meta.created_at,
                room.meta.created_by,
                room.version as i64,
                room.updated_at,
            ],
        )
        .map_err(|e| DbError::Backend(e.to_string()))?;

        tx.execute("DELETE FROM room_members WHERE room_id = ?1", params![room.room_id])
            .map_err(|e| DbError::Backend(e.to_string()))?;
        for (user_id, role) in &room.roles
        {
            let joined_at = room.joined_at.get(user_id).copied().unwrap_or(room.updated_at);
            tx.execute(
                "INSERT INTO room_members (room_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
                params![room.room_id, user_id, room_role_label(*role), joined_at],
            )
            .map_err(|e| DbError::Backend(e.to_string()))?;
        }
        tx.commit().map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn find_room(&self, room_id: &str) -> DbResult<Option<Room>>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let meta = conn
            .query_row(
                "SELECT name, thumbnail_url, created_at, created_by, version, updated_at FROM rooms
                 WHERE room_id = ?1",
                params![room_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| DbError::Backend(e.to_string()))?;

        let Some((name, thumbnail_url, created_at, created_by, version, updated_at)) = meta else { return Ok(None) };

        let mut stmt = conn
            .prepare("SELECT user_id, role, joined_at FROM room_members WHERE room_id = ?1")
            .map_err(|e| DbError::Backend(e.to_string()))?;
        let rows = stmt
            .query_map(params![room_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(|e| DbError::Backend(e.to_string()))?;

        let mut roles = std::collections::HashMap::new();
        let mut joined_at = std::collections::HashMap::new();
        for row in rows
        {
            let (user_id, role, joined) = row.map_err(|e| DbError::Backend(e.to_string()))?;
            roles.insert(user_id.clone(), parse_room_role(&role));
            joined_at.insert(user_id, joined);
        }

        Ok(Some(Room{
            room_id: room_id.to_string(),
            meta: RoomMeta{ name, thumbnail_url, created_at, created_by },
            roles,
            joined_at,
            version: version as u64,
            updated_at,
        }))
    }

    async fn delete_room(&self, room_id: &str) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM rooms WHERE room_id = ?1", params![room_id])
            .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn rooms_for_user(&self, user_id: &str) -> DbResult<Vec<Room>>
    {
        let room_ids = self.room_ids_for_user(user_id)?;

        let mut rooms = Vec::with_capacity(room_ids.len());
        for room_id in room_ids
        {
            if let Some(room) = self.find_room(&room_id).await?
            {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    async fn set_room_role(&self, room_id: &str, user_id: &str, role: RoomRole) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "UPDATE room_members SET role = ?1 WHERE room_id = ?2 AND user_id = ?3",
            params![room_role_label(role), room_id, user_id],
        )
        .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove_room_member(&self, room_id: &str, user_id: &str) -> DbResult<()>
    {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM room_members WHERE room_id = ?1 AND user_id = ?2", params![room_id, user_id])
            .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(())
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;

    #[tokio::test]
    async fn insert_and_find_round_trips()
    {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let message = Message{
            message_id: "m1".into(),
            sender_id: "u1".into(),
            recipient_id: Some("u2".into()),
            room_id: None,
            room_message_id: None,
            content: "hi".into(),
            timestamp: 1,
            state: MessageState::Sending,
            client_message_id: Some("c1".into()),
            message_type: MessageType::Direct,
            chat_id: "direct:u1:u2".into(),
            edited_at: None,
            deleted_at: None,
        };
        adapter.insert_message(&message).await.unwrap();

        let found = adapter.find_message("m1").await.unwrap().unwrap();
        assert_eq!(found.content, "hi");

        let dup = adapter.find_by_client_message_id("u1", &"c1".to_string()).await.unwrap();
        assert_eq!(dup, Some("m1".to_string()));
    }

    #[tokio::test]
    async fn duplicate_client_message_id_is_rejected()
    {
        let adapter = SqliteAdapter::open_in_memory().unwrap();
        let message = Message{
            message_id: "m1".into(),
            sender_id: "u1".into(),
            recipient_id: Some("u2".into()),
            room_id: None,
            room_message_id: None,
            content: "hi".into(),
            timestamp: 1,
            state: MessageState::Sending,
            client_message_id: Some("c1".into()),
            message_type: MessageType::Direct,
            chat_id: "direct:u1:u2".into(),
            edited_at: None,
            deleted_at: None,
        };
        adapter.insert_message(&message).await.unwrap();

        let mut dup = message.clone();
        dup.message_id = "m2".into();
        let result = adapter.insert_message(&dup).await;
        assert!(matches!(result, Err(DbError::UniqueViolation(_))));
    }
}

//-------------------------------------------------------------------------------------------------------------------
