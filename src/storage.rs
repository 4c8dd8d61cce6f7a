//! SQLite storage layer for chatterd.
//!
//! Owns the schema and every query in the system: user accounts and OTP
//! state, the friend-request state machine, friendships, conversations, and
//! the message thread read model. The only multi-statement write is
//! [`Storage::accept_friend_request`], which runs in a single transaction.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    NotFound(String),
    Conflict(String),
    InvalidArgument(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StorageError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Friend request lifecycle. `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    fn from_db(idx: usize, s: &str) -> rusqlite::Result<Self> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "accepted" => Ok(RequestStatus::Accepted),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("unknown request status {other:?}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }

    fn from_db(idx: usize, s: &str) -> rusqlite::Result<Self> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            other => Err(rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("unknown message type {other:?}").into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Full user row, including OTP state. Never serialized to clients as-is;
/// use [`UserRow::profile`] for anything that leaves the process.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: i64,
    pub email: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub profile_image: Option<String>,
    pub otp: Option<String>,
    pub otp_expires_at: Option<u64>,
    pub is_verified: bool,
    pub is_online: bool,
    pub last_seen: Option<u64>,
    pub created_at: u64,
}

/// Public profile snapshot: the fields other users are allowed to see,
/// including live presence.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub name: Option<String>,
    pub username: Option<String>,
    pub profile_image: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<u64>,
}

impl UserRow {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.user_id,
            name: self.name.clone(),
            username: self.username.clone(),
            profile_image: self.profile_image.clone(),
            is_online: self.is_online,
            last_seen: self.last_seen,
        }
    }
}

/// All-optional profile patch. Each present field is validated independently
/// by the handler and compiled into one parameterized UPDATE.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub username: Option<String>,
    pub profile_image: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.username.is_none() && self.profile_image.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub request_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub status: RequestStatus,
    pub created_at: u64,
}

/// A pending incoming request joined with the sender's profile.
#[derive(Debug, Clone, Serialize)]
pub struct IncomingRequest {
    pub request_id: i64,
    pub created_at: u64,
    pub sender: UserProfile,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub conversation_id: i64,
    pub user1_id: i64,
    pub user2_id: i64,
    pub last_message_id: Option<i64>,
    pub created_at: u64,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub message_id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub conversation_id: Option<i64>,
    pub body: String,
    pub message_type: MessageType,
    pub is_read: bool,
    pub sent_at: u64,
}

/// One entry of the thread list: the latest message exchanged with a
/// counterparty plus the caller's unread count for that pair.
#[derive(Debug, Clone)]
pub struct ThreadSummary {
    pub latest: MessageRow,
    pub unread_count: u32,
}

/// Canonicalize an unordered user pair as (min, max) for storage.
pub fn ordered_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database, used by the test suites.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id         INTEGER PRIMARY KEY AUTOINCREMENT,
                email           TEXT NOT NULL UNIQUE,
                name            TEXT,
                username        TEXT UNIQUE,
                profile_image   TEXT,
                otp             TEXT,
                otp_expires_at  INTEGER,
                is_verified     INTEGER NOT NULL DEFAULT 0,
                is_online       INTEGER NOT NULL DEFAULT 0,
                last_seen       INTEGER,
                created_at      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS friend_requests (
                request_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id   INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                receiver_id INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  INTEGER NOT NULL,
                UNIQUE (sender_id, receiver_id)
            );

            CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
                ON friend_requests(receiver_id, status);

            CREATE TABLE IF NOT EXISTS friendships (
                friendship_id   INTEGER PRIMARY KEY AUTOINCREMENT,
                user1_id        INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                user2_id        INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                created_at      INTEGER NOT NULL,
                UNIQUE (user1_id, user2_id)
            );

            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user1_id        INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                user2_id        INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                last_message_id INTEGER,
                created_at      INTEGER NOT NULL,
                UNIQUE (user1_id, user2_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                message_id      INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id       INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                receiver_id     INTEGER NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                conversation_id INTEGER REFERENCES conversations(conversation_id) ON DELETE SET NULL,
                body            TEXT NOT NULL,
                message_type    TEXT NOT NULL DEFAULT 'text',
                is_read         INTEGER NOT NULL DEFAULT 0,
                sent_at         INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_sender
                ON messages(sender_id, receiver_id);
            CREATE INDEX IF NOT EXISTS idx_messages_receiver
                ON messages(receiver_id, is_read);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Create a user on first OTP issuance, or refresh the OTP (and name, if
    /// given) on repeat issuance. Returns the user id.
    pub fn upsert_user_otp(
        &self,
        email: &str,
        name: Option<&str>,
        otp: &str,
        expires_at: u64,
        now: u64,
    ) -> Result<i64, StorageError> {
        if let Some(existing) = self.find_user_by_email(email)? {
            self.conn.execute(
                "UPDATE users SET otp = ?1, otp_expires_at = ?2, name = COALESCE(?3, name)
                 WHERE user_id = ?4",
                params![otp, expires_at as i64, name, existing.user_id],
            )?;
            Ok(existing.user_id)
        } else {
            self.conn.execute(
                "INSERT INTO users (email, name, otp, otp_expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![email, name, otp, expires_at as i64, now as i64],
            )?;
            Ok(self.conn.last_insert_rowid())
        }
    }

    /// Consume a matching, unexpired OTP: clears it, marks the user verified
    /// and online, and returns the fresh row. `None` means invalid or expired.
    pub fn take_verified_otp(
        &self,
        email: &str,
        otp: &str,
        now: u64,
    ) -> Result<Option<UserRow>, StorageError> {
        let user_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT user_id FROM users
                 WHERE email = ?1 AND otp = ?2 AND otp_expires_at >= ?3",
                params![email, otp, now as i64],
                |row| row.get(0),
            )
            .optional()?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        self.conn.execute(
            "UPDATE users
             SET otp = NULL, otp_expires_at = NULL, is_verified = 1, is_online = 1
             WHERE user_id = ?1",
            params![user_id],
        )?;
        self.get_user(user_id)
    }

    pub fn get_user(&self, user_id: i64) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT} WHERE user_id = ?1"))?;
        let row = stmt.query_row(params![user_id], user_from_row).optional()?;
        Ok(row)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT} WHERE email = ?1"))?;
        let row = stmt.query_row(params![email], user_from_row).optional()?;
        Ok(row)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT} WHERE username = ?1"))?;
        let row = stmt
            .query_row(params![username], user_from_row)
            .optional()?;
        Ok(row)
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT} ORDER BY user_id"))?;
        let rows = stmt.query_map([], user_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn username_taken(&self, username: &str, exclude_user: i64) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 AND user_id != ?2",
            params![username, exclude_user],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Apply a profile patch as one parameterized UPDATE. Only the fields
    /// present in the patch are touched. Empty patches are rejected.
    pub fn update_user(&self, user_id: i64, patch: &UserPatch) -> Result<bool, StorageError> {
        if patch.is_empty() {
            return Err(StorageError::InvalidArgument(
                "no fields to update".to_string(),
            ));
        }

        let mut sql = String::from("UPDATE users SET ");
        let mut sets: Vec<&str> = Vec::new();
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref name) = patch.name {
            sets.push("name = ?");
            bind_values.push(Box::new(name.clone()));
        }
        if let Some(ref username) = patch.username {
            sets.push("username = ?");
            bind_values.push(Box::new(username.clone()));
        }
        if let Some(ref image) = patch.profile_image {
            sets.push("profile_image = ?");
            bind_values.push(Box::new(image.clone()));
        }
        sql.push_str(&sets.join(", "));
        sql.push_str(" WHERE user_id = ?");
        bind_values.push(Box::new(user_id));

        let bind_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let affected = self.conn.execute(&sql, bind_refs.as_slice())?;
        Ok(affected > 0)
    }

    pub fn set_online(
        &self,
        user_id: i64,
        online: bool,
        last_seen: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET is_online = ?1, last_seen = ?2 WHERE user_id = ?3",
            params![online as i32, last_seen as i64, user_id],
        )?;
        Ok(affected > 0)
    }

    /// Hard delete. Dependent requests, friendships, conversations, and
    /// messages go with the user via FK cascade.
    pub fn delete_user(&self, user_id: i64) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Friend requests / friendships / conversations
    // -----------------------------------------------------------------------

    /// Find the request row for an unordered pair, regardless of direction
    /// or status. At most one such row can exist.
    pub fn find_request_between(
        &self,
        a: i64,
        b: i64,
    ) -> Result<Option<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT request_id, sender_id, receiver_id, status, created_at
             FROM friend_requests
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
        )?;
        let row = stmt.query_row(params![a, b], request_from_row).optional()?;
        Ok(row)
    }

    /// Insert a pending friend request. Fails `InvalidArgument` on
    /// self-requests and `Conflict` if any request row already exists for the
    /// pair in either direction, whatever its status. The UNIQUE constraint
    /// on (sender_id, receiver_id) backs this check at the storage level.
    pub fn insert_friend_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
        now: u64,
    ) -> Result<i64, StorageError> {
        if sender_id == receiver_id {
            return Err(StorageError::InvalidArgument(
                "cannot send a friend request to yourself".to_string(),
            ));
        }
        if self.find_request_between(sender_id, receiver_id)?.is_some() {
            return Err(StorageError::Conflict(
                "friend request already pending or you are already friends".to_string(),
            ));
        }
        self.conn.execute(
            "INSERT INTO friend_requests (sender_id, receiver_id, status, created_at)
             VALUES (?1, ?2, 'pending', ?3)",
            params![sender_id, receiver_id, now as i64],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_friend_request(
        &self,
        request_id: i64,
    ) -> Result<Option<FriendRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT request_id, sender_id, receiver_id, status, created_at
             FROM friend_requests WHERE request_id = ?1",
        )?;
        let row = stmt
            .query_row(params![request_id], request_from_row)
            .optional()?;
        Ok(row)
    }

    /// Pending requests targeting `user_id`, joined with each sender's profile.
    pub fn list_incoming_requests(
        &self,
        user_id: i64,
    ) -> Result<Vec<IncomingRequest>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT fr.request_id, fr.created_at,
                    u.user_id, u.name, u.username, u.profile_image, u.is_online, u.last_seen
             FROM friend_requests fr
             JOIN users u ON fr.sender_id = u.user_id
             WHERE fr.receiver_id = ?1 AND fr.status = 'pending'
             ORDER BY fr.created_at DESC, fr.request_id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(IncomingRequest {
                request_id: row.get(0)?,
                created_at: row.get::<_, i64>(1)? as u64,
                sender: UserProfile {
                    user_id: row.get(2)?,
                    name: row.get(3)?,
                    username: row.get(4)?,
                    profile_image: row.get(5)?,
                    is_online: row.get::<_, i32>(6)? != 0,
                    last_seen: row.get::<_, Option<i64>>(7)?.map(|t| t as u64),
                },
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Accept a pending request: mark it accepted, insert the friendship row
    /// keyed by (min, max), and create the conversation for the pair if none
    /// exists. All three writes happen in one transaction; any failure rolls
    /// the whole acceptance back.
    pub fn accept_friend_request(
        &self,
        request: &FriendRequestRow,
        now: u64,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "UPDATE friend_requests SET status = 'accepted' WHERE request_id = ?1",
            params![request.request_id],
        )?;

        let (lo, hi) = ordered_pair(request.sender_id, request.receiver_id);
        tx.execute(
            "INSERT INTO friendships (user1_id, user2_id, created_at) VALUES (?1, ?2, ?3)",
            params![lo, hi, now as i64],
        )?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE (user1_id = ?1 AND user2_id = ?2)
                OR (user1_id = ?2 AND user2_id = ?1)",
            params![request.sender_id, request.receiver_id],
            |row| row.get(0),
        )?;
        if existing == 0 {
            tx.execute(
                "INSERT INTO conversations (user1_id, user2_id, created_at) VALUES (?1, ?2, ?3)",
                params![lo, hi, now as i64],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Mark a pending request rejected. Terminal; creates no friendship or
    /// conversation rows. Returns false if the request was not pending.
    pub fn reject_friend_request(&self, request_id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE friend_requests SET status = 'rejected'
             WHERE request_id = ?1 AND status = 'pending'",
            params![request_id],
        )?;
        Ok(affected > 0)
    }

    /// All users joined to `user_id` by a friendship row, with presence.
    pub fn list_friends(&self, user_id: i64) -> Result<Vec<UserProfile>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT u.user_id, u.name, u.username, u.profile_image, u.is_online, u.last_seen
             FROM friendships f
             JOIN users u ON (f.user1_id = u.user_id OR f.user2_id = u.user_id)
             WHERE (f.user1_id = ?1 OR f.user2_id = ?1) AND u.user_id != ?1
             ORDER BY u.user_id",
        )?;
        let rows = stmt.query_map(params![user_id], profile_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn are_friends(&self, a: i64, b: i64) -> Result<bool, StorageError> {
        let (lo, hi) = ordered_pair(a, b);
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM friendships WHERE user1_id = ?1 AND user2_id = ?2",
            params![lo, hi],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn find_conversation(
        &self,
        a: i64,
        b: i64,
    ) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT conversation_id, user1_id, user2_id, last_message_id, created_at
             FROM conversations
             WHERE (user1_id = ?1 AND user2_id = ?2)
                OR (user1_id = ?2 AND user2_id = ?1)",
        )?;
        let row = stmt
            .query_row(params![a, b], |row| {
                Ok(ConversationRow {
                    conversation_id: row.get(0)?,
                    user1_id: row.get(1)?,
                    user2_id: row.get(2)?,
                    last_message_id: row.get(3)?,
                    created_at: row.get::<_, i64>(4)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn conversation_count(&self, a: i64, b: i64) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversations
             WHERE (user1_id = ?1 AND user2_id = ?2)
                OR (user1_id = ?2 AND user2_id = ?1)",
            params![a, b],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Insert an unread message and return its id. The body must be
    /// non-empty; threads are derived from the messages table directly, so no
    /// conversation row is required (or linked) here.
    pub fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        body: &str,
        message_type: MessageType,
        now: u64,
    ) -> Result<i64, StorageError> {
        if body.trim().is_empty() {
            return Err(StorageError::InvalidArgument(
                "message body cannot be empty".to_string(),
            ));
        }
        self.conn.execute(
            "INSERT INTO messages (sender_id, receiver_id, body, message_type, is_read, sent_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                sender_id,
                receiver_id,
                body,
                message_type.as_str(),
                now as i64
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_message(&self, message_id: i64) -> Result<Option<MessageRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MESSAGE_SELECT} WHERE message_id = ?1"))?;
        let row = stmt
            .query_row(params![message_id], message_from_row)
            .optional()?;
        Ok(row)
    }

    /// One entry per counterparty `user_id` has exchanged messages with: the
    /// highest-id message of the pair plus the caller's unread count (messages
    /// sent *to* the caller by that counterparty, still unread). Ordered by
    /// the latest message's send time, newest first. Computed fresh on every
    /// call; presence and profile fields are joined live by the handler.
    pub fn list_threads(&self, user_id: i64) -> Result<Vec<ThreadSummary>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "{MESSAGE_SELECT_M},
                    (SELECT COUNT(*) FROM messages m2
                     WHERE m2.receiver_id = ?1
                       AND m2.sender_id = CASE WHEN m.sender_id = ?1
                                               THEN m.receiver_id
                                               ELSE m.sender_id END
                       AND m2.is_read = 0) AS unread_count
             FROM messages m
             WHERE m.message_id IN (
                 SELECT MAX(message_id) FROM messages
                 WHERE sender_id = ?1 OR receiver_id = ?1
                 GROUP BY MIN(sender_id, receiver_id), MAX(sender_id, receiver_id)
             )
             ORDER BY m.sent_at DESC, m.message_id DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ThreadSummary {
                latest: message_from_row(row)?,
                unread_count: row.get::<_, i64>(8)? as u32,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Full message history between two users, oldest first. No pagination.
    pub fn list_pair_messages(&self, a: i64, b: i64) -> Result<Vec<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "{MESSAGE_SELECT}
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY sent_at ASC, message_id ASC"
        ))?;
        let rows = stmt.query_map(params![a, b], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Set `is_read` only on the message whose (sender, receiver) exactly
    /// matches the supplied direction. A mismatched direction updates zero
    /// rows and is not an error; callers must pass the correct direction.
    pub fn mark_seen(
        &self,
        message_id: i64,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET is_read = 1
             WHERE message_id = ?1 AND sender_id = ?2 AND receiver_id = ?3",
            params![message_id, sender_id, receiver_id],
        )?;
        Ok(affected > 0)
    }

    /// Delete a message, but only for its sender. Returns false both when the
    /// message does not exist and when the caller is not the sender, so
    /// non-owners cannot probe for existence.
    pub fn delete_message(&self, message_id: i64, sender_id: i64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "DELETE FROM messages WHERE message_id = ?1 AND sender_id = ?2",
            params![message_id, sender_id],
        )?;
        Ok(affected > 0)
    }

    /// Count of unread messages sent by `from` to `to`. Test/diagnostic view
    /// of the same quantity `list_threads` aggregates.
    pub fn unread_count(&self, to: i64, from: i64) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages
             WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![from, to],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }
}

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

const USER_SELECT: &str = "SELECT user_id, email, name, username, profile_image, otp, \
     otp_expires_at, is_verified, is_online, last_seen, created_at FROM users";

const MESSAGE_SELECT: &str = "SELECT message_id, sender_id, receiver_id, conversation_id, \
     body, message_type, is_read, sent_at FROM messages";

const MESSAGE_SELECT_M: &str = "SELECT m.message_id, m.sender_id, m.receiver_id, \
     m.conversation_id, m.body, m.message_type, m.is_read, m.sent_at";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        username: row.get(3)?,
        profile_image: row.get(4)?,
        otp: row.get(5)?,
        otp_expires_at: row.get::<_, Option<i64>>(6)?.map(|t| t as u64),
        is_verified: row.get::<_, i32>(7)? != 0,
        is_online: row.get::<_, i32>(8)? != 0,
        last_seen: row.get::<_, Option<i64>>(9)?.map(|t| t as u64),
        created_at: row.get::<_, i64>(10)? as u64,
    })
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        user_id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        profile_image: row.get(3)?,
        is_online: row.get::<_, i32>(4)? != 0,
        last_seen: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
    })
}

fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        request_id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: RequestStatus::from_db(3, &row.get::<_, String>(3)?)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        message_id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        conversation_id: row.get(3)?,
        body: row.get(4)?,
        message_type: MessageType::from_db(5, &row.get::<_, String>(5)?)?,
        is_read: row.get::<_, i32>(6)? != 0,
        sent_at: row.get::<_, i64>(7)? as u64,
    })
}

/// Derive the database file path inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("chatterd.db")
}
