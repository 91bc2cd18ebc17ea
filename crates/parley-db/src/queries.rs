use crate::Database;
use crate::models::{ConversationRow, ParticipantRow};
use crate::policy;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

impl Database {
    // -- Users --

    /// Mirror a user row from the identity service.
    pub fn create_user(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO users (id, username) VALUES (?1, ?2)", (id, username))?;
            Ok(())
        })
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", [id], |row| {
                row.get(0)
            })?;
            Ok(exists)
        })
    }

    // -- Conversations --

    /// Insert a conversation with a freshly generated id and return it.
    pub fn insert_conversation(&self, created_by: &str) -> Result<String> {
        self.with_conn(|conn| {
            policy::ensure_known_user(conn, created_by, "create conversations")?;

            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO conversations (id, created_by) VALUES (?1, ?2)",
                (&id, created_by),
            )?;
            Ok(id)
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    // -- Participants --

    /// Participant rows for `users`, limited to conversations `caller` is a
    /// member of. One set-membership query; the membership filter is the
    /// same single-row test as [`policy::is_participant`].
    pub fn participants_visible_to(&self, caller: &str, users: [&str; 2]) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            policy::ensure_known_user(conn, caller, "read conversation participants")?;

            let mut stmt = conn.prepare(
                "SELECT p.conversation_id, p.user_id
                 FROM conversation_participants p
                 WHERE p.user_id IN (?2, ?3)
                   AND EXISTS (
                       SELECT 1 FROM conversation_participants m
                       WHERE m.conversation_id = p.conversation_id AND m.user_id = ?1
                   )",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![caller, users[0], users[1]], |row| {
                    Ok(ParticipantRow {
                        conversation_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Add `user_id` to a conversation on behalf of `caller`. A duplicate
    /// `(conversation_id, user_id)` surfaces SQLite's UNIQUE violation as-is.
    pub fn insert_participant(&self, caller: &str, conversation_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            policy::ensure_can_add(conn, caller, conversation_id, user_id)?;

            conn.execute(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES (?1, ?2)",
                (conversation_id, user_id),
            )?;
            Ok(())
        })
    }

    /// Every participant row of a conversation, unfiltered. For diagnostics.
    pub fn participants_in(&self, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT conversation_id, user_id FROM conversation_participants
                 WHERE conversation_id = ?1
                 ORDER BY created_at, user_id",
            )?;
            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(ParticipantRow {
                        conversation_id: row.get(0)?,
                        user_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Orphans --

    /// Conversations older than `grace_secs` that never reached two
    /// participants.
    pub fn orphan_conversations(&self, grace_secs: u64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT c.id, c.created_by, c.created_at, c.updated_at
                 FROM conversations c
                 WHERE {}
                 ORDER BY c.created_at",
                ORPHAN_FILTER
            ))?;
            let rows = stmt
                .query_map([older_than(grace_secs)], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_by: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete orphans older than `grace_secs`. Participant rows go with them
    /// via `ON DELETE CASCADE`. Returns the number of conversations removed.
    pub fn delete_orphan_conversations(&self, grace_secs: u64) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                &format!(
                    "DELETE FROM conversations WHERE id IN (SELECT c.id FROM conversations c WHERE {})",
                    ORPHAN_FILTER
                ),
                [older_than(grace_secs)],
            )?;
            Ok(deleted)
        })
    }
}

const ORPHAN_FILTER: &str = "c.created_at < datetime('now', ?1)
    AND (SELECT COUNT(*) FROM conversation_participants p WHERE p.conversation_id = c.id) < 2";

fn older_than(grace_secs: u64) -> String {
    format!("-{} seconds", grace_secs)
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let row = conn
        .query_row(
            "SELECT id, created_by, created_at, updated_at FROM conversations WHERE id = ?1",
            [id],
            |row| {
                Ok(ConversationRow {
                    id: row.get(0)?,
                    created_by: row.get(1)?,
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(row)
}
