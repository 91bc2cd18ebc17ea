//! Membership policy gating every conversation read and write.
//!
//! `is_participant` is a single lookup against `conversation_participants`
//! and never calls back into the policy, so checking it while guarding that
//! same table cannot recurse.

use anyhow::Result;
use parley_resolver::AccessDenied;
use rusqlite::Connection;
use uuid::Uuid;

pub fn is_participant(conn: &Connection, conversation_id: &str, user_id: &str) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM conversation_participants
            WHERE conversation_id = ?1 AND user_id = ?2
         )",
        [conversation_id, user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Reject callers the identity service never provisioned.
pub fn ensure_known_user(conn: &Connection, caller: &str, action: &str) -> Result<()> {
    let known: bool = conn.query_row("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)", [caller], |row| {
        row.get(0)
    })?;
    if known {
        Ok(())
    } else {
        Err(denied(caller, action))
    }
}

/// A caller may always add itself; adding anyone else requires the caller to
/// already be a member of the conversation.
pub fn ensure_can_add(conn: &Connection, caller: &str, conversation_id: &str, user_id: &str) -> Result<()> {
    ensure_known_user(conn, caller, "add participants")?;
    if caller == user_id || is_participant(conn, conversation_id, caller)? {
        Ok(())
    } else {
        Err(denied(
            caller,
            &format!("add {} to conversation {}", user_id, conversation_id),
        ))
    }
}

fn denied(caller: &str, action: &str) -> anyhow::Error {
    AccessDenied::new(caller.parse::<Uuid>().unwrap_or_default(), action).into()
}
