use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::error;
use uuid::Uuid;

use parley_resolver::ConversationStore;
use parley_types::models::Participant;

use crate::Database;
use crate::models::ParticipantRow;

/// [`ConversationStore`] over SQLite. Each call runs on the blocking pool so
/// the connection mutex never stalls the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("store task failed: {}", e)
            })?
    }
}

impl ConversationStore for SqliteStore {
    async fn participants_of(&self, caller: Uuid, users: [Uuid; 2]) -> Result<Vec<Participant>> {
        let rows = self
            .blocking(move |db| {
                db.participants_visible_to(
                    &caller.to_string(),
                    [&users[0].to_string(), &users[1].to_string()],
                )
            })
            .await?;

        // A row we cannot read could be half of an existing match, so fail
        // the lookup rather than risk creating a duplicate.
        rows.into_iter().map(parse_participant).collect()
    }

    async fn insert_conversation(&self, created_by: Uuid) -> Result<Uuid> {
        let id = self
            .blocking(move |db| db.insert_conversation(&created_by.to_string()))
            .await?;
        id.parse()
            .map_err(|e| anyhow!("store returned malformed conversation id '{}': {}", id, e))
    }

    async fn insert_participant(&self, caller: Uuid, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.blocking(move |db| {
            db.insert_participant(
                &caller.to_string(),
                &conversation_id.to_string(),
                &user_id.to_string(),
            )
        })
        .await
    }
}

fn parse_participant(row: ParticipantRow) -> Result<Participant> {
    match (row.conversation_id.parse(), row.user_id.parse()) {
        (Ok(conversation_id), Ok(user_id)) => Ok(Participant {
            conversation_id,
            user_id,
        }),
        _ => Err(anyhow!(
            "corrupt participant row ({}, {})",
            row.conversation_id,
            row.user_id
        )),
    }
}
