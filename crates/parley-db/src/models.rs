/// Database row types. These map directly to SQLite rows.
/// Distinct from parley-types models to keep the DB layer independent.

#[derive(Debug)]
pub struct ConversationRow {
    pub id: String,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct ParticipantRow {
    pub conversation_id: String,
    pub user_id: String,
}
