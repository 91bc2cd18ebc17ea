use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One `(conversation_id, user_id)` membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
}
