use std::future::Future;

use thiserror::Error;
use uuid::Uuid;

use parley_types::models::Participant;

/// Raised by a store when its membership policy rejects an operation.
#[derive(Debug, Clone, Error)]
#[error("user {caller} is not permitted to {action}")]
pub struct AccessDenied {
    pub caller: Uuid,
    pub action: String,
}

impl AccessDenied {
    pub fn new(caller: Uuid, action: impl Into<String>) -> Self {
        Self {
            caller,
            action: action.into(),
        }
    }
}

/// Backing store for conversations and their participants.
///
/// Every call carries the acting user so the store can apply its membership
/// policy: a caller sees participant rows only for conversations it belongs
/// to, may add itself to any conversation, and may add someone else only to a
/// conversation it already belongs to. The policy must be answerable with a
/// single non-recursive `is_participant(conversation, user)` test.
///
/// Errors are left in the backend's own shape; callers run them through
/// [`classify`](crate::classify::classify).
pub trait ConversationStore: Send + Sync + 'static {
    /// Participant rows whose `user_id` is one of `users`, restricted to
    /// conversations visible to `caller`.
    fn participants_of(
        &self,
        caller: Uuid,
        users: [Uuid; 2],
    ) -> impl Future<Output = anyhow::Result<Vec<Participant>>> + Send;

    /// Insert a conversation row. The store assigns the id.
    fn insert_conversation(&self, created_by: Uuid) -> impl Future<Output = anyhow::Result<Uuid>> + Send;

    fn insert_participant(
        &self,
        caller: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
