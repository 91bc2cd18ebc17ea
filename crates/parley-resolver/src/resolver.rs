use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::models::Participant;

use crate::classify::{ClassifiedError, ErrorKind, classify};
use crate::error::ResolveError;
use crate::guard::with_deadline;
use crate::store::ConversationStore;

/// Finds or creates the single direct conversation between two users.
///
/// Lookup and creation are separate, individually policy-compatible store
/// calls, each bounded by the same deadline. Nothing here retries.
pub struct ConversationResolver<S> {
    store: S,
    deadline: Duration,
}

impl<S: ConversationStore> ConversationResolver<S> {
    pub fn new(store: S, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub async fn resolve(&self, current_user: Uuid, other_user: Uuid) -> Result<Uuid, ResolveError> {
        if current_user == other_user {
            return Err(ResolveError::SelfConversation(current_user));
        }

        if let Some(conversation_id) = self.lookup(current_user, other_user).await? {
            debug!(
                "Found direct conversation {} between {} and {}",
                conversation_id, current_user, other_user
            );
            return Ok(conversation_id);
        }

        self.create(current_user, other_user).await
    }

    async fn lookup(&self, current_user: Uuid, other_user: Uuid) -> Result<Option<Uuid>, ClassifiedError> {
        let rows = with_deadline(
            self.store.participants_of(current_user, [current_user, other_user]),
            self.deadline,
            "participant lookup",
        )
        .await
        .map_err(|e| classify(&e))?;

        Ok(find_direct(&rows, current_user, other_user))
    }

    async fn create(&self, current_user: Uuid, other_user: Uuid) -> Result<Uuid, ResolveError> {
        let conversation_id = with_deadline(
            self.store.insert_conversation(current_user),
            self.deadline,
            "conversation insert",
        )
        .await
        .map_err(|e| classify(&e))?;

        // The caller must be a member before the policy lets it add anyone else.
        let steps = [
            (current_user, "self participant insert"),
            (other_user, "counterpart participant insert"),
        ];
        for (user_id, label) in steps {
            let inserted = with_deadline(
                self.store.insert_participant(current_user, conversation_id, user_id),
                self.deadline,
                label,
            )
            .await;

            if let Err(e) = inserted {
                let classified = classify(&e);
                if classified.kind == ErrorKind::Conflict {
                    debug!(
                        "Participant {} already present in conversation {}, continuing",
                        user_id, conversation_id
                    );
                    continue;
                }

                warn!(
                    "Conversation {} left without a full participant set: {}",
                    conversation_id, classified
                );
                return Err(classified.into());
            }
        }

        info!(
            "Created direct conversation {} between {} and {}",
            conversation_id, current_user, other_user
        );
        Ok(conversation_id)
    }
}

/// Pick the conversation whose participants, among `rows`, are exactly
/// `{a, b}`. Conversations missing either member (orphans) never match.
///
/// Should a cross-process race ever leave more than one, the lowest id wins so
/// every caller converges on the same conversation.
pub fn find_direct(rows: &[Participant], a: Uuid, b: Uuid) -> Option<Uuid> {
    let mut members: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
    for row in rows {
        members.entry(row.conversation_id).or_default().insert(row.user_id);
    }

    members
        .into_iter()
        .find(|(_, users)| users.len() == 2 && users.contains(&a) && users.contains(&b))
        .map(|(conversation_id, _)| conversation_id)
}
