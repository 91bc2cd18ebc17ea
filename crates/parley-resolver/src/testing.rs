//! Scripted in-memory store for resolver tests. Applies the same membership
//! policy as the SQLite store and can inject backend-shaped failures.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use parley_types::models::Participant;

use crate::store::{AccessDenied, ConversationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Deny,
    Hang,
    Conflict,
    Busy,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Lookup,
    InsertConversation,
    InsertParticipant(Uuid, Uuid),
}

#[derive(Default)]
struct State {
    conversations: Vec<Uuid>,
    participants: Vec<Participant>,
    calls: Vec<Call>,
    conversation_inserts: usize,
    participant_inserts: usize,
    lookup_fault: Option<Fault>,
    /// Keyed by 1-based participant insert attempt.
    participant_faults: HashMap<usize, Fault>,
}

impl State {
    fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.participants
            .iter()
            .any(|p| p.conversation_id == conversation_id && p.user_id == user_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    latency: Duration,
}

impl MemoryStore {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn fail_lookup(&self, fault: Fault) {
        self.state().lookup_fault = Some(fault);
    }

    pub fn fail_participant_insert(&self, attempt: usize, fault: Fault) {
        self.state().participant_faults.insert(attempt, fault);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.lookup_fault = None;
        state.participant_faults.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn conversation_count(&self) -> usize {
        self.state().conversations.len()
    }

    pub fn conversation_inserts(&self) -> usize {
        self.state().conversation_inserts
    }

    pub fn participant_count(&self) -> usize {
        self.state().participants.len()
    }

    pub fn members_of(&self, conversation_id: Uuid) -> BTreeSet<Uuid> {
        self.state()
            .participants
            .iter()
            .filter(|p| p.conversation_id == conversation_id)
            .map(|p| p.user_id)
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    async fn settle(&self, fault: Option<Fault>, caller: Uuid, action: &str) -> anyhow::Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match fault {
            None => Ok(()),
            Some(Fault::Hang) => std::future::pending().await,
            Some(Fault::Deny) => Err(AccessDenied::new(caller, action).into()),
            Some(Fault::Conflict) => Err(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE).into()),
            Some(Fault::Busy) => Err(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).into()),
            Some(Fault::Broken) => Err(anyhow::anyhow!("malformed participant row")),
        }
    }
}

fn sqlite_failure(code: i32) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
}

impl ConversationStore for MemoryStore {
    async fn participants_of(&self, caller: Uuid, users: [Uuid; 2]) -> anyhow::Result<Vec<Participant>> {
        let fault = {
            let mut state = self.state();
            state.calls.push(Call::Lookup);
            state.lookup_fault
        };
        self.settle(fault, caller, "read conversation participants").await?;

        let state = self.state();
        let rows = state
            .participants
            .iter()
            .filter(|p| users.contains(&p.user_id) && state.is_participant(p.conversation_id, caller))
            .copied()
            .collect();
        Ok(rows)
    }

    async fn insert_conversation(&self, _created_by: Uuid) -> anyhow::Result<Uuid> {
        self.state().calls.push(Call::InsertConversation);
        self.settle(None, Uuid::nil(), "create conversations").await?;

        let id = Uuid::new_v4();
        let mut state = self.state();
        state.conversation_inserts += 1;
        state.conversations.push(id);
        Ok(id)
    }

    async fn insert_participant(&self, caller: Uuid, conversation_id: Uuid, user_id: Uuid) -> anyhow::Result<()> {
        let fault = {
            let mut state = self.state();
            state.calls.push(Call::InsertParticipant(conversation_id, user_id));
            state.participant_inserts += 1;
            let attempt = state.participant_inserts;
            state.participant_faults.get(&attempt).copied()
        };
        self.settle(fault, caller, "add participants").await?;

        let mut state = self.state();
        if user_id != caller && !state.is_participant(conversation_id, caller) {
            return Err(AccessDenied::new(caller, format!("add {} to conversation {}", user_id, conversation_id)).into());
        }
        if state.is_participant(conversation_id, user_id) {
            return Err(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE).into());
        }
        state.participants.push(Participant {
            conversation_id,
            user_id,
        });
        Ok(())
    }
}
