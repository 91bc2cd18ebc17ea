use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::coalesce::Coalescer;
use crate::error::ResolveError;
use crate::resolver::ConversationResolver;
use crate::store::ConversationStore;

#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Applied to every individual store call.
    pub store_deadline: Duration,
    /// Hard ceiling on one coalesced resolution before its key is released.
    pub coalesce_ceiling: Duration,
}

/// Store calls one resolution can make in sequence: lookup, conversation
/// insert, then one insert per participant.
pub const STORE_CALLS_PER_RESOLUTION: u32 = 4;

impl ResolverConfig {
    /// Longest a resolution can take when every store call uses its full
    /// deadline.
    pub fn worst_case(&self) -> Duration {
        self.store_deadline * STORE_CALLS_PER_RESOLUTION
    }

    /// True when the ceiling cannot cut off a resolution whose store calls
    /// all finish inside their deadlines.
    pub fn ceiling_covers_worst_case(&self) -> bool {
        self.coalesce_ceiling >= self.worst_case()
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            store_deadline: Duration::from_secs(2),
            coalesce_ceiling: Duration::from_secs(10),
        }
    }
}

/// Symmetric key for an unordered user pair: both ids sorted, joined by `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}:{}", low, high))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry point for opening a 1-to-1 conversation: coalesces per user pair,
/// then resolves against the store.
pub struct DirectConversations<S> {
    resolver: Arc<ConversationResolver<S>>,
    coalescer: Coalescer<PairKey, Uuid, ResolveError>,
}

impl<S> Clone for DirectConversations<S> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            coalescer: self.coalescer.clone(),
        }
    }
}

impl<S: ConversationStore> DirectConversations<S> {
    pub fn new(store: S, config: ResolverConfig) -> Self {
        Self {
            resolver: Arc::new(ConversationResolver::new(store, config.store_deadline)),
            coalescer: Coalescer::new(config.coalesce_ceiling),
        }
    }

    /// Resolvers currently running, one per user pair.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }

    /// Id of the one direct conversation between the two users, created if
    /// it does not exist yet. Concurrent calls for the same pair, in either
    /// order, share a single resolution.
    pub async fn resolve_direct_conversation(
        &self,
        current_user: Uuid,
        other_user: Uuid,
    ) -> Result<Uuid, ResolveError> {
        if current_user == other_user {
            return Err(ResolveError::SelfConversation(current_user));
        }

        let resolver = Arc::clone(&self.resolver);
        self.coalescer
            .run(PairKey::new(current_user, other_user), move || async move {
                resolver.resolve(current_user, other_user).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use futures_util::future::join_all;

    use super::*;
    use crate::classify::ErrorKind;
    use crate::testing::{Fault, MemoryStore};

    fn service(store: &MemoryStore) -> DirectConversations<MemoryStore> {
        DirectConversations::new(store.clone(), ResolverConfig::default())
    }

    #[test]
    fn pair_key_is_symmetric() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);

        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_eq!(PairKey::new(b, a).as_str(), format!("{}:{}", a, b));
    }

    #[tokio::test(start_paused = true)]
    async fn ten_concurrent_calls_create_once() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = MemoryStore::with_latency(Duration::from_millis(20));
        let direct = service(&store);

        let results = join_all((0..10).map(|_| direct.resolve_direct_conversation(a, b))).await;

        let first = *results[0].as_ref().unwrap();
        assert!(results.iter().all(|r| r.as_ref().ok() == Some(&first)));
        assert_eq!(store.conversation_inserts(), 1);
        assert_eq!(store.conversation_count(), 1);
        assert_eq!(direct.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn opposite_orders_collapse_together() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = MemoryStore::with_latency(Duration::from_millis(20));
        let direct = service(&store);

        let (ab, ba) = tokio::join!(
            direct.resolve_direct_conversation(a, b),
            direct.resolve_direct_conversation(b, a),
        );

        assert_eq!(ab.unwrap(), ba.unwrap());
        assert_eq!(store.conversation_inserts(), 1);
    }

    #[test]
    fn default_ceiling_covers_every_store_call() {
        let config = ResolverConfig::default();

        assert!(config.ceiling_covers_worst_case());
        assert!(
            !ResolverConfig {
                store_deadline: Duration::from_secs(5),
                coalesce_ceiling: Duration::from_secs(10),
            }
            .ceiling_covers_worst_case()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_but_healthy_store_completes_under_defaults() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        // Every call just inside the default deadline.
        let store = MemoryStore::with_latency(Duration::from_millis(1900));
        let direct = service(&store);

        let id = direct.resolve_direct_conversation(a, b).await.unwrap();

        assert_eq!(store.conversation_count(), 1);
        assert_eq!(store.members_of(id).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_calls_after_success_add_no_rows() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = MemoryStore::default();
        let direct = service(&store);

        let first = direct.resolve_direct_conversation(a, b).await.unwrap();
        for _ in 0..5 {
            assert_eq!(direct.resolve_direct_conversation(a, b).await.unwrap(), first);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(direct.resolve_direct_conversation(b, a).await.unwrap(), first);

        assert_eq!(store.conversation_inserts(), 1);
        assert_eq!(store.participant_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_store_releases_the_pair() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = MemoryStore::default();
        // Store deadline above the ceiling, so the ceiling is what fires.
        let direct = DirectConversations::new(
            store.clone(),
            ResolverConfig {
                store_deadline: Duration::from_secs(60),
                coalesce_ceiling: Duration::from_secs(10),
            },
        );
        store.fail_lookup(Fault::Hang);

        let err = direct.resolve_direct_conversation(a, b).await.unwrap_err();
        assert!(matches!(err, ResolveError::Coalesce(_)));
        assert_eq!(err.kind(), Some(ErrorKind::Transient));
        assert_eq!(direct.in_flight(), 0);

        store.clear_faults();
        let id = direct.resolve_direct_conversation(a, b).await.unwrap();
        assert_eq!(store.members_of(id).len(), 2);
    }

    #[tokio::test]
    async fn unrelated_pairs_do_not_share_results() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let store = MemoryStore::default();
        let direct = service(&store);

        let (ab, ac) = tokio::join!(
            direct.resolve_direct_conversation(a, b),
            direct.resolve_direct_conversation(a, c),
        );

        assert_ne!(ab.unwrap(), ac.unwrap());
        assert_eq!(store.conversation_count(), 2);
    }

    #[tokio::test]
    async fn auth_failure_reaches_every_waiter() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let store = MemoryStore::default();
        store.fail_lookup(Fault::Deny);
        let direct = service(&store);

        let (first, second) = tokio::join!(
            direct.resolve_direct_conversation(a, b),
            direct.resolve_direct_conversation(b, a),
        );

        assert_eq!(first.unwrap_err().kind(), Some(ErrorKind::Auth));
        assert_eq!(second.unwrap_err().kind(), Some(ErrorKind::Auth));
        assert_eq!(store.conversation_inserts(), 0);
    }
}
