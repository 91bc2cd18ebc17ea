//! Direct-conversation resolution: find or create the single 1-to-1
//! conversation between two users, collapsing concurrent duplicate requests.

pub mod classify;
pub mod coalesce;
pub mod direct;
pub mod error;
pub mod guard;
pub mod resolver;
pub mod store;

#[cfg(test)]
mod testing;

pub use classify::{ClassifiedError, ErrorKind, classify};
pub use coalesce::{CoalesceError, Coalescer};
pub use direct::{DirectConversations, PairKey, ResolverConfig, STORE_CALLS_PER_RESOLUTION};
pub use error::ResolveError;
pub use guard::{DeadlineElapsed, with_deadline};
pub use resolver::ConversationResolver;
pub use store::{AccessDenied, ConversationStore};
