use thiserror::Error;
use uuid::Uuid;

use crate::classify::{ClassifiedError, ErrorKind};
use crate::coalesce::CoalesceError;

/// What a caller of direct-conversation resolution can get back.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("user {0} cannot open a direct conversation with themselves")]
    SelfConversation(Uuid),

    #[error(transparent)]
    Store(#[from] ClassifiedError),

    #[error(transparent)]
    Coalesce(#[from] CoalesceError),
}

impl ResolveError {
    /// Taxonomy bucket, or `None` for a rejected precondition.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::SelfConversation(_) => None,
            Self::Store(classified) => Some(classified.kind),
            Self::Coalesce(_) => Some(ErrorKind::Transient),
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::SelfConversation(_) => false,
            Self::Store(classified) => classified.retryable,
            Self::Coalesce(_) => true,
        }
    }
}
