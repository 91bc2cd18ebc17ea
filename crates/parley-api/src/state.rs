use std::sync::Arc;

use parley_db::{Database, SqliteStore};
use parley_resolver::{DirectConversations, ResolverConfig};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub conversations: DirectConversations<SqliteStore>,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, resolver: ResolverConfig, jwt_secret: String) -> AppState {
        Arc::new(Self {
            conversations: DirectConversations::new(SqliteStore::new(Arc::clone(&db)), resolver),
            db,
            jwt_secret,
        })
    }
}
