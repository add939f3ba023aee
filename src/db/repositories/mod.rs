mod sessions;
mod usage;

use crate::{db::Database, store::storage_key};

/// One user's view of the database. Implements the session and usage
/// store contracts with every row namespaced by the user's storage key.
#[derive(Clone)]
pub struct UserStore {
    db: Database,
    user_id: String,
}

impl UserStore {
    pub fn new(db: Database, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn sessions_key(&self) -> String {
        storage_key(&self.user_id, "sessions")
    }
}
