//! Persistence contracts consumed by the controller.

use std::future::Future;

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::FollowAlongSession;

pub const MAX_STORED_SESSIONS: usize = 100;

const KEY_PREFIX: &str = "follow_along";

/// Namespaced storage key for one user's data of a given kind.
pub fn storage_key(user_id: &str, kind: &str) -> String {
    format!("{KEY_PREFIX}_{kind}:{user_id}")
}

/// Daily usage counter key; a new date means a fresh counter.
pub fn usage_key(user_id: &str, date: NaiveDate) -> String {
    format!("{}:{}", storage_key(user_id, "usage"), date.format("%Y-%m-%d"))
}

pub trait SessionStore: Send + Sync {
    /// All stored sessions, most recent first.
    fn get_all(&self) -> impl Future<Output = Result<Vec<FollowAlongSession>>> + Send;

    /// Upsert by id. New sessions go to the front; only the newest
    /// [`MAX_STORED_SESSIONS`] are kept.
    fn save(&self, session: &FollowAlongSession) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<()>> + Send;

    fn get_by_surah(
        &self,
        surah_id: u32,
    ) -> impl Future<Output = Result<Vec<FollowAlongSession>>> + Send;

    fn clear_all(&self) -> impl Future<Output = Result<()>> + Send;
}

pub trait UsageCounter: Send + Sync {
    fn usage(&self, key: &str) -> impl Future<Output = Result<u32>> + Send;

    /// Increment and return the new count.
    fn increment(&self, key: &str) -> impl Future<Output = Result<u32>> + Send;
}
