use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{helpers::to_u32, repositories::UserStore},
    store::UsageCounter,
};

impl UsageCounter for UserStore {
    async fn usage(&self, key: &str) -> Result<u32> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let count: Option<i64> = conn
                    .query_row(
                        "SELECT count FROM usage_counters WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()
                    .with_context(|| "failed to read usage counter")?;
                to_u32(count.unwrap_or(0), "count")
            })
            .await
    }

    async fn increment(&self, key: &str) -> Result<u32> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "INSERT INTO usage_counters (key, count) VALUES (?1, 1)
                         ON CONFLICT(key) DO UPDATE SET count = count + 1
                         RETURNING count",
                        params![key],
                        |row| row.get(0),
                    )
                    .with_context(|| "failed to increment usage counter")?;
                to_u32(count, "count")
            })
            .await
    }
}
