use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::{
    db::{
        helpers::{parse_timestamp_ms, parse_verse_list, to_i64, to_u32, to_u64},
        repositories::UserStore,
    },
    models::FollowAlongSession,
    store::{SessionStore, MAX_STORED_SESSIONS},
};

const SESSION_COLUMNS: &str = "id, surah_id, surah_name, surah_name_arabic,
     started_at_ms, ended_at_ms, verses_recited, total_verses,
     accuracy_percentage, duration_seconds";

fn row_to_session(row: &Row) -> Result<FollowAlongSession> {
    let surah_id: i64 = row.get("surah_id")?;
    let started_at_ms: i64 = row.get("started_at_ms")?;
    let ended_at_ms: i64 = row.get("ended_at_ms")?;
    let verses_recited: String = row.get("verses_recited")?;
    let total_verses: i64 = row.get("total_verses")?;
    let accuracy_percentage: i64 = row.get("accuracy_percentage")?;
    let duration_seconds: i64 = row.get("duration_seconds")?;

    Ok(FollowAlongSession {
        id: row.get("id")?,
        surah_id: to_u32(surah_id, "surah_id")?,
        surah_name: row.get("surah_name")?,
        surah_name_arabic: row.get("surah_name_arabic")?,
        started_at: parse_timestamp_ms(started_at_ms, "started_at_ms")?,
        ended_at: parse_timestamp_ms(ended_at_ms, "ended_at_ms")?,
        verses_recited: parse_verse_list(&verses_recited)?,
        total_verses: to_u32(total_verses, "total_verses")?,
        accuracy_percentage: to_u32(accuracy_percentage, "accuracy_percentage")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
    })
}

impl UserStore {
    async fn query_sessions(
        &self,
        filter: &'static str,
        surah_id: Option<u32>,
    ) -> Result<Vec<FollowAlongSession>> {
        let owner_key = self.sessions_key();
        self.db
            .execute(move |conn| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM follow_along_sessions
                     WHERE owner_key = ?1 {filter}
                     ORDER BY save_seq DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = match surah_id {
                    Some(surah_id) => stmt.query(params![owner_key, surah_id])?,
                    None => stmt.query(params![owner_key])?,
                };

                let mut sessions = Vec::new();
                while let Some(row) = rows.next()? {
                    sessions.push(row_to_session(row)?);
                }
                Ok(sessions)
            })
            .await
    }
}

impl SessionStore for UserStore {
    async fn get_all(&self) -> Result<Vec<FollowAlongSession>> {
        self.query_sessions("", None).await
    }

    async fn save(&self, session: &FollowAlongSession) -> Result<()> {
        let owner_key = self.sessions_key();
        let record = session.clone();
        self.db
            .execute(move |conn| {
                let verses_recited = serde_json::to_string(&record.verses_recited)?;
                let tx = conn.transaction()?;

                // Updates keep their position; new sessions go to the front
                let existing_seq: Option<i64> = tx
                    .query_row(
                        "SELECT save_seq FROM follow_along_sessions
                         WHERE owner_key = ?1 AND id = ?2",
                        params![owner_key, record.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let save_seq = match existing_seq {
                    Some(seq) => seq,
                    None => tx.query_row(
                        "SELECT COALESCE(MAX(save_seq), 0) + 1 FROM follow_along_sessions
                         WHERE owner_key = ?1",
                        params![owner_key],
                        |row| row.get(0),
                    )?,
                };

                tx.execute(
                    "INSERT INTO follow_along_sessions (id, owner_key, save_seq, surah_id,
                        surah_name, surah_name_arabic, started_at_ms, ended_at_ms,
                        verses_recited, total_verses, accuracy_percentage, duration_seconds)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(owner_key, id) DO UPDATE SET
                        surah_id = excluded.surah_id,
                        surah_name = excluded.surah_name,
                        surah_name_arabic = excluded.surah_name_arabic,
                        started_at_ms = excluded.started_at_ms,
                        ended_at_ms = excluded.ended_at_ms,
                        verses_recited = excluded.verses_recited,
                        total_verses = excluded.total_verses,
                        accuracy_percentage = excluded.accuracy_percentage,
                        duration_seconds = excluded.duration_seconds",
                    params![
                        record.id,
                        owner_key,
                        save_seq,
                        record.surah_id,
                        record.surah_name,
                        record.surah_name_arabic,
                        record.started_at.timestamp_millis(),
                        record.ended_at.timestamp_millis(),
                        verses_recited,
                        record.total_verses,
                        record.accuracy_percentage,
                        to_i64(record.duration_seconds)?,
                    ],
                )
                .with_context(|| "failed to upsert follow-along session")?;

                tx.execute(
                    "DELETE FROM follow_along_sessions
                     WHERE owner_key = ?1 AND id NOT IN (
                        SELECT id FROM follow_along_sessions
                        WHERE owner_key = ?1
                        ORDER BY save_seq DESC
                        LIMIT ?2
                     )",
                    params![owner_key, to_i64(MAX_STORED_SESSIONS as u64)?],
                )
                .with_context(|| "failed to trim stored sessions")?;

                tx.commit().context("failed to commit session save")?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let owner_key = self.sessions_key();
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM follow_along_sessions WHERE owner_key = ?1 AND id = ?2",
                    params![owner_key, id],
                )
                .with_context(|| "failed to delete follow-along session")?;
                Ok(())
            })
            .await
    }

    async fn get_by_surah(&self, surah_id: u32) -> Result<Vec<FollowAlongSession>> {
        self.query_sessions("AND surah_id = ?2", Some(surah_id)).await
    }

    async fn clear_all(&self) -> Result<()> {
        let owner_key = self.sessions_key();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM follow_along_sessions WHERE owner_key = ?1",
                    params![owner_key],
                )
                .with_context(|| "failed to clear follow-along sessions")?;
                Ok(())
            })
            .await
    }
}
