//! Durable record of one follow-along recitation attempt.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowAlongSession {
    pub id: String,
    pub surah_id: u32,
    pub surah_name: String,
    pub surah_name_arabic: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ended_at: DateTime<Utc>,
    pub verses_recited: Vec<u32>,
    pub total_verses: u32,
    pub accuracy_percentage: u32,
    pub duration_seconds: u64,
}

/// Share of distinct verses recited, rounded to a whole percent in [0, 100].
pub fn accuracy_percentage(verses_recited: &[u32], total_verses: u32) -> u32 {
    if verses_recited.is_empty() || total_verses == 0 {
        return 0;
    }

    let unique = verses_recited.iter().collect::<HashSet<_>>().len();
    let percent = (unique as f64 / total_verses as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u32
}

/// Wall-clock seconds between two instants, rounded, never negative.
pub fn duration_seconds(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
    let elapsed_ms = (ended_at - started_at).num_milliseconds().max(0);
    (elapsed_ms as f64 / 1000.0).round() as u64
}
