use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::FollowAlongConfig,
    matching::find_best_match_with,
    models::{accuracy_percentage, duration_seconds, FollowAlongSession, Surah, Verse},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ListeningStatus {
    #[default]
    Idle,
    Listening,
    /// Recognizer paused itself; the session is still active.
    Paused,
}

impl ListeningStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ListeningStatus::Listening | ListeningStatus::Paused)
    }
}

/// What a single transcript event did to the matched-verse state.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptOutcome {
    /// Moved to a different verse; fire host feedback exactly once.
    VerseMatched { verse_number: u32, confidence: f64 },
    /// Same verse matched again; only the confidence changed.
    Refreshed { verse_number: u32, confidence: f64 },
    /// Nothing cleared the floor; matched verse cleared.
    NoMatch,
    /// Session not active or no surah loaded.
    Ignored,
}

/// Serializable view of the state for hosts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowAlongSnapshot {
    pub status: ListeningStatus,
    pub surah_id: Option<u32>,
    pub matched_verse: Option<u32>,
    pub confidence: f64,
    pub transcript: String,
    pub verses_recited: Vec<u32>,
    pub elapsed_seconds: u64,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct FollowAlongState {
    pub status: ListeningStatus,
    pub surah: Option<Surah>,
    pub matched_verse: Option<u32>,
    pub confidence: f64,
    pub transcript: String,
    /// Append-only while active; adjacent duplicates suppressed.
    pub verses_recited: Vec<u32>,
    pub started_at: Option<DateTime<Utc>>,
    /// Display-only counter driven by the ticker.
    pub elapsed_seconds: u64,
}

impl FollowAlongState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn begin_session(&mut self, started_at: DateTime<Utc>) {
        self.clear_transient();
        self.status = ListeningStatus::Listening;
        self.started_at = Some(started_at);
    }

    pub fn set_paused(&mut self, paused: bool) -> bool {
        let next = match (self.status, paused) {
            (ListeningStatus::Listening, true) => ListeningStatus::Paused,
            (ListeningStatus::Paused, false) => ListeningStatus::Listening,
            _ => return false,
        };
        self.status = next;
        true
    }

    pub fn tick(&mut self) -> Option<u64> {
        if !self.is_active() {
            return None;
        }
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(1);
        Some(self.elapsed_seconds)
    }

    /// Verses considered for the next match: the matched verse plus its
    /// lookahead, or the opening verses when nothing is matched.
    pub fn candidate_window<'a>(
        &self,
        surah: &'a Surah,
        config: &FollowAlongConfig,
    ) -> &'a [Verse] {
        let verses = surah.verses.as_slice();
        let anchored = self
            .matched_verse
            .and_then(|number| surah.position_of(number));

        match anchored {
            Some(start) => {
                let end = start
                    .saturating_add(config.lookahead_verses)
                    .saturating_add(1)
                    .min(verses.len());
                &verses[start..end]
            }
            None => &verses[..config.initial_window.min(verses.len())],
        }
    }

    pub fn apply_transcript(
        &mut self,
        transcript: &str,
        config: &FollowAlongConfig,
    ) -> TranscriptOutcome {
        if !self.is_active() {
            return TranscriptOutcome::Ignored;
        }

        self.transcript = transcript.to_string();

        let Some(surah) = self.surah.as_ref() else {
            return TranscriptOutcome::Ignored;
        };

        let window = self.candidate_window(surah, config);
        let selected = find_best_match_with(&config.matching, transcript, window)
            .filter(|result| result.confidence > config.match_floor);

        let Some(result) = selected else {
            self.matched_verse = None;
            self.confidence = 0.0;
            return TranscriptOutcome::NoMatch;
        };

        let verse_number = result.verse.number;
        let confidence = result.confidence;
        self.confidence = confidence;

        if self.matched_verse == Some(verse_number) {
            return TranscriptOutcome::Refreshed {
                verse_number,
                confidence,
            };
        }

        self.matched_verse = Some(verse_number);
        if self.verses_recited.last() != Some(&verse_number) {
            self.verses_recited.push(verse_number);
        }

        TranscriptOutcome::VerseMatched {
            verse_number,
            confidence,
        }
    }

    /// Build the session record for a stop at `ended_at`. `None` without a
    /// start timestamp or surah context.
    pub fn finalize(&self, id: String, ended_at: DateTime<Utc>) -> Option<FollowAlongSession> {
        let started_at = self.started_at?;
        let surah = self.surah.as_ref()?;
        let total_verses = surah.total_verses();

        Some(FollowAlongSession {
            id,
            surah_id: surah.id,
            surah_name: surah.name.clone(),
            surah_name_arabic: surah.name_arabic.clone(),
            started_at,
            ended_at,
            verses_recited: self.verses_recited.clone(),
            total_verses,
            accuracy_percentage: accuracy_percentage(&self.verses_recited, total_verses),
            duration_seconds: duration_seconds(started_at, ended_at),
        })
    }

    /// Return to idle, keeping only the loaded surah.
    pub fn reset(&mut self) {
        self.clear_transient();
        self.status = ListeningStatus::Idle;
    }

    fn clear_transient(&mut self) {
        self.matched_verse = None;
        self.confidence = 0.0;
        self.transcript.clear();
        self.verses_recited.clear();
        self.started_at = None;
        self.elapsed_seconds = 0;
    }

    pub fn snapshot(&self) -> FollowAlongSnapshot {
        FollowAlongSnapshot {
            status: self.status,
            surah_id: self.surah.as_ref().map(|s| s.id),
            matched_verse: self.matched_verse,
            confidence: self.confidence,
            transcript: self.transcript.clone(),
            verses_recited: self.verses_recited.clone(),
            elapsed_seconds: self.elapsed_seconds,
            started_at: self.started_at,
        }
    }
}
