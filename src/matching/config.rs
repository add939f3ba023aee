use serde::{Deserialize, Serialize};

/// Tunable thresholds for verse scoring and selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatchingConfig {
    /// Score for a normalized transcript identical to the verse
    pub exact_score: f64,

    /// Score when the transcript runs past the verse but contains it whole
    pub containment_score: f64,

    /// Unmatched transcript words tolerated per alignment attempt
    pub max_noise_words: usize,

    /// Verses with fewer words than this use `short_verse_threshold`
    pub short_verse_word_count: usize,
    pub short_verse_threshold: f64,
    pub long_verse_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            exact_score: 1.0,
            containment_score: 0.95,
            max_noise_words: 2,
            short_verse_word_count: 4,
            short_verse_threshold: 0.6,
            long_verse_threshold: 0.4,
        }
    }
}

impl MatchingConfig {
    /// Minimum score a verse of `word_count` words must reach to be accepted.
    pub fn threshold_for(&self, word_count: usize) -> f64 {
        if word_count < self.short_verse_word_count {
            self.short_verse_threshold
        } else {
            self.long_verse_threshold
        }
    }
}
