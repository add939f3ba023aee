use serde::{Deserialize, Serialize};

use crate::matching::{config::MatchingConfig, normalize::word_count, scoring::score_with};
use crate::models::Verse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub verse: Verse,
    pub confidence: f64,
}

/// Highest-scoring candidate that clears its own threshold, using the
/// default thresholds.
pub fn find_best_match(transcript: &str, candidates: &[Verse]) -> Option<MatchResult> {
    find_best_match_with(&MatchingConfig::default(), transcript, candidates)
}

/// Highest-scoring candidate that clears its own threshold.
///
/// Short verses need a larger share of their words matched. On a tie the
/// earlier candidate wins, which keeps a forward-looking window on the
/// current verse rather than jumping ahead.
pub fn find_best_match_with(
    config: &MatchingConfig,
    transcript: &str,
    candidates: &[Verse],
) -> Option<MatchResult> {
    let mut best: Option<MatchResult> = None;

    for verse in candidates {
        let confidence = score_with(config, transcript, &verse.text);
        let threshold = config.threshold_for(word_count(&verse.text));

        if confidence < threshold {
            continue;
        }

        let is_better = best
            .as_ref()
            .map_or(true, |current| confidence > current.confidence);
        if is_better {
            best = Some(MatchResult {
                verse: verse.clone(),
                confidence,
            });
        }
    }

    best
}
