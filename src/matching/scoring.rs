use crate::matching::{config::MatchingConfig, normalize::normalize};

/// Alignment score in [0, 1] between a transcript fragment and one verse,
/// using the default thresholds.
pub fn score(transcript: &str, verse_text: &str) -> f64 {
    score_with(&MatchingConfig::default(), transcript, verse_text)
}

/// Alignment score in [0, 1] between a transcript fragment and one verse.
///
/// Deliberately asymmetric: a verse containing the transcript is not a
/// shortcut, so a lone common word only scores its share of the verse.
pub fn score_with(config: &MatchingConfig, transcript: &str, verse_text: &str) -> f64 {
    let transcript = normalize(transcript);
    let verse = normalize(verse_text);

    if transcript.is_empty() || verse.is_empty() {
        return 0.0;
    }

    if transcript == verse {
        return config.exact_score;
    }

    // Continuous speech running past the end of the verse
    if transcript.contains(verse.as_str()) {
        return config.containment_score;
    }

    let transcript_words: Vec<&str> = transcript.split_whitespace().collect();
    let verse_words: Vec<&str> = verse.split_whitespace().collect();

    best_alignment(&transcript_words, &verse_words, config.max_noise_words)
}

/// Best fraction of verse words matched in order over every transcript offset.
///
/// An attempt at offset `i` walks the verse either from its first word or
/// from any verse position holding `transcript[i]`, so recitation that
/// starts mid-verse still aligns.
fn best_alignment(transcript: &[&str], verse: &[&str], max_noise: usize) -> f64 {
    let mut best = 0.0_f64;

    for start in 0..transcript.len() {
        let anchors = verse
            .iter()
            .enumerate()
            .filter(|(idx, word)| *idx > 0 && **word == transcript[start])
            .map(|(idx, _)| idx);

        for verse_start in std::iter::once(0).chain(anchors) {
            let matched = align_from(&transcript[start..], &verse[verse_start..], max_noise);
            best = best.max(matched as f64 / verse.len() as f64);
            if best >= 1.0 {
                return best;
            }
        }
    }

    best
}

/// Walk `verse` in order against `transcript`, skipping at most `max_noise`
/// transcript words. Returns the number of verse words matched before the
/// attempt ends or is aborted.
fn align_from(transcript: &[&str], verse: &[&str], max_noise: usize) -> usize {
    let mut t = 0;
    let mut matches = 0;
    let mut noise = 0;

    for word in verse {
        loop {
            let Some(spoken) = transcript.get(t) else {
                return matches;
            };
            if spoken == word {
                matches += 1;
                t += 1;
                break;
            }
            if noise >= max_noise {
                return matches;
            }
            noise += 1;
            t += 1;
        }
    }

    matches
}
