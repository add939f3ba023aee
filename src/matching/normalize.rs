//! Arabic text normalization for diacritics-insensitive comparison.
//!
//! Steps run in a fixed order:
//! - Remove tashkeel (U+064B..=U+065F, superscript alef U+0670)
//! - Remove tatweel (U+0640)
//! - Map hamza/madda alef variants to plain alef
//! - Map teh marbuta to heh
//! - Collapse whitespace and trim

const TATWEEL: char = '\u{0640}';
const SUPERSCRIPT_ALEF: char = '\u{0670}';

const PLAIN_ALEF: char = '\u{0627}';
const ALEF_VARIANTS: &[char] = &[
    '\u{0623}', // Alef with hamza above (أ)
    '\u{0625}', // Alef with hamza below (إ)
    '\u{0622}', // Alef with madda above (آ)
];

const TEH_MARBUTA: char = '\u{0629}';
const HEH: char = '\u{0647}';

#[inline]
fn is_diacritic(c: char) -> bool {
    ('\u{064B}'..='\u{065F}').contains(&c) || c == SUPERSCRIPT_ALEF
}

/// Canonicalize Arabic text. Total over any input; empty in, empty out.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut result = String::with_capacity(text.len());
    // Start true so leading whitespace is dropped
    let mut last_was_space = true;

    for c in text.chars() {
        if is_diacritic(c) || c == TATWEEL {
            continue;
        }

        if c.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
            continue;
        }

        let mapped = if ALEF_VARIANTS.contains(&c) {
            PLAIN_ALEF
        } else if c == TEH_MARBUTA {
            HEH
        } else {
            c
        };

        result.push(mapped);
        last_was_space = false;
    }

    if result.ends_with(' ') {
        result.pop();
    }

    result
}

/// Word count of the normalized form of `text`.
pub fn word_count(text: &str) -> usize {
    normalize(text).split_whitespace().count()
}
