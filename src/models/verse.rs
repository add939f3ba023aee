use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verse {
    /// 1-based, unique within its surah
    pub number: u32,
    pub text: String,
}

impl Verse {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// The surah open for recitation. Verse order is recitation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Surah {
    pub id: u32,
    pub name: String,
    pub name_arabic: String,
    pub verses: Vec<Verse>,
}

impl Surah {
    pub fn total_verses(&self) -> u32 {
        self.verses.len() as u32
    }

    pub fn position_of(&self, verse_number: u32) -> Option<usize> {
        self.verses.iter().position(|v| v.number == verse_number)
    }

    pub fn contains_verse(&self, verse_number: u32) -> bool {
        self.position_of(verse_number).is_some()
    }
}
