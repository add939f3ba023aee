//! Voice follow-along matching: aligns live speech-recognition transcripts
//! with the verses of the surah being recited, and records each recitation
//! attempt as a session.

pub mod config;
pub mod db;
pub mod entitlements;
pub mod error;
pub mod events;
pub mod matching;
pub mod models;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod utils;

pub use config::FollowAlongConfig;
pub use db::{Database, UserStore};
pub use entitlements::Entitlements;
pub use error::FollowAlongError;
pub use events::{EventSink, FollowAlongEvent, NoopSink};
pub use matching::{find_best_match, normalize, score, MatchResult, MatchingConfig};
pub use models::{FollowAlongSession, Surah, Verse};
pub use recognizer::{RecognizerEvent, SpeechRecognizer, TranscriptEvent};
pub use session::{
    FollowAlongController, FollowAlongServices, FollowAlongSnapshot, ListeningStatus,
    TranscriptOutcome,
};
pub use store::{SessionStore, UsageCounter};
pub use utils::init_logging;
