use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// A partial or final recognition result for the current utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    /// Cumulative text of the utterance so far
    pub transcript: String,
    pub is_final: bool,
    pub confidence: f64,
}

impl TranscriptEvent {
    pub fn partial(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Transcript(TranscriptEvent),
    Paused,
    Resumed,
    /// Stream failure; the controller stops the session on receipt.
    Error(String),
}

/// Platform speech-recognition service.
///
/// Implementations may restart internally on transient end-of-speech; that
/// is invisible to the controller as long as events keep flowing.
pub trait SpeechRecognizer: Send + Sync {
    /// Begin delivering events on `events`. An error means recognition is
    /// unavailable (missing permission, no engine).
    fn start_listening(&self, events: UnboundedSender<RecognizerEvent>) -> Result<(), String>;

    fn stop_listening(&self);
}
