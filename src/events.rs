use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::{models::FollowAlongSession, session::FollowAlongSnapshot};

/// Host-facing notifications from the controller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FollowAlongEvent {
    StateChanged { snapshot: FollowAlongSnapshot },
    /// Fired once per transition to a different verse; hosts use it for
    /// haptic feedback.
    VerseMatched { verse_number: u32, confidence: f64 },
    Tick { elapsed_seconds: u64 },
    SessionCompleted { session: FollowAlongSession },
    RecognitionFailed {
        message: String,
        session: Option<FollowAlongSession>,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: FollowAlongEvent);
}

impl EventSink for UnboundedSender<FollowAlongEvent> {
    fn emit(&self, event: FollowAlongEvent) {
        // The host dropping its receiver just means nobody is listening
        let _ = self.send(event);
    }
}

/// Sink for hosts that only poll snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: FollowAlongEvent) {}
}
