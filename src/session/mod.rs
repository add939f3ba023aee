pub mod controller;
pub mod state;

pub use controller::{FollowAlongController, FollowAlongServices};
pub use state::{FollowAlongSnapshot, FollowAlongState, ListeningStatus, TranscriptOutcome};
