pub mod session;
pub mod verse;

pub use session::{accuracy_percentage, duration_seconds, FollowAlongSession};
pub use verse::{Surah, Verse};
