pub mod config;
pub mod normalize;
pub mod scoring;
pub mod selector;

pub use config::MatchingConfig;
pub use normalize::normalize;
pub use scoring::{score, score_with};
pub use selector::{find_best_match, find_best_match_with, MatchResult};
