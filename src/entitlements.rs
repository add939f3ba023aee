use std::sync::atomic::{AtomicBool, Ordering};

/// Source of truth for whether the current user bypasses the daily quota.
pub trait Entitlements: Send + Sync {
    fn has_unlimited_usage(&self) -> bool;
}

impl Entitlements for AtomicBool {
    fn has_unlimited_usage(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl Entitlements for bool {
    fn has_unlimited_usage(&self) -> bool {
        *self
    }
}
