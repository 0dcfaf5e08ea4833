//! Revision stamps for topology-change detection.
//!
//! Stamps come from one process-wide counter, so two distinct objects never
//! share a stamp and a cache keyed on a stamp cannot confuse them.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT: AtomicU64 = AtomicU64::new(1);

/// Return a fresh, never-before-issued revision stamp.
pub fn next_revision() -> u64 {
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_are_strictly_increasing() {
        let a = next_revision();
        let b = next_revision();
        assert!(b > a);
    }
}
