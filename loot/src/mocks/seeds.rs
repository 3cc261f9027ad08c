//! Deterministic seeds.

use crate::providers::SeedSource;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts upward from a starting value
#[derive(Debug)]
pub struct SequentialSeeds {
    next: AtomicU64,
}

impl SequentialSeeds {
    /// Seeds `1`, `2`, `3`, …
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Seeds `start`, `start + 1`, …
    #[must_use]
    pub const fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for SequentialSeeds {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedSource for SequentialSeeds {
    fn next_seed(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}
