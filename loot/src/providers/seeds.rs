//! Entropy seeds for new tickets.

use rand::Rng;

/// Upper bound (exclusive) of generated seeds: up to 16 decimal digits
const SEED_SPACE: u64 = 10_000_000_000_000_000;

/// Produces a fresh seed whenever a new ticket cycle starts
pub trait SeedSource: Send + Sync {
    /// Next seed
    fn next_seed(&self) -> String;
}

/// Random decimal seeds from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSeeds;

impl SeedSource for RandomSeeds {
    fn next_seed(&self) -> String {
        rand::thread_rng().gen_range(0..SEED_SPACE).to_string()
    }
}
