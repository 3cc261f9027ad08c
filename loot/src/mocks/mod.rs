//! Mock provider implementations for testing.
//!
//! In-memory implementations of the provider traits, for unit tests,
//! integration tests and the demo binary.
//!
//! **WARNING**: Do NOT use in production. Nothing here talks to a real chain.

pub mod chain;
pub mod seeds;

pub use chain::{LootOutcome, MockLotteryChain, MockOperation};
pub use seeds::SequentialSeeds;
