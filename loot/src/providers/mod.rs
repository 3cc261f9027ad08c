//! Provider traits for the external collaborators of the lottery client.
//!
//! The core never talks to a node, a wallet or a random source directly; it
//! depends only on these traits so tests and the demo can inject the
//! in-memory implementations from [`crate::mocks`].
//!
//! - [`ChainClient`]: read calls, receipts, log queries
//! - [`WalletProvider`]: account access, signing, change notifications
//! - [`SeedSource`]: fresh entropy seeds for new tickets

pub mod chain;
pub mod seeds;
pub mod wallet;

pub use chain::{
    CallRequest, ChainClient, ChainFailure, ChainFuture, FailureCode, LogEntry, LogFilter,
    TransactionReceipt, TransactionRequest,
};
pub use seeds::{RandomSeeds, SeedSource};
pub use wallet::{WalletEvent, WalletProvider};
