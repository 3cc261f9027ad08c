//! # Aether Loot
//!
//! Client core for the Aether Loot commit-reveal lottery: buy a ticket with a
//! seed, wait for it to mature, redeem it, and rebuild the items you own from
//! the contract's mint events.
//!
//! ## Components
//!
//! - [`gateway::ContractGateway`]: the only code that knows the contract ABI
//! - [`oracle::PriceOracle`]: ticket price with a re-validation rule before spending
//! - [`lifecycle`]: the ticket state machine, run by an `aetherloot_runtime::Store`
//! - [`ledger::InventoryLedger`]: owned items from backfill plus live redemptions
//! - [`error::ErrorClassifier`]: raw wallet/node failures to [`LootError`]
//! - [`session::LootSession`]: wires the above for one account on one network
//!
//! The wallet and the node are injected through [`providers`]; enable the
//! `test-utils` feature for the in-memory [`mocks`].
//!
//! ## Example
//!
//! ```ignore
//! let config = LootConfig::from_env()?;
//! let session = Arc::new(LootSession::open(config, wallet, chain).await?);
//! session.connect().await?;
//! session.watch_wallet();
//!
//! session.buy("8731", 3).await?;
//! session.advance().await?;
//! let state = session.redeem().await?;
//! println!("{:?}", state.last_result);
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod ledger;
pub mod lifecycle;
#[cfg(feature = "test-utils")]
pub mod mocks;
pub mod oracle;
pub mod providers;
pub mod session;
pub mod types;
pub mod units;

pub use config::{ConfigError, LootConfig};
pub use error::{ErrorClassifier, LootError, Result};
pub use gateway::{ConfirmedTx, ContractGateway, GasLimits};
pub use journal::{JournalError, PendingTicket, PendingTickets, SharedJournal};
pub use ledger::InventoryLedger;
pub use lifecycle::{TicketAction, TicketPhase, TicketReducer, TicketState};
pub use oracle::{PriceOracle, SpendingPolicy};
pub use session::{LootSession, SessionError};
pub use types::{
    Blueprint, InventoryItem, MintId, PriceQuote, RedemptionResult, Ticket, TicketId,
    TicketStatus, Tier, TxId,
};
