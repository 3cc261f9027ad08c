//! Dependencies injected into the ticket reducer.

use crate::config::DEFAULT_CHAIN_ID;
use crate::gateway::ContractGateway;
use crate::journal::{PendingTickets, SharedJournal};
use crate::ledger::InventoryLedger;
use crate::oracle::PriceOracle;
use crate::providers::SeedSource;
use aetherloot_core::environment::Clock;
use std::sync::Arc;

/// Environment of the [`TicketReducer`](super::TicketReducer)
///
/// Cheap to clone; effects take clones into their futures.
#[derive(Clone)]
pub struct TicketEnvironment {
    clock: Arc<dyn Clock>,
    oracle: Arc<PriceOracle>,
    gateway: ContractGateway,
    ledger: Arc<InventoryLedger>,
    seeds: Arc<dyn SeedSource>,
    journal: SharedJournal,
    chain_id: u64,
}

impl TicketEnvironment {
    /// Create a new environment with an in-memory journal on the default network
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        oracle: Arc<PriceOracle>,
        gateway: ContractGateway,
        ledger: Arc<InventoryLedger>,
        seeds: Arc<dyn SeedSource>,
    ) -> Self {
        Self {
            clock,
            oracle,
            gateway,
            ledger,
            seeds,
            journal: PendingTickets::in_memory().shared(),
            chain_id: DEFAULT_CHAIN_ID,
        }
    }

    /// Record purchases and redemptions in `journal`, scoped to `chain_id`
    #[must_use]
    pub fn with_journal(mut self, journal: SharedJournal, chain_id: u64) -> Self {
        self.journal = journal;
        self.chain_id = chain_id;
        self
    }

    /// Clock for ticket timestamps
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Price oracle
    #[must_use]
    pub fn oracle(&self) -> Arc<PriceOracle> {
        Arc::clone(&self.oracle)
    }

    /// Contract gateway
    #[must_use]
    pub fn gateway(&self) -> ContractGateway {
        self.gateway.clone()
    }

    /// Inventory ledger
    #[must_use]
    pub fn ledger(&self) -> Arc<InventoryLedger> {
        Arc::clone(&self.ledger)
    }

    /// Pending ticket journal
    #[must_use]
    pub fn journal(&self) -> SharedJournal {
        Arc::clone(&self.journal)
    }

    /// Network purchases are journaled under
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Seed source for new cycles
    #[must_use]
    pub fn seeds(&self) -> &dyn SeedSource {
        self.seeds.as_ref()
    }
}

impl std::fmt::Debug for TicketEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketEnvironment")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}
