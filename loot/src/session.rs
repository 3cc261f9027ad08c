//! One connected account on one network.
//!
//! [`LootSession`] owns the gateway, the price oracle, the inventory ledger and
//! the ticket controller store, and keeps them consistent when the wallet
//! switches account or network. UIs drive it through the command methods and
//! render [`TicketState`] snapshots.

use crate::config::LootConfig;
use crate::error::LootError;
use crate::gateway::{ConfirmedTx, ContractGateway};
use crate::journal::{JournalError, PendingTicket, PendingTickets, SharedJournal};
use crate::ledger::InventoryLedger;
use crate::lifecycle::{TicketAction, TicketEnvironment, TicketPhase, TicketReducer, TicketState};
use crate::oracle::PriceOracle;
use crate::providers::{ChainClient, RandomSeeds, SeedSource, WalletEvent, WalletProvider};
use crate::types::{Blueprint, InventoryItem, RedemptionResult, Tier, TxId};
use aetherloot_core::environment::{Clock, SystemClock};
use aetherloot_runtime::{Store, StoreError};
use alloy::primitives::Address;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Store running the ticket controller
pub type TicketStore = Store<TicketState, TicketAction, TicketEnvironment, TicketReducer>;

/// Errors returned by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// A classified chain or contract failure
    #[error(transparent)]
    Loot(#[from] LootError),

    /// The controller store failed
    #[error("Controller error: {0}")]
    Store(#[from] StoreError),

    /// The controller refused the command in its current phase
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// A wallet change dropped the cycle while the command was on chain;
    /// a confirmed outcome is kept in the pending ticket journal
    #[error("A wallet change dropped the ticket cycle during the {0}")]
    Interrupted(&'static str),

    /// The pending ticket journal could not be read or written
    #[error(transparent)]
    Journal(#[from] JournalError),

    /// No pending ticket with this purchase transaction
    #[error("No pending ticket for purchase {0}")]
    UnknownPendingTicket(TxId),
}

/// Connected lottery session
pub struct LootSession {
    config: LootConfig,
    wallet: Arc<dyn WalletProvider>,
    gateway: ContractGateway,
    oracle: Arc<PriceOracle>,
    ledger: Arc<InventoryLedger>,
    store: TicketStore,
    journal: SharedJournal,
    redeeming: Mutex<HashSet<TxId>>,
    account: RwLock<Option<Address>>,
}

impl std::fmt::Debug for LootSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LootSession")
            .field("chain_id", &self.config.chain_id)
            .field("contract", &self.config.contract_address)
            .finish_non_exhaustive()
    }
}

impl LootSession {
    /// Builds a session with the system clock, random seeds and the journal
    /// configured in `config`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Journal`] if the configured journal cannot be read.
    pub async fn open(
        config: LootConfig,
        wallet: Arc<dyn WalletProvider>,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self, SessionError> {
        let journal = match &config.journal_path {
            Some(path) => PendingTickets::open(path).await?,
            None => PendingTickets::in_memory(),
        };
        Ok(Self::with_parts(
            config,
            wallet,
            chain,
            Arc::new(SystemClock),
            Arc::new(RandomSeeds),
            journal,
        ))
    }

    /// Builds a session from explicit parts
    #[must_use]
    pub fn with_parts(
        config: LootConfig,
        wallet: Arc<dyn WalletProvider>,
        chain: Arc<dyn ChainClient>,
        clock: Arc<dyn Clock>,
        seeds: Arc<dyn SeedSource>,
        journal: PendingTickets,
    ) -> Self {
        let gateway = ContractGateway::new(
            Arc::clone(&wallet),
            chain,
            config.contract_address,
            config.gas,
        );
        let oracle = Arc::new(PriceOracle::new(
            gateway.clone(),
            Arc::clone(&clock),
            config.price_policy,
        ));
        let ledger = Arc::new(InventoryLedger::new(
            gateway.clone(),
            Arc::clone(&clock),
            config.genesis_block,
        ));
        let journal = journal.shared();
        let initial = TicketState::new(seeds.next_seed());
        let environment = TicketEnvironment::new(
            clock,
            Arc::clone(&oracle),
            gateway.clone(),
            Arc::clone(&ledger),
            seeds,
        )
        .with_journal(Arc::clone(&journal), config.chain_id);
        let store = Store::new(initial, TicketReducer::new(), environment);

        Self {
            config,
            wallet,
            gateway,
            oracle,
            ledger,
            store,
            journal,
            redeeming: Mutex::new(HashSet::new()),
            account: RwLock::new(None),
        }
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &LootConfig {
        &self.config
    }

    /// The contract gateway
    #[must_use]
    pub const fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    /// The price oracle
    #[must_use]
    pub fn oracle(&self) -> &PriceOracle {
        &self.oracle
    }

    /// The inventory ledger
    #[must_use]
    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    /// Connected account, if any
    pub async fn account(&self) -> Option<Address> {
        *self.account.read().await
    }

    /// Point the wallet at the configured network, connect, read the price and
    /// backfill the inventory
    ///
    /// A price read failure is logged and left for the first purchase to retry.
    ///
    /// # Errors
    ///
    /// Returns the classified wallet failure or the inventory scan failure.
    #[tracing::instrument(skip(self), fields(chain_id = self.config.chain_id))]
    pub async fn connect(&self) -> Result<Address, SessionError> {
        let current = self.wallet.chain_id().await.map_err(LootError::from)?;
        if current != self.config.chain_id {
            tracing::info!(from = current, to = self.config.chain_id, "Switching network");
            self.wallet
                .switch_network(self.config.chain_id)
                .await
                .map_err(LootError::from)?;
        }

        let account = self.wallet.connect().await.map_err(LootError::from)?;
        *self.account.write().await = Some(account);
        tracing::info!(%account, "Wallet connected");

        if let Err(error) = self.oracle.refresh().await {
            tracing::warn!(%error, "Ticket price unavailable");
        }
        let items = self.ledger.bootstrap(account).await?;
        tracing::info!(%account, items, "Inventory loaded");
        Ok(account)
    }

    /// Apply a wallet notification
    ///
    /// Any account or network change drops the cached price, the inventory and
    /// the current ticket. The inventory is rebuilt when an account is selected
    /// on the configured network.
    ///
    /// # Errors
    ///
    /// Returns the inventory scan failure for the new account.
    #[tracing::instrument(skip(self))]
    pub async fn handle_wallet_event(&self, event: WalletEvent) -> Result<(), SessionError> {
        self.oracle.clear().await;
        self.ledger.reset().await;
        self.store.send(TicketAction::AccountChanged).await?;

        let account = match event {
            WalletEvent::AccountsChanged(account) => account,
            WalletEvent::ChainChanged(chain_id) if chain_id == self.config.chain_id => {
                self.wallet.current_account()
            },
            WalletEvent::ChainChanged(chain_id) => {
                tracing::warn!(
                    chain_id,
                    expected = self.config.chain_id,
                    "Wallet moved to another network"
                );
                None
            },
        };
        *self.account.write().await = account;

        if let Some(account) = account {
            let items = self.ledger.bootstrap(account).await?;
            tracing::info!(%account, items, "Inventory reloaded");
        }
        Ok(())
    }

    /// Feed wallet notifications into [`Self::handle_wallet_event`] until the
    /// wallet closes its channel
    pub fn watch_wallet(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.wallet.subscribe();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(error) = session.handle_wallet_event(event).await {
                            tracing::warn!(%error, ?event, "Wallet change not fully applied");
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Wallet notifications lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Wallet watcher stopped");
        })
    }

    /// Buy `quantity` tickets with `seed`
    ///
    /// A confirmed purchase is recorded in the pending ticket journal, even
    /// when a wallet change drops the cycle before it returns.
    ///
    /// # Errors
    ///
    /// - the classified failure or a rejection
    /// - [`SessionError::Interrupted`] if the cycle was dropped mid-purchase
    #[tracing::instrument(skip(self, seed))]
    pub async fn buy(&self, seed: impl Into<String>, quantity: u64) -> Result<TicketState, SessionError> {
        let state = self
            .run(TicketAction::Buy {
                seed: seed.into(),
                quantity,
            })
            .await?;

        let purchased = state
            .ticket
            .as_ref()
            .is_some_and(|ticket| ticket.purchase_tx.is_some());
        if !purchased {
            tracing::warn!("Purchase cycle dropped before confirmation");
            return Err(SessionError::Interrupted("purchase"));
        }
        Ok(state)
    }

    /// Cancel a purchase that has not reached the wallet yet
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] once the purchase was submitted.
    pub async fn cancel(&self) -> Result<TicketState, SessionError> {
        self.run(TicketAction::Cancel).await
    }

    /// Declare the ticket mature
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] unless a purchase is pending maturation.
    pub async fn advance(&self) -> Result<TicketState, SessionError> {
        self.run(TicketAction::AdvanceMaturation).await
    }

    /// Redeem the current ticket
    ///
    /// # Errors
    ///
    /// - the classified failure or a rejection
    /// - [`SessionError::Interrupted`] if the cycle was dropped mid-redemption
    #[tracing::instrument(skip(self))]
    pub async fn redeem(&self) -> Result<TicketState, SessionError> {
        let state = self.run(TicketAction::Redeem).await?;
        if state.last_result.is_none() {
            tracing::warn!("Redemption cycle dropped before settlement");
            return Err(SessionError::Interrupted("redemption"));
        }
        Ok(state)
    }

    /// Resume after a failure
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] when nothing can be resumed.
    pub async fn retry(&self) -> Result<TicketState, SessionError> {
        self.run(TicketAction::Retry).await
    }

    /// Start a new cycle with a fresh seed
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rejected`] while a chain call is in flight.
    pub async fn reset(&self) -> Result<TicketState, SessionError> {
        self.run(TicketAction::Reset).await
    }

    /// Unredeemed tickets the connected account bought on this network and
    /// contract, including the one the current cycle holds
    pub async fn pending_tickets(&self) -> Vec<PendingTicket> {
        let Some(owner) = self.account().await else {
            return Vec::new();
        };
        self.journal
            .lock()
            .await
            .unprocessed_for(owner, self.config.chain_id, self.config.contract_address)
            .cloned()
            .collect()
    }

    /// Redeem a journaled ticket outside the controller's current cycle
    ///
    /// # Errors
    ///
    /// - [`SessionError::Rejected`] while the current cycle holds the ticket or
    ///   another redemption of it is running
    /// - [`SessionError::UnknownPendingTicket`] if the connected account has no
    ///   such pending purchase
    /// - the classified redemption failure otherwise
    #[tracing::instrument(skip(self))]
    pub async fn redeem_pending(&self, purchase_tx: TxId) -> Result<RedemptionResult, SessionError> {
        let held = self
            .store
            .state(|state| state.ticket.as_ref().and_then(|ticket| ticket.purchase_tx))
            .await;
        if held == Some(purchase_tx) {
            return Err(SessionError::Rejected(
                "ticket belongs to the current cycle; redeem it there".to_string(),
            ));
        }

        let seed = self
            .pending_tickets()
            .await
            .into_iter()
            .find(|ticket| ticket.purchase_tx == purchase_tx)
            .map(|ticket| ticket.seed)
            .ok_or(SessionError::UnknownPendingTicket(purchase_tx))?;

        if !self.redeeming.lock().await.insert(purchase_tx) {
            return Err(SessionError::Rejected(
                "redemption already in flight for this ticket".to_string(),
            ));
        }
        let redeemed = self.gateway.redeem(&seed).await;
        self.redeeming.lock().await.remove(&purchase_tx);
        let result = redeemed?;

        if result.matched {
            self.ledger.append(&result).await;
        }
        self.mark_processed(&purchase_tx).await;
        Ok(result)
    }

    /// Owned items, most recent first
    pub async fn inventory(&self) -> Vec<InventoryItem> {
        self.ledger.list().await
    }

    /// Current controller state
    pub async fn snapshot(&self) -> TicketState {
        self.store.state(Clone::clone).await
    }

    /// Cached ticket price in ether, if one was fetched
    pub async fn display_price(&self) -> Option<String> {
        self.oracle.display_price().await
    }

    /// Every event produced by controller effects
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<TicketAction> {
        self.store.subscribe_actions()
    }

    /// Register a rarity tier (contract owner only)
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn add_tier(&self, tier: &Tier) -> Result<ConfirmedTx, SessionError> {
        Ok(self.gateway.add_tier(tier).await?)
    }

    /// Register a blueprint under an existing tier (contract owner only)
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn add_blueprint(&self, blueprint: &Blueprint) -> Result<ConfirmedTx, SessionError> {
        Ok(self.gateway.add_blueprint(blueprint).await?)
    }

    /// Stop accepting commands and wait for in-flight chain calls
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if calls are still running.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SessionError> {
        Ok(self.store.shutdown(timeout).await?)
    }

    async fn run(&self, action: TicketAction) -> Result<TicketState, SessionError> {
        let mut handle = self.store.send(action).await?;
        handle.wait().await;

        let state = self.snapshot().await;
        if let Some(reason) = &state.last_rejection {
            return Err(SessionError::Rejected(reason.clone()));
        }
        if let TicketPhase::Failed { error, .. } = &state.phase {
            return Err(SessionError::Loot(error.clone()));
        }
        Ok(state)
    }

    async fn mark_processed(&self, purchase_tx: &TxId) {
        if let Err(error) = self.journal.lock().await.mark_processed(purchase_tx).await {
            tracing::warn!(%error, tx = %purchase_tx, "Could not update pending ticket journal");
        }
    }
}

#[cfg(all(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::{LootOutcome, MockLotteryChain, SequentialSeeds};
    use aetherloot_testing::test_clock;

    fn session(chain: &MockLotteryChain) -> LootSession {
        LootSession::with_parts(
            LootConfig::default(),
            Arc::new(chain.clone()),
            Arc::new(chain.clone()),
            Arc::new(test_clock()),
            Arc::new(SequentialSeeds::starting_at(500)),
            PendingTickets::in_memory(),
        )
    }

    #[tokio::test]
    async fn rejected_commands_surface_as_errors() {
        let chain = MockLotteryChain::new();
        let session = session(&chain);
        session.connect().await.unwrap();

        let err = session.advance().await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected(_)));
        assert_eq!(session.snapshot().await.phase, TicketPhase::Idle);
    }

    #[tokio::test]
    async fn purchase_is_journaled_until_redeemed() {
        let chain = MockLotteryChain::new();
        let session = session(&chain);
        session.connect().await.unwrap();

        session.buy("42", 1).await.unwrap();
        assert_eq!(session.pending_tickets().await.len(), 1);

        chain.script_outcome(LootOutcome::Nothing);
        session.advance().await.unwrap();
        session.redeem().await.unwrap();
        assert!(session.pending_tickets().await.is_empty());
    }

    #[tokio::test]
    async fn pending_ticket_can_be_redeemed_after_reset() {
        let chain = MockLotteryChain::new();
        let session = session(&chain);
        session.connect().await.unwrap();

        let bought = session.buy("42", 1).await.unwrap();
        let purchase_tx = bought.ticket.unwrap().purchase_tx.unwrap();
        session.handle_wallet_event(WalletEvent::AccountsChanged(Some(chain.player()))).await.unwrap();

        chain.script_outcome(LootOutcome::mint("Rare", "Aether Blade"));
        let result = session.redeem_pending(purchase_tx).await.unwrap();
        assert!(result.matched);
        assert_eq!(session.inventory().await.len(), 1);

        let again = session.redeem_pending(purchase_tx).await.unwrap_err();
        assert!(matches!(again, SessionError::UnknownPendingTicket(_)));
    }
}
