//! Inventory ledger: what the participant owns, rebuilt from mint events.
//!
//! Two sources feed it: a one-time historical backfill ([`InventoryLedger::bootstrap`])
//! and live redemption results ([`InventoryLedger::append`]). Items are kept
//! most-recent-first by ledger position and deduplicated by [`MintId`], so the
//! two sources can arrive in any order and overlap freely.

use crate::error::Result;
use crate::gateway::ContractGateway;
use crate::types::{InventoryItem, MintId, RedemptionResult};
use aetherloot_core::environment::Clock;
use alloy::primitives::Address;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Ordered, deduplicated item set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    items: Vec<InventoryItem>,
    mint_ids: HashSet<MintId>,
}

impl LedgerState {
    /// Insert an item, keeping position order; `false` if its mint id is already present
    pub fn insert(&mut self, item: InventoryItem) -> bool {
        if !self.mint_ids.insert(item.mint_id) {
            return false;
        }
        let at = self
            .items
            .partition_point(|existing| existing.position > item.position);
        self.items.insert(at, item);
        true
    }

    /// Items, most recent first
    #[must_use]
    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    /// Whether an item with this mint id is present
    #[must_use]
    pub fn contains(&self, mint_id: &MintId) -> bool {
        self.mint_ids.contains(mint_id)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.mint_ids.clear();
    }
}

/// Owned-item history of the connected participant
pub struct InventoryLedger {
    gateway: ContractGateway,
    clock: Arc<dyn Clock>,
    genesis_block: u64,
    state: RwLock<LedgerState>,
    /// Bumped by `reset`; a bootstrap from an older epoch is discarded
    epoch: AtomicU64,
}

impl std::fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLedger")
            .field("genesis_block", &self.genesis_block)
            .finish_non_exhaustive()
    }
}

impl InventoryLedger {
    /// Creates an empty ledger that backfills from `genesis_block`
    #[must_use]
    pub fn new(gateway: ContractGateway, clock: Arc<dyn Clock>, genesis_block: u64) -> Self {
        Self {
            gateway,
            clock,
            genesis_block,
            state: RwLock::new(LedgerState::default()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Backfill every historical mint of `owner`
    ///
    /// All events are collected before anything is inserted, so a failed scan
    /// leaves the ledger as it was. Returns the number of new items.
    ///
    /// # Errors
    ///
    /// Returns the classified error of the event query.
    #[tracing::instrument(skip(self), fields(from_block = self.genesis_block))]
    pub async fn bootstrap(&self, owner: Address) -> Result<usize> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let results: Vec<RedemptionResult> = self
            .gateway
            .query_mint_events(owner, self.genesis_block)
            .try_collect()
            .await?;

        let observed_at = self.clock.now();
        let mut state = self.state.write().await;
        if self.epoch.load(Ordering::Acquire) != epoch {
            tracing::debug!("Ledger reset during bootstrap, discarding results");
            return Ok(0);
        }

        let scanned = results.len();
        let added = results
            .iter()
            .filter_map(|result| InventoryItem::from_result(result, observed_at))
            .filter(|item| state.insert(item.clone()))
            .count();
        drop(state);

        tracing::info!(scanned, added, "Inventory bootstrapped");
        Ok(added)
    }

    /// Add the item minted by a redemption
    ///
    /// Unmatched results and replays of a known mint id are no-ops. Returns
    /// whether an item was added.
    pub async fn append(&self, result: &RedemptionResult) -> bool {
        let Some(item) = InventoryItem::from_result(result, self.clock.now()) else {
            tracing::debug!(tx = %result.tx_id, "Nothing to append for unmatched redemption");
            return false;
        };

        let mint_id = item.mint_id;
        let added = self.state.write().await.insert(item);
        if added {
            tracing::info!(%mint_id, "Inventory item appended");
        } else {
            tracing::debug!(%mint_id, "Mint already in inventory");
        }
        added
    }

    /// Current items, most recent first
    pub async fn list(&self) -> Vec<InventoryItem> {
        self.state.read().await.items().to_vec()
    }

    /// Item by mint id
    pub async fn get(&self, mint_id: &MintId) -> Option<InventoryItem> {
        self.state
            .read()
            .await
            .items()
            .iter()
            .find(|item| &item.mint_id == mint_id)
            .cloned()
    }

    /// Number of items
    pub async fn len(&self) -> usize {
        self.state.read().await.items().len()
    }

    /// Whether the ledger holds no items
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.items().is_empty()
    }

    /// Drop every item (account or network change)
    pub async fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.state.write().await.clear();
        tracing::debug!("Inventory reset");
    }
}
