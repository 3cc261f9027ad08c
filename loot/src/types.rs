//! Domain types for the Aether Loot lottery client.
//!
//! Value objects and entities shared by the gateway, the ticket lifecycle and
//! the inventory ledger. Payment amounts are always integer wei (`U256`).

use alloy::primitives::{B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Transaction hash as reported by the chain.
pub type TxId = B256;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifies one ticket instance held by the lifecycle controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a log in the ledger, ordered by block then log index
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerPosition {
    /// Block the log was included in
    pub block_number: u64,
    /// Index of the log within the block
    pub log_index: u64,
}

impl LedgerPosition {
    /// Creates a ledger position
    #[must_use]
    pub const fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

/// Unique identity of a minted item: the redemption transaction plus the
/// index of its mint log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MintId {
    /// Redemption transaction
    pub tx_id: TxId,
    /// Log index of the mint event
    pub log_index: u64,
}

impl MintId {
    /// Creates a mint identifier
    #[must_use]
    pub const fn new(tx_id: TxId, log_index: u64) -> Self {
        Self { tx_id, log_index }
    }
}

impl fmt::Display for MintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.log_index)
    }
}

// ============================================================================
// Price
// ============================================================================

/// A ticket price read from the contract.
///
/// `fetched_at` is the oracle's fetch sequence number, so two quotes can be
/// compared for freshness without trusting wall clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Price of one ticket in wei
    pub amount_wei: U256,
    /// Logical fetch time (monotonic per oracle)
    pub fetched_at: u64,
    /// Wall time of the fetch
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Whether this quote can be used to compute a payment
    #[must_use]
    pub fn is_spendable(&self) -> bool {
        !self.amount_wei.is_zero()
    }

    /// Exact payment for `quantity` tickets, `None` on overflow
    #[must_use]
    pub fn payment_for(&self, quantity: u64) -> Option<U256> {
        self.amount_wei.checked_mul(U256::from(quantity))
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Status of a single ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    /// Purchase intent recorded, nothing submitted yet
    Created,
    /// Price validated and purchase handed to the wallet
    Submitted,
    /// Purchase included on chain
    Confirmed,
    /// Participant declared the ticket mature
    Matured,
    /// Redemption settled (matched or not)
    Redeemed,
    /// Terminal failure
    Failed,
}

impl TicketStatus {
    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Redeemed | Self::Failed)
    }
}

/// A purchased entry granting one redemption attempt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Controller-local identity
    pub id: TicketId,
    /// Participant-chosen entropy
    pub seed: String,
    /// Number of entries bought
    pub quantity: u64,
    /// Purchase transaction, once confirmed
    pub purchase_tx: Option<TxId>,
    /// Exact amount paid, once confirmed
    pub payment_wei: Option<U256>,
    /// Block the purchase landed in
    pub purchase_block: Option<u64>,
    /// Block whose hash the draw is evaluated against
    pub target_block: Option<u64>,
    /// Set once the redemption has been handed to the wallet
    pub redemption_submitted: bool,
    /// Current status
    pub status: TicketStatus,
    /// When the ticket was created
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Creates a ticket from a purchase intent
    #[must_use]
    pub fn new(seed: String, quantity: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(),
            seed,
            quantity,
            purchase_tx: None,
            payment_wei: None,
            purchase_block: None,
            target_block: None,
            redemption_submitted: false,
            status: TicketStatus::Created,
            created_at,
        }
    }

    /// Whether the target block has been reached at `current_block`
    #[must_use]
    pub fn is_mature_at(&self, current_block: u64) -> bool {
        self.target_block
            .is_some_and(|target| current_block >= target)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// A named rarity bucket; `rarity_id` doubles as the tier identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Display name
    pub name: String,
    /// Probability threshold evaluated by the contract
    pub modulo_target: U256,
    /// Rarity, also the tier id
    pub rarity_id: U256,
}

/// An item definition belonging to a tier, with a supply cap
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Tier this blueprint belongs to
    pub tier_rarity_id: U256,
    /// Display name
    pub name: String,
    /// Maximum number of mints
    pub max_supply: U256,
}

// ============================================================================
// Redemption and inventory
// ============================================================================

/// Decoded outcome of one redemption (or one historical mint event)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionResult {
    /// Whether a mint event for this participant was found
    pub matched: bool,
    /// Tier of the minted item
    pub tier_name: Option<String>,
    /// Blueprint of the minted item
    pub blueprint_name: Option<String>,
    /// Item name as emitted by the contract
    pub item_name: Option<String>,
    /// Rarity as emitted by the contract
    pub rarity: Option<U256>,
    /// Redemption transaction
    pub tx_id: TxId,
    /// Block of the mint event
    pub block_number: Option<u64>,
    /// Log index of the mint event
    pub log_index: Option<u64>,
}

impl RedemptionResult {
    /// A successful redemption that minted nothing
    #[must_use]
    pub const fn unmatched(tx_id: TxId, block_number: Option<u64>) -> Self {
        Self {
            matched: false,
            tier_name: None,
            blueprint_name: None,
            item_name: None,
            rarity: None,
            tx_id,
            block_number,
            log_index: None,
        }
    }

    /// Mint identity, only for matched results
    #[must_use]
    pub fn mint_id(&self) -> Option<MintId> {
        if !self.matched {
            return None;
        }
        self.log_index.map(|index| MintId::new(self.tx_id, index))
    }

    /// Ledger position, only for matched results
    #[must_use]
    pub fn position(&self) -> Option<LedgerPosition> {
        match (self.matched, self.block_number, self.log_index) {
            (true, Some(block), Some(index)) => Some(LedgerPosition::new(block, index)),
            _ => None,
        }
    }
}

/// An item the participant owns, derived from exactly one mint event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Unique identity
    pub mint_id: MintId,
    /// Tier name
    pub tier_name: String,
    /// Blueprint name
    pub blueprint_name: String,
    /// Where the mint event sits in the ledger
    pub position: LedgerPosition,
    /// When this client first observed the item
    pub observed_at: DateTime<Utc>,
    /// Catalog lookup key
    pub item_key: String,
}

impl InventoryItem {
    /// Builds an item from a matched redemption result
    ///
    /// Returns `None` when the result did not match or lacks the fields a
    /// mint event always carries.
    #[must_use]
    pub fn from_result(result: &RedemptionResult, observed_at: DateTime<Utc>) -> Option<Self> {
        let mint_id = result.mint_id()?;
        let position = result.position()?;
        let tier_name = result.tier_name.clone()?;
        let blueprint_name = result.blueprint_name.clone()?;

        Some(Self {
            mint_id,
            item_key: blueprint_name.clone(),
            tier_name,
            blueprint_name,
            position,
            observed_at,
        })
    }
}
