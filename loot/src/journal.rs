//! Pending ticket journal.
//!
//! Purchased tickets that have not been redeemed yet are kept in a small JSON
//! file so a participant can come back after a restart and redeem them. Without
//! a path the journal lives in memory only.
//!
//! Every entry is scoped to the account that paid for it, the network and the
//! contract; a view only ever lists the connected account's tickets.

use crate::types::TxId;
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Default file name for the journal
pub const DEFAULT_JOURNAL_FILE: &str = "aether_loot_pending_tickets.json";

/// Journal errors
#[derive(Debug, Error)]
pub enum JournalError {
    /// Reading or writing the journal file failed
    #[error("Journal I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal file is not valid JSON
    #[error("Journal format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// A purchased ticket waiting for redemption
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTicket {
    /// Seed the ticket was bought with
    pub seed: String,
    /// Number of tickets bought in the purchase
    pub quantity: u64,
    /// Purchase transaction
    pub purchase_tx: TxId,
    /// First block at which the ticket can be redeemed
    pub target_block: u64,
    /// Account that paid for the purchase
    pub owner: Address,
    /// Network the purchase was made on
    pub chain_id: u64,
    /// Lottery contract the ticket belongs to
    pub contract: Address,
    /// Whether the ticket has been redeemed
    #[serde(default)]
    pub processed: bool,
}

impl PendingTicket {
    /// Whether this ticket was bought by `owner` from `contract` on `chain_id`
    #[must_use]
    pub fn belongs_to(&self, owner: Address, chain_id: u64, contract: Address) -> bool {
        self.owner == owner && self.chain_id == chain_id && self.contract == contract
    }
}

/// Journal shared between the session and controller effects
pub type SharedJournal = Arc<Mutex<PendingTickets>>;

/// Ordered list of pending tickets, optionally backed by a file
#[derive(Debug, Default)]
pub struct PendingTickets {
    path: Option<PathBuf>,
    entries: Vec<PendingTicket>,
}

impl PendingTickets {
    /// Journal kept in memory only
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the journal at `path`; a missing file is an empty journal
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened pending ticket journal");
        Ok(Self {
            path: Some(path),
            entries,
        })
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All entries in purchase order
    #[must_use]
    pub fn entries(&self) -> &[PendingTicket] {
        &self.entries
    }

    /// Entries that still need a redemption, for every account
    pub fn unprocessed(&self) -> impl Iterator<Item = &PendingTicket> {
        self.entries.iter().filter(|t| !t.processed)
    }

    /// Entries `owner` still needs to redeem on `contract` at `chain_id`
    pub fn unprocessed_for(
        &self,
        owner: Address,
        chain_id: u64,
        contract: Address,
    ) -> impl Iterator<Item = &PendingTicket> {
        self.unprocessed()
            .filter(move |t| t.belongs_to(owner, chain_id, contract))
    }

    /// Wrap the journal for sharing with controller effects
    #[must_use]
    pub fn shared(self) -> SharedJournal {
        Arc::new(Mutex::new(self))
    }

    /// Records a purchase; a purchase already present is left untouched
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the journal cannot be written.
    pub async fn record(&mut self, ticket: PendingTicket) -> Result<(), JournalError> {
        if self.entries.iter().any(|t| t.purchase_tx == ticket.purchase_tx) {
            return Ok(());
        }
        self.entries.push(ticket);
        self.save().await
    }

    /// Marks the purchase `purchase_tx` as redeemed
    ///
    /// Returns `false` when the journal has no such purchase.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the journal cannot be written.
    pub async fn mark_processed(&mut self, purchase_tx: &TxId) -> Result<bool, JournalError> {
        let Some(entry) = self.entries.iter_mut().find(|t| &t.purchase_tx == purchase_tx) else {
            return Ok(false);
        };
        if entry.processed {
            return Ok(true);
        }
        entry.processed = true;
        self.save().await?;
        Ok(true)
    }

    async fn save(&self) -> Result<(), JournalError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
