//! Ticket price cache with a strict rule for money-moving reads.
//!
//! [`PriceOracle::get_for_spending`] never hands out a price that no fetch in
//! this session produced, and never a zero price. A missing or zero cache
//! triggers exactly one refresh; if that does not yield a usable price the
//! purchase is refused.

use crate::error::{LootError, Result};
use crate::gateway::ContractGateway;
use crate::types::PriceQuote;
use crate::units::format_ether;
use aetherloot_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Whether a purchase may reuse a cached quote
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendingPolicy {
    /// Reuse a non-zero quote fetched earlier in this session
    #[default]
    SessionCache,
    /// Re-read the price before every purchase
    AlwaysRefresh,
}

/// Per-ticket price cache in front of the [`ContractGateway`]
pub struct PriceOracle {
    gateway: ContractGateway,
    clock: Arc<dyn Clock>,
    policy: SpendingPolicy,
    cache: RwLock<Option<PriceQuote>>,
    /// Logical fetch counter, stamped on each quote
    fetches: AtomicU64,
    /// Bumped by `clear`; a refresh started in an older epoch does not store its result
    epoch: AtomicU64,
}

impl std::fmt::Debug for PriceOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceOracle")
            .field("policy", &self.policy)
            .field("fetches", &self.fetches.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PriceOracle {
    /// Creates an empty oracle
    #[must_use]
    pub fn new(gateway: ContractGateway, clock: Arc<dyn Clock>, policy: SpendingPolicy) -> Self {
        Self {
            gateway,
            clock,
            policy,
            cache: RwLock::new(None),
            fetches: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    /// The configured spending policy
    #[must_use]
    pub const fn policy(&self) -> SpendingPolicy {
        self.policy
    }

    /// Re-read the price from the contract and replace the cached quote
    ///
    /// A failed read leaves the cache untouched.
    ///
    /// # Errors
    ///
    /// Propagates the gateway's classified error.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<PriceQuote> {
        let epoch = self.epoch.load(Ordering::Acquire);
        metrics::counter!("loot.price.refreshes").increment(1);

        let amount_wei = self.gateway.get_ticket_price().await.inspect_err(|error| {
            tracing::warn!(%error, "Ticket price refresh failed");
        })?;

        let quote = PriceQuote {
            amount_wei,
            fetched_at: self.fetches.fetch_add(1, Ordering::AcqRel) + 1,
            observed_at: self.clock.now(),
        };

        let mut cache = self.cache.write().await;
        if self.epoch.load(Ordering::Acquire) == epoch {
            *cache = Some(quote);
        } else {
            tracing::debug!("Cache cleared during refresh, discarding quote");
        }
        drop(cache);

        tracing::debug!(price_wei = %quote.amount_wei, fetched_at = quote.fetched_at, "Price refreshed");
        Ok(quote)
    }

    /// A quote that is safe to compute a payment from
    ///
    /// Uses the cached quote when the policy allows and it is non-zero;
    /// otherwise performs exactly one [`refresh`](Self::refresh).
    ///
    /// # Errors
    ///
    /// - [`LootError::PriceUnavailable`] if the fetched price is zero
    /// - Any error from the refresh itself (e.g. [`LootError::NetworkUnavailable`])
    pub async fn get_for_spending(&self) -> Result<PriceQuote> {
        if self.policy == SpendingPolicy::SessionCache {
            if let Some(quote) = self.cached().await.filter(PriceQuote::is_spendable) {
                return Ok(quote);
            }
        }

        let quote = self.refresh().await?;
        if quote.is_spendable() {
            Ok(quote)
        } else {
            tracing::warn!("Contract reported a zero ticket price");
            Err(LootError::PriceUnavailable)
        }
    }

    /// The cached quote, if any
    pub async fn cached(&self) -> Option<PriceQuote> {
        *self.cache.read().await
    }

    /// Drop the cached quote (account or network change)
    pub async fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *self.cache.write().await = None;
    }

    /// The cached price formatted in ether, for display only
    pub async fn display_price(&self) -> Option<String> {
        self.cached().await.map(|quote| format_ether(quote.amount_wei))
    }
}
