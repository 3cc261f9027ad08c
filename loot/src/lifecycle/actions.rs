//! Commands and events of the ticket lifecycle.

use crate::error::LootError;
use crate::gateway::ConfirmedTx;
use crate::types::{PriceQuote, RedemptionResult, TicketId};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Actions for the ticket lifecycle controller
///
/// Commands come from the participant; events are fed back by effects and
/// carry the id of the ticket they were started for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    // Commands
    /// Start a purchase
    Buy {
        /// Entropy input
        seed: String,
        /// Number of entries
        quantity: u64,
    },

    /// Abandon a purchase that has not been handed to the wallet yet
    Cancel,

    /// Declare the target block reached
    AdvanceMaturation,

    /// Redeem the matured ticket
    Redeem,

    /// Resume after a resumable failure
    Retry,

    /// Start a new cycle with a fresh seed
    Reset,

    // Events
    /// The price for the purchase was validated
    PriceValidated {
        /// Ticket being bought
        ticket_id: TicketId,
        /// Validated quote
        quote: PriceQuote,
    },

    /// The purchase was included on chain
    PurchaseConfirmed {
        /// Ticket bought
        ticket_id: TicketId,
        /// Inclusion data
        confirmation: ConfirmedTx,
        /// Exact amount paid
        payment_wei: U256,
    },

    /// Pricing or purchase failed
    PurchaseFailed {
        /// Ticket being bought
        ticket_id: TicketId,
        /// Classified failure
        error: LootError,
    },

    /// The redemption was included (matched or not)
    RedemptionSettled {
        /// Ticket redeemed
        ticket_id: TicketId,
        /// Decoded outcome
        result: RedemptionResult,
    },

    /// The redemption failed
    RedemptionFailed {
        /// Ticket being redeemed
        ticket_id: TicketId,
        /// Classified failure
        error: LootError,
    },

    /// The wallet switched account or network; drop the current cycle
    AccountChanged,
}

impl TicketAction {
    /// Whether this action is a participant command
    #[must_use]
    pub const fn is_command(&self) -> bool {
        matches!(
            self,
            Self::Buy { .. }
                | Self::Cancel
                | Self::AdvanceMaturation
                | Self::Redeem
                | Self::Retry
                | Self::Reset
        )
    }

    /// Whether this action is an event fed back by an effect or the session
    #[must_use]
    pub const fn is_event(&self) -> bool {
        !self.is_command()
    }

    /// Ticket an event refers to
    #[must_use]
    pub const fn ticket_id(&self) -> Option<TicketId> {
        match self {
            Self::PriceValidated { ticket_id, .. }
            | Self::PurchaseConfirmed { ticket_id, .. }
            | Self::PurchaseFailed { ticket_id, .. }
            | Self::RedemptionSettled { ticket_id, .. }
            | Self::RedemptionFailed { ticket_id, .. } => Some(*ticket_id),
            _ => None,
        }
    }

    /// Short label for logs and metrics
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Buy { .. } => "buy",
            Self::Cancel => "cancel",
            Self::AdvanceMaturation => "advance_maturation",
            Self::Redeem => "redeem",
            Self::Retry => "retry",
            Self::Reset => "reset",
            Self::PriceValidated { .. } => "price_validated",
            Self::PurchaseConfirmed { .. } => "purchase_confirmed",
            Self::PurchaseFailed { .. } => "purchase_failed",
            Self::RedemptionSettled { .. } => "redemption_settled",
            Self::RedemptionFailed { .. } => "redemption_failed",
            Self::AccountChanged => "account_changed",
        }
    }
}
