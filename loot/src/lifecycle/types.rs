//! State of the ticket lifecycle controller.

use crate::error::LootError;
use crate::types::{PriceQuote, RedemptionResult, Ticket, TicketStatus};
use serde::{Deserialize, Serialize};

/// Where `Retry` takes a failed controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResumePoint {
    /// Start the purchase over with the kept seed and quantity
    Idle,
    /// Ask for the redemption signature again (nothing was submitted)
    ReadyToRedeem,
    /// The ticket cannot be resumed; only `Reset` is possible
    Terminal,
}

/// Phase of the controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketPhase {
    /// Waiting for a purchase intent
    Idle,
    /// Purchase intent accepted; price check or purchase in flight
    AwaitingPurchase,
    /// Purchase included; waiting for the target block
    PendingMaturation,
    /// The participant declared the ticket mature
    ReadyToRedeem,
    /// Redemption included; result available
    Settled,
    /// Something failed
    Failed {
        /// Classified failure
        error: LootError,
        /// Where `Retry` resumes
        resume: ResumePoint,
    },
}

impl TicketPhase {
    /// Short label for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingPurchase => "awaiting_purchase",
            Self::PendingMaturation => "pending_maturation",
            Self::ReadyToRedeem => "ready_to_redeem",
            Self::Settled => "settled",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Everything the controller owns
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketState {
    /// Current phase
    pub phase: TicketPhase,
    /// Seed for the next (or current) purchase; kept across failures
    pub seed: String,
    /// Quantity for the next (or current) purchase; kept across failures
    pub quantity: u64,
    /// The ticket of the current cycle
    pub ticket: Option<Ticket>,
    /// Quote the current purchase was priced with
    pub last_quote: Option<PriceQuote>,
    /// Outcome of the last redemption
    pub last_result: Option<RedemptionResult>,
    /// Last classified failure
    pub last_error: Option<LootError>,
    /// Why the last command was refused
    pub last_rejection: Option<String>,
}

impl TicketState {
    /// Idle controller with an initial seed and a quantity of one
    #[must_use]
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            phase: TicketPhase::Idle,
            seed: seed.into(),
            quantity: 1,
            ticket: None,
            last_quote: None,
            last_result: None,
            last_error: None,
            last_rejection: None,
        }
    }

    /// Whether a chain call for the current ticket is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        match self.phase {
            TicketPhase::AwaitingPurchase => true,
            TicketPhase::ReadyToRedeem => self
                .ticket
                .as_ref()
                .is_some_and(|ticket| ticket.redemption_submitted),
            _ => false,
        }
    }

    /// Status of the current ticket, if any
    #[must_use]
    pub fn ticket_status(&self) -> Option<TicketStatus> {
        self.ticket.as_ref().map(|ticket| ticket.status)
    }

    /// Whether the phase is `Failed`
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.phase, TicketPhase::Failed { .. })
    }
}

impl Default for TicketState {
    fn default() -> Self {
        Self::new(String::new())
    }
}
