//! Reducer driving one ticket from purchase intent to settled result.

use crate::error::LootError;
use crate::gateway::ConfirmedTx;
use crate::journal::PendingTicket;
use crate::lifecycle::{ResumePoint, TicketAction, TicketEnvironment, TicketPhase, TicketState};
use crate::types::{PriceQuote, RedemptionResult, Ticket, TicketId, TicketStatus};
use aetherloot_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use alloy::primitives::U256;

type Effects = SmallVec<[Effect<TicketAction>; 4]>;

/// Ticket lifecycle state machine
///
/// ```text
/// Idle ──Buy──▶ AwaitingPurchase ──PurchaseConfirmed──▶ PendingMaturation
///                                                          │ AdvanceMaturation
///                                                          ▼
/// Idle ◀──Reset── Settled ◀──RedemptionSettled── ReadyToRedeem ──Redeem──▶ (in flight)
/// ```
///
/// Any failure moves to `Failed`, which remembers where `Retry` resumes.
/// At most one redemption is in flight per ticket; a second `Redeem` is refused.
///
/// The purchase and redemption effects write the pending ticket journal
/// themselves, before their event is fed back. A paid ticket stays on record
/// when the cycle that bought it is dropped in the meantime.
#[derive(Clone, Copy, Debug, Default)]
pub struct TicketReducer;

impl TicketReducer {
    /// Create a new ticket reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut TicketState, reason: impl Into<String>) -> Effects {
        let reason = reason.into();
        tracing::debug!(phase = state.phase.name(), %reason, "Command rejected");
        state.last_rejection = Some(reason);
        smallvec![Effect::None]
    }

    fn holds(state: &TicketState, ticket_id: TicketId) -> bool {
        state
            .ticket
            .as_ref()
            .is_some_and(|ticket| ticket.id == ticket_id)
    }

    fn start_cycle(state: &mut TicketState, env: &TicketEnvironment) {
        state.phase = TicketPhase::Idle;
        state.ticket = None;
        state.last_quote = None;
        state.last_result = None;
        state.last_error = None;
        state.seed = env.seeds().next_seed();
    }

    fn buy(state: &mut TicketState, seed: String, quantity: u64, env: &TicketEnvironment) -> Effects {
        let may_buy = matches!(
            state.phase,
            TicketPhase::Idle
                | TicketPhase::Failed {
                    resume: ResumePoint::Idle,
                    ..
                }
        );
        if !may_buy {
            return Self::reject(state, format!("cannot buy while {}", state.phase.name()));
        }
        if quantity == 0 {
            return Self::reject(state, "ticket quantity must be at least 1");
        }
        if seed.trim().is_empty() {
            return Self::reject(state, "seed must not be empty");
        }

        state.seed.clone_from(&seed);
        state.quantity = quantity;

        let ticket = Ticket::new(seed, quantity, env.clock().now());
        let ticket_id = ticket.id;
        state.ticket = Some(ticket);
        state.phase = TicketPhase::AwaitingPurchase;
        state.last_quote = None;
        state.last_result = None;
        state.last_error = None;

        tracing::info!(%ticket_id, quantity, "Purchase started");

        let oracle = env.oracle();
        smallvec![Effect::future(async move {
            Some(match oracle.get_for_spending().await {
                Ok(quote) => TicketAction::PriceValidated { ticket_id, quote },
                Err(error) => TicketAction::PurchaseFailed { ticket_id, error },
            })
        })]
    }

    fn price_validated(
        state: &mut TicketState,
        ticket_id: TicketId,
        quote: PriceQuote,
        env: &TicketEnvironment,
    ) -> Effects {
        if state.phase != TicketPhase::AwaitingPurchase || !Self::holds(state, ticket_id) {
            tracing::debug!(%ticket_id, "Ignoring price for a ticket no longer held");
            return smallvec![Effect::None];
        }
        let Some(ticket) = state.ticket.as_mut() else {
            return smallvec![Effect::None];
        };
        if ticket.status != TicketStatus::Created {
            return smallvec![Effect::None];
        }

        let Some(payment_wei) = quote.payment_for(ticket.quantity) else {
            let error = LootError::InvalidRequest("payment amount overflows".to_string());
            return Self::purchase_failed(state, ticket_id, error);
        };

        ticket.status = TicketStatus::Submitted;
        let seed = ticket.seed.clone();
        let quantity = ticket.quantity;
        state.last_quote = Some(quote);

        tracing::debug!(%ticket_id, %payment_wei, "Price validated, submitting purchase");

        let gateway = env.gateway();
        let journal = env.journal();
        let chain_id = env.chain_id();
        smallvec![Effect::future(async move {
            let confirmation = match gateway.buy_ticket(&seed, quantity, payment_wei).await {
                Ok(confirmation) => confirmation,
                Err(error) => return Some(TicketAction::PurchaseFailed { ticket_id, error }),
            };

            let pending = PendingTicket {
                seed,
                quantity,
                purchase_tx: confirmation.tx_id,
                target_block: confirmation.block_number.saturating_add(1),
                owner: confirmation.from,
                chain_id,
                contract: gateway.contract_address(),
                processed: false,
            };
            if let Err(error) = journal.lock().await.record(pending).await {
                tracing::warn!(%error, tx = %confirmation.tx_id, "Could not journal purchase");
            }

            Some(TicketAction::PurchaseConfirmed {
                ticket_id,
                confirmation,
                payment_wei,
            })
        })]
    }

    fn purchase_confirmed(
        state: &mut TicketState,
        ticket_id: TicketId,
        confirmation: ConfirmedTx,
        payment_wei: U256,
    ) -> Effects {
        if state.phase != TicketPhase::AwaitingPurchase {
            return smallvec![Effect::None];
        }
        let Some(ticket) = state.ticket.as_mut().filter(|ticket| ticket.id == ticket_id) else {
            return smallvec![Effect::None];
        };

        ticket.status = TicketStatus::Confirmed;
        ticket.purchase_tx = Some(confirmation.tx_id);
        ticket.payment_wei = Some(payment_wei);
        ticket.purchase_block = Some(confirmation.block_number);
        ticket.target_block = Some(confirmation.block_number.saturating_add(1));
        state.phase = TicketPhase::PendingMaturation;

        tracing::info!(
            %ticket_id,
            tx = %confirmation.tx_id,
            target_block = confirmation.block_number.saturating_add(1),
            "Purchase confirmed"
        );
        smallvec![Effect::None]
    }

    fn purchase_failed(state: &mut TicketState, ticket_id: TicketId, error: LootError) -> Effects {
        if state.phase != TicketPhase::AwaitingPurchase {
            return smallvec![Effect::None];
        }
        let Some(ticket) = state.ticket.as_mut().filter(|ticket| ticket.id == ticket_id) else {
            return smallvec![Effect::None];
        };

        ticket.status = TicketStatus::Failed;
        tracing::warn!(%ticket_id, kind = error.kind(), %error, "Purchase failed");
        state.last_error = Some(error.clone());
        state.phase = TicketPhase::Failed {
            error,
            resume: ResumePoint::Idle,
        };
        smallvec![Effect::None]
    }

    fn cancel(state: &mut TicketState) -> Effects {
        let cancellable = state.phase == TicketPhase::AwaitingPurchase
            && state.ticket_status() == Some(TicketStatus::Created);
        if !cancellable {
            let reason = if state.phase == TicketPhase::AwaitingPurchase {
                "purchase already handed to the wallet"
            } else {
                "no purchase to cancel"
            };
            return Self::reject(state, reason);
        }

        tracing::info!("Purchase cancelled before submission");
        state.ticket = None;
        state.phase = TicketPhase::Idle;
        smallvec![Effect::None]
    }

    fn advance(state: &mut TicketState) -> Effects {
        if state.phase != TicketPhase::PendingMaturation {
            return Self::reject(
                state,
                format!("cannot advance maturation while {}", state.phase.name()),
            );
        }
        if let Some(ticket) = state.ticket.as_mut() {
            ticket.status = TicketStatus::Matured;
        }
        state.phase = TicketPhase::ReadyToRedeem;
        smallvec![Effect::None]
    }

    fn redeem(state: &mut TicketState, env: &TicketEnvironment) -> Effects {
        if state.phase != TicketPhase::ReadyToRedeem {
            return Self::reject(state, format!("cannot redeem while {}", state.phase.name()));
        }
        let Some(ticket) = state.ticket.as_mut() else {
            return Self::reject(state, "no ticket to redeem");
        };
        if ticket.redemption_submitted {
            return Self::reject(state, "redemption already submitted for this ticket");
        }

        ticket.redemption_submitted = true;
        let ticket_id = ticket.id;
        let seed = ticket.seed.clone();
        let purchase_tx = ticket.purchase_tx;
        tracing::info!(%ticket_id, "Redemption started");

        let gateway = env.gateway();
        let journal = env.journal();
        smallvec![Effect::future(async move {
            let result = match gateway.redeem(&seed).await {
                Ok(result) => result,
                Err(error) => return Some(TicketAction::RedemptionFailed { ticket_id, error }),
            };

            if let Some(purchase_tx) = purchase_tx {
                if let Err(error) = journal.lock().await.mark_processed(&purchase_tx).await {
                    tracing::warn!(%error, tx = %purchase_tx, "Could not update pending ticket journal");
                }
            }

            Some(TicketAction::RedemptionSettled { ticket_id, result })
        })]
    }

    fn awaiting_redemption(state: &TicketState, ticket_id: TicketId) -> bool {
        state.phase == TicketPhase::ReadyToRedeem
            && state
                .ticket
                .as_ref()
                .is_some_and(|ticket| ticket.id == ticket_id && ticket.redemption_submitted)
    }

    fn redemption_settled(
        state: &mut TicketState,
        ticket_id: TicketId,
        result: RedemptionResult,
        env: &TicketEnvironment,
    ) -> Effects {
        if !Self::awaiting_redemption(state, ticket_id) {
            tracing::debug!(%ticket_id, "Ignoring redemption for a ticket no longer held");
            return smallvec![Effect::None];
        }
        if let Some(ticket) = state.ticket.as_mut() {
            ticket.status = TicketStatus::Redeemed;
        }
        state.phase = TicketPhase::Settled;
        state.last_result = Some(result.clone());

        if !result.matched {
            tracing::info!(%ticket_id, tx = %result.tx_id, "Redemption settled without a mint");
            return smallvec![Effect::None];
        }

        let ledger = env.ledger();
        smallvec![Effect::future(async move {
            ledger.append(&result).await;
            None
        })]
    }

    fn redemption_failed(state: &mut TicketState, ticket_id: TicketId, error: LootError) -> Effects {
        if !Self::awaiting_redemption(state, ticket_id) {
            return smallvec![Effect::None];
        }

        let resume = if error == LootError::UserRejected {
            ResumePoint::ReadyToRedeem
        } else {
            if let Some(ticket) = state.ticket.as_mut() {
                ticket.status = TicketStatus::Failed;
            }
            ResumePoint::Terminal
        };

        tracing::warn!(%ticket_id, kind = error.kind(), %error, "Redemption failed");
        state.last_error = Some(error.clone());
        state.phase = TicketPhase::Failed { error, resume };
        smallvec![Effect::None]
    }

    fn retry(state: &mut TicketState) -> Effects {
        let TicketPhase::Failed { resume, .. } = state.phase else {
            return Self::reject(state, "nothing to retry");
        };

        match resume {
            ResumePoint::Idle => {
                state.ticket = None;
                state.phase = TicketPhase::Idle;
            },
            ResumePoint::ReadyToRedeem => {
                if let Some(ticket) = state.ticket.as_mut() {
                    ticket.redemption_submitted = false;
                }
                state.phase = TicketPhase::ReadyToRedeem;
            },
            ResumePoint::Terminal => {
                return Self::reject(state, "ticket cannot be resumed; reset to start over");
            },
        }
        state.last_error = None;
        smallvec![Effect::None]
    }

    fn reset(state: &mut TicketState, env: &TicketEnvironment) -> Effects {
        if state.is_busy() {
            return Self::reject(state, "cannot reset while a chain call is in flight");
        }
        Self::start_cycle(state, env);
        smallvec![Effect::None]
    }
}

impl Reducer for TicketReducer {
    type State = TicketState;
    type Action = TicketAction;
    type Environment = TicketEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        tracing::trace!(action = action.name(), phase = state.phase.name(), "Reducing");
        if action.is_command() {
            state.last_rejection = None;
        }

        match action {
            // Commands
            TicketAction::Buy { seed, quantity } => Self::buy(state, seed, quantity, env),
            TicketAction::Cancel => Self::cancel(state),
            TicketAction::AdvanceMaturation => Self::advance(state),
            TicketAction::Redeem => Self::redeem(state, env),
            TicketAction::Retry => Self::retry(state),
            TicketAction::Reset => Self::reset(state, env),

            // Events
            TicketAction::PriceValidated { ticket_id, quote } => {
                Self::price_validated(state, ticket_id, quote, env)
            },
            TicketAction::PurchaseConfirmed {
                ticket_id,
                confirmation,
                payment_wei,
            } => Self::purchase_confirmed(state, ticket_id, confirmation, payment_wei),
            TicketAction::PurchaseFailed { ticket_id, error } => {
                Self::purchase_failed(state, ticket_id, error)
            },
            TicketAction::RedemptionSettled { ticket_id, result } => {
                Self::redemption_settled(state, ticket_id, result, env)
            },
            TicketAction::RedemptionFailed { ticket_id, error } => {
                Self::redemption_failed(state, ticket_id, error)
            },
            TicketAction::AccountChanged => {
                Self::start_cycle(state, env);
                smallvec![Effect::None]
            },
        }
    }
}
