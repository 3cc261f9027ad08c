//! Unit tests for `TicketReducer`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code

use super::*;
use crate::error::LootError;
use crate::gateway::ConfirmedTx;
use crate::ledger::InventoryLedger;
use crate::mocks::{MockLotteryChain, SequentialSeeds};
use crate::oracle::{PriceOracle, SpendingPolicy};
use crate::types::{PriceQuote, RedemptionResult, Ticket, TicketId, TicketStatus};
use aetherloot_core::effect::Effect;
use aetherloot_core::environment::Clock;
use aetherloot_core::reducer::Reducer;
use aetherloot_testing::{assertions, test_clock, ReducerTest};
use alloy::primitives::{Address, B256, U256};
use std::sync::Arc;

fn test_env() -> TicketEnvironment {
    env_on(&MockLotteryChain::new().connected())
}

fn env_on(chain: &MockLotteryChain) -> TicketEnvironment {
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    let gateway = chain.gateway();
    let oracle = Arc::new(PriceOracle::new(
        gateway.clone(),
        Arc::clone(&clock),
        SpendingPolicy::SessionCache,
    ));
    let ledger = Arc::new(InventoryLedger::new(gateway.clone(), Arc::clone(&clock), 0));
    TicketEnvironment::new(
        clock,
        oracle,
        gateway,
        ledger,
        Arc::new(SequentialSeeds::starting_at(100)),
    )
}

fn quote(amount: u64) -> PriceQuote {
    PriceQuote {
        amount_wei: U256::from(amount),
        fetched_at: 1,
        observed_at: test_clock().now(),
    }
}

/// State with a ticket in `status` and the controller in `phase`
fn state_with_ticket(phase: TicketPhase, status: TicketStatus) -> (TicketState, TicketId) {
    let mut ticket = Ticket::new("4242".to_string(), 3, test_clock().now());
    ticket.status = status;
    let ticket_id = ticket.id;

    let mut state = TicketState::new("4242");
    state.quantity = 3;
    state.phase = phase;
    state.ticket = Some(ticket);
    (state, ticket_id)
}

fn ready_to_redeem(submitted: bool) -> (TicketState, TicketId) {
    let (mut state, ticket_id) = state_with_ticket(TicketPhase::ReadyToRedeem, TicketStatus::Matured);
    if let Some(ticket) = state.ticket.as_mut() {
        ticket.redemption_submitted = submitted;
        ticket.purchase_block = Some(10);
        ticket.target_block = Some(11);
    }
    (state, ticket_id)
}

fn matched_result() -> RedemptionResult {
    RedemptionResult {
        matched: true,
        tier_name: Some("Rare".to_string()),
        blueprint_name: Some("Aether Blade".to_string()),
        item_name: Some("Aether Blade".to_string()),
        rarity: Some(U256::from(3)),
        tx_id: B256::repeat_byte(7),
        block_number: Some(12),
        log_index: Some(1),
    }
}

// ============================================================================
// Purchase
// ============================================================================

#[test]
fn buy_from_idle_starts_price_check() {
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(TicketState::new("1"))
        .when_action(TicketAction::Buy {
            seed: "4242".to_string(),
            quantity: 3,
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::AwaitingPurchase);
            assert_eq!(state.seed, "4242");
            assert_eq!(state.quantity, 3);
            assert_eq!(state.ticket_status(), Some(TicketStatus::Created));
            assert!(state.last_rejection.is_none());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn buy_with_zero_quantity_is_rejected() {
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(TicketState::new("1"))
        .when_action(TicketAction::Buy {
            seed: "4242".to_string(),
            quantity: 0,
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Idle);
            assert!(state.ticket.is_none());
            assert!(state.last_rejection.is_some());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn buy_while_pending_maturation_is_rejected() {
    let (state, _) = state_with_ticket(TicketPhase::PendingMaturation, TicketStatus::Confirmed);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Buy {
            seed: "1".to_string(),
            quantity: 1,
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::PendingMaturation);
            assert_eq!(
                state.last_rejection.as_deref(),
                Some("cannot buy while pending_maturation")
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn validated_price_submits_purchase() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Created);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::PriceValidated {
            ticket_id,
            quote: quote(1000),
        })
        .then_state(|state| {
            assert_eq!(state.ticket_status(), Some(TicketStatus::Submitted));
            assert_eq!(state.last_quote.map(|q| q.amount_wei), Some(U256::from(1000)));
        })
        .then_effects(assertions::assert_has_future_effect)
        .run();
}

#[test]
fn overflowing_payment_fails_without_submission() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Created);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::PriceValidated {
            ticket_id,
            quote: PriceQuote {
                amount_wei: U256::MAX,
                ..quote(1)
            },
        })
        .then_state(|state| {
            assert!(state.is_failed());
            assert!(matches!(state.last_error, Some(LootError::InvalidRequest(_))));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn cancel_before_submission_returns_to_idle() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Created);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Cancel)
        // The price check finishing afterwards must not resurrect the purchase
        .when_action(TicketAction::PriceValidated {
            ticket_id,
            quote: quote(1000),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Idle);
            assert!(state.ticket.is_none());
            assert_eq!(state.seed, "4242");
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn cancel_after_submission_is_rejected() {
    let (state, _) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Submitted);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Cancel)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::AwaitingPurchase);
            assert_eq!(
                state.last_rejection.as_deref(),
                Some("purchase already handed to the wallet")
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn confirmed_purchase_targets_next_block() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Submitted);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::PurchaseConfirmed {
            ticket_id,
            confirmation: ConfirmedTx {
                tx_id: B256::repeat_byte(1),
                from: Address::repeat_byte(0xa1),
                block_number: 41,
            },
            payment_wei: U256::from(3000),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::PendingMaturation);
            let ticket = state.ticket.as_ref().unwrap();
            assert_eq!(ticket.status, TicketStatus::Confirmed);
            assert_eq!(ticket.payment_wei, Some(U256::from(3000)));
            assert_eq!(ticket.purchase_block, Some(41));
            assert_eq!(ticket.target_block, Some(42));
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn declined_purchase_keeps_draft_for_retry() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Submitted);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::PurchaseFailed {
            ticket_id,
            error: LootError::UserRejected,
        })
        .then_state(|state| {
            assert_eq!(
                state.phase,
                TicketPhase::Failed {
                    error: LootError::UserRejected,
                    resume: ResumePoint::Idle,
                }
            );
            assert_eq!(state.seed, "4242");
            assert_eq!(state.quantity, 3);
            assert!(state.ticket.as_ref().unwrap().payment_wei.is_none());
        })
        .run();
}

#[test]
fn retry_after_purchase_failure_returns_to_idle() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Submitted);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::PurchaseFailed {
            ticket_id,
            error: LootError::NetworkUnavailable("timeout".to_string()),
        })
        .when_action(TicketAction::Retry)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Idle);
            assert!(state.ticket.is_none());
            assert!(state.last_error.is_none());
            assert_eq!(state.seed, "4242");
        })
        .run();
}

// ============================================================================
// Maturation and redemption
// ============================================================================

#[test]
fn advance_only_from_pending_maturation() {
    let (state, _) = state_with_ticket(TicketPhase::PendingMaturation, TicketStatus::Confirmed);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::AdvanceMaturation)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::ReadyToRedeem);
            assert_eq!(state.ticket_status(), Some(TicketStatus::Matured));
        })
        .then_effects(assertions::assert_no_effects)
        .run();

    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(TicketState::new("1"))
        .when_action(TicketAction::AdvanceMaturation)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Idle);
            assert!(state.last_rejection.is_some());
        })
        .run();
}

#[test]
fn redeem_issues_one_call() {
    let (state, _) = ready_to_redeem(false);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Redeem)
        .then_state(|state| {
            assert!(state.ticket.as_ref().unwrap().redemption_submitted);
            assert!(state.is_busy());
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn second_redeem_is_rejected() {
    let (state, _) = ready_to_redeem(false);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Redeem)
        .when_action(TicketAction::Redeem)
        .then_state(|state| {
            assert_eq!(
                state.last_rejection.as_deref(),
                Some("redemption already submitted for this ticket")
            );
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn unmatched_settlement_leaves_ledger_alone() {
    let (state, ticket_id) = ready_to_redeem(true);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::RedemptionSettled {
            ticket_id,
            result: RedemptionResult::unmatched(B256::repeat_byte(2), Some(12)),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Settled);
            assert_eq!(state.ticket_status(), Some(TicketStatus::Redeemed));
            assert!(!state.last_result.as_ref().unwrap().matched);
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn matched_settlement_appends_to_ledger() {
    let (state, ticket_id) = ready_to_redeem(true);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::RedemptionSettled {
            ticket_id,
            result: matched_result(),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Settled);
            assert_eq!(
                state.last_result.as_ref().unwrap().tier_name.as_deref(),
                Some("Rare")
            );
        })
        .then_effects(assertions::assert_has_future_effect)
        .run();
}

#[test]
fn settlement_for_unknown_ticket_is_ignored() {
    let (state, _) = ready_to_redeem(true);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::RedemptionSettled {
            ticket_id: TicketId::new(),
            result: matched_result(),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::ReadyToRedeem);
            assert!(state.last_result.is_none());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn declined_redemption_can_be_retried() {
    let (state, ticket_id) = ready_to_redeem(true);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::RedemptionFailed {
            ticket_id,
            error: LootError::UserRejected,
        })
        .when_action(TicketAction::Retry)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::ReadyToRedeem);
            let ticket = state.ticket.as_ref().unwrap();
            assert_eq!(ticket.status, TicketStatus::Matured);
            assert!(!ticket.redemption_submitted);
        })
        .run();
}

#[test]
fn reverted_redemption_is_terminal() {
    let (state, ticket_id) = ready_to_redeem(true);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::RedemptionFailed {
            ticket_id,
            error: LootError::ContractReverted("Ticket not mature".to_string()),
        })
        .when_action(TicketAction::Retry)
        .then_state(|state| {
            assert!(matches!(
                state.phase,
                TicketPhase::Failed {
                    resume: ResumePoint::Terminal,
                    ..
                }
            ));
            assert_eq!(state.ticket_status(), Some(TicketStatus::Failed));
            assert!(state.last_rejection.is_some());
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn reset_after_settlement_draws_fresh_seed() {
    let (mut state, _) = ready_to_redeem(true);
    state.phase = TicketPhase::Settled;
    state.last_result = Some(matched_result());

    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Reset)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Idle);
            assert!(state.ticket.is_none());
            assert!(state.last_result.is_none());
            assert_eq!(state.seed, "100");
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[test]
fn reset_is_refused_while_redemption_in_flight() {
    let (state, _) = ready_to_redeem(true);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::Reset)
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::ReadyToRedeem);
            assert!(state.ticket.is_some());
            assert!(state.last_rejection.is_some());
        })
        .run();
}

#[test]
fn account_change_drops_in_flight_cycle() {
    let (state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Submitted);
    ReducerTest::new(TicketReducer::new())
        .with_env(test_env())
        .given_state(state)
        .when_action(TicketAction::AccountChanged)
        .when_action(TicketAction::PurchaseConfirmed {
            ticket_id,
            confirmation: ConfirmedTx {
                tx_id: B256::repeat_byte(1),
                from: Address::repeat_byte(0xa1),
                block_number: 5,
            },
            payment_wei: U256::from(3000),
        })
        .then_state(|state| {
            assert_eq!(state.phase, TicketPhase::Idle);
            assert!(state.ticket.is_none());
            assert_eq!(state.seed, "100");
        })
        .then_effects(assertions::assert_no_effects)
        .run();
}

#[tokio::test]
async fn purchase_is_journaled_even_when_the_cycle_was_dropped() {
    let chain = MockLotteryChain::new().connected();
    let env = env_on(&chain);
    let reducer = TicketReducer::new();
    let (mut state, ticket_id) = state_with_ticket(TicketPhase::AwaitingPurchase, TicketStatus::Created);

    let effects = reducer.reduce(
        &mut state,
        TicketAction::PriceValidated {
            ticket_id,
            quote: quote(1_000_000_000_000_000),
        },
        &env,
    );
    let Some(Effect::Future(purchase)) = effects.into_iter().next() else {
        panic!("expected the purchase effect");
    };

    reducer.reduce(&mut state, TicketAction::AccountChanged, &env);
    let event = purchase.await.unwrap();
    let TicketAction::PurchaseConfirmed { confirmation, .. } = &event else {
        panic!("expected a confirmation, got {event:?}");
    };
    let purchase_tx = confirmation.tx_id;
    reducer.reduce(&mut state, event, &env);
    assert!(state.ticket.is_none());

    let journal = env.journal();
    let journal = journal.lock().await;
    let pending: Vec<_> = journal
        .unprocessed_for(chain.player(), env.chain_id(), chain.contract())
        .collect();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].seed, "4242");
    assert_eq!(pending[0].quantity, 3);
    assert_eq!(pending[0].purchase_tx, purchase_tx);
}

#[test]
fn commands_and_events_are_told_apart() {
    assert!(TicketAction::Redeem.is_command());
    assert!(TicketAction::AccountChanged.is_event());
    let ticket_id = TicketId::new();
    let event = TicketAction::PurchaseFailed {
        ticket_id,
        error: LootError::PriceUnavailable,
    };
    assert!(event.is_event());
    assert_eq!(event.ticket_id(), Some(ticket_id));
}
