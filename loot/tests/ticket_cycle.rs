//! End-to-end ticket cycles through a `LootSession` on the in-memory chain
//!
//! Covers pricing, purchase, redemption and inventory bookkeeping as a UI
//! would drive them.

#![cfg(feature = "test-utils")]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use aetherloot::lifecycle::ResumePoint;
use aetherloot::mocks::{LootOutcome, MockLotteryChain, MockOperation, SequentialSeeds};
use aetherloot::providers::{ChainFailure, FailureCode};
use aetherloot::{
    LootConfig, LootError, LootSession, PendingTickets, SessionError, TicketPhase, TicketStatus,
};
use aetherloot_testing::test_clock;
use alloy::primitives::U256;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

fn session_on(chain: &MockLotteryChain) -> LootSession {
    LootSession::with_parts(
        LootConfig::default(),
        Arc::new(chain.clone()),
        Arc::new(chain.clone()),
        Arc::new(test_clock()),
        Arc::new(SequentialSeeds::starting_at(1)),
        PendingTickets::in_memory(),
    )
}

async fn connected_session(chain: &MockLotteryChain) -> LootSession {
    let session = session_on(chain);
    session.connect().await.unwrap();
    session
}

fn loots_sent(chain: &MockLotteryChain, session: &LootSession) -> usize {
    let redeem_gas = session.gateway().gas_limits().redeem;
    chain
        .sent_transactions()
        .iter()
        .filter(|tx| tx.gas_limit == redeem_gas)
        .count()
}

fn network_down() -> ChainFailure {
    ChainFailure::with_code(FailureCode::NetworkError, "could not detect network")
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn payment_is_price_times_quantity() {
    let chain = MockLotteryChain::new().with_price(U256::from(1000));
    let session = connected_session(&chain).await;

    let state = session.buy("seed-a", 3).await.unwrap();

    let ticket = state.ticket.unwrap();
    assert_eq!(ticket.payment_wei, Some(U256::from(3000)));
    assert_eq!(ticket.status, TicketStatus::Confirmed);
    assert_eq!(state.phase, TicketPhase::PendingMaturation);

    let sent = chain.sent_transactions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].value, U256::from(3000));
}

#[tokio::test]
async fn redemption_without_mint_settles_unmatched() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;

    session.buy("seed-b", 1).await.unwrap();
    session.advance().await.unwrap();
    chain.script_outcome(LootOutcome::Nothing);
    let state = session.redeem().await.unwrap();

    assert_eq!(state.phase, TicketPhase::Settled);
    let result = state.last_result.unwrap();
    assert!(!result.matched);
    assert!(session.inventory().await.is_empty());
}

#[tokio::test]
async fn matching_mint_lands_in_inventory_once() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;

    session.buy("seed-c", 1).await.unwrap();
    session.advance().await.unwrap();
    chain.script_outcome(LootOutcome::mint("Rare", "Aether Blade"));
    let state = session.redeem().await.unwrap();

    let result = state.last_result.unwrap();
    assert!(result.matched);

    let items = session.inventory().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].tier_name, "Rare");
    assert_eq!(items[0].blueprint_name, "Aether Blade");
    assert_eq!(Some(items[0].mint_id), result.mint_id());

    assert!(!session.ledger().append(&result).await);
    assert_eq!(session.inventory().await, items);
}

#[tokio::test]
async fn declined_signature_keeps_the_draft() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;
    let balance = chain.balance();

    chain.reject_next_signature();
    let err = session.buy("seed-d", 2).await.unwrap_err();
    assert!(matches!(err, SessionError::Loot(LootError::UserRejected)));

    let state = session.snapshot().await;
    assert_eq!(
        state.phase,
        TicketPhase::Failed {
            error: LootError::UserRejected,
            resume: ResumePoint::Idle,
        }
    );
    assert_eq!(state.seed, "seed-d");
    assert_eq!(state.quantity, 2);
    assert!(chain.sent_transactions().is_empty());
    assert_eq!(chain.balance(), balance);

    let state = session.retry().await.unwrap();
    assert_eq!(state.phase, TicketPhase::Idle);
    let state = session.buy(state.seed.clone(), state.quantity).await.unwrap();
    assert_eq!(state.phase, TicketPhase::PendingMaturation);
}

#[tokio::test]
async fn price_outage_never_reaches_the_wallet() {
    let chain = MockLotteryChain::new().connected();
    let session = session_on(&chain);
    chain.fail_next(MockOperation::Call, network_down());
    chain.fail_next(MockOperation::Call, network_down());

    for _ in 0..2 {
        let err = session.buy("seed-e", 1).await.unwrap_err();
        assert!(
            matches!(err, SessionError::Loot(LootError::NetworkUnavailable(_))),
            "unexpected error: {err}"
        );
    }

    assert_eq!(chain.price_reads(), 2);
    assert!(chain.sent_transactions().is_empty());
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn zero_price_is_refetched_once_then_refused() {
    let chain = MockLotteryChain::new().connected().with_price(U256::ZERO);
    let session = session_on(&chain);

    let err = session.buy("seed-z", 1).await.unwrap_err();

    assert!(matches!(err, SessionError::Loot(LootError::PriceUnavailable)));
    assert_eq!(chain.price_reads(), 1);
    assert!(chain.sent_transactions().is_empty());
}

#[tokio::test]
async fn mint_for_another_player_is_not_owned() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;

    session.buy("seed-f", 1).await.unwrap();
    session.advance().await.unwrap();
    chain.script_outcome(LootOutcome::MintForOther(alloy::primitives::Address::repeat_byte(0xbb)));
    let state = session.redeem().await.unwrap();

    assert_eq!(state.phase, TicketPhase::Settled);
    assert!(!state.last_result.unwrap().matched);
    assert!(session.inventory().await.is_empty());
}

#[tokio::test]
async fn second_redeem_is_refused() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;

    session.buy("seed-g", 1).await.unwrap();
    session.advance().await.unwrap();
    session.redeem().await.unwrap();

    let err = session.redeem().await.unwrap_err();
    assert!(matches!(err, SessionError::Rejected(_)));
    assert_eq!(loots_sent(&chain, &session), 1);
}

#[tokio::test]
async fn current_ticket_is_not_redeemed_through_the_journal() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;

    let bought = session.buy("held", 1).await.unwrap();
    let purchase_tx = bought.ticket.unwrap().purchase_tx.unwrap();
    session.advance().await.unwrap();

    let err = session.redeem_pending(purchase_tx).await.unwrap_err();
    assert!(matches!(err, SessionError::Rejected(_)), "unexpected: {err}");
    assert_eq!(loots_sent(&chain, &session), 0);

    chain.script_outcome(LootOutcome::mint("Rare", "Aether Blade"));
    let state = session.redeem().await.unwrap();
    assert!(state.last_result.unwrap().matched);
    assert_eq!(loots_sent(&chain, &session), 1);
    assert!(session.pending_tickets().await.is_empty());
}

#[tokio::test]
async fn slow_receipt_is_waited_for() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;
    chain.delay_receipts(Duration::from_millis(300));

    let state = session.buy("patient", 1).await.unwrap();

    assert_eq!(state.phase, TicketPhase::PendingMaturation);
    assert_eq!(session.pending_tickets().await.len(), 1);
}

#[tokio::test]
async fn caller_deadline_does_not_orphan_the_purchase() {
    let chain = MockLotteryChain::new();
    let session = connected_session(&chain).await;
    chain.delay_receipts(Duration::from_millis(200));

    let gave_up = tokio::time::timeout(Duration::from_millis(50), session.buy("impatient", 1)).await;
    assert!(gave_up.is_err());
    assert!(session.pending_tickets().await.is_empty());

    tokio::time::timeout(Duration::from_secs(2), async {
        while session.snapshot().await.phase != TicketPhase::PendingMaturation {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let pending = session.pending_tickets().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].seed, "impatient");
    assert_eq!(chain.sent_transactions().len(), 1);
}

#[tokio::test]
async fn inventory_listing_is_stable() {
    let chain = MockLotteryChain::new();
    chain.preload_mint(chain.player(), "Common", "Copper Ring");
    chain.preload_mint(chain.player(), "Rare", "Aether Blade");
    let session = connected_session(&chain).await;

    let first = session.inventory().await;
    let second = session.inventory().await;

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(first[0].blueprint_name, "Aether Blade");
}

#[tokio::test]
async fn connect_switches_to_configured_network() {
    let chain = MockLotteryChain::new().with_chain_id(1);
    let session = connected_session(&chain).await;

    assert_eq!(session.account().await, Some(chain.player()));
    assert!(session.display_price().await.is_some());
    assert_eq!(
        chain.sent_transactions().len(),
        0,
        "connecting must not send anything"
    );
}
