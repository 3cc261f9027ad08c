//! Ticket lifecycle controller.
//!
//! The journey of a single ticket is an explicit state machine run by the
//! [`TicketReducer`]; the UI renders [`TicketState`] and sends
//! [`TicketAction`] commands, it never owns the flow itself.
//!
//! # Flow
//!
//! ```text
//! Buy ─▶ PriceOracle::get_for_spending ─▶ PriceValidated
//!                                            │ payment = price × quantity
//!                                            ▼
//!                           ContractGateway::buy_ticket ─▶ PurchaseConfirmed
//!                                                           │
//!                                   AdvanceMaturation ◀─────┘
//!                                            │
//!                                          Redeem ─▶ ContractGateway::redeem ─▶ RedemptionSettled
//!                                                                                   │ matched
//!                                                                                   ▼
//!                                                                   InventoryLedger::append
//! ```
//!
//! Cancellation is only possible before the purchase reaches the wallet.
//! Nothing is retried automatically; `Retry` is an explicit command. Effects
//! record confirmed purchases and redemptions in the pending ticket journal
//! before feeding their event back.

pub mod actions;
pub mod environment;
pub mod reducer;
#[cfg(all(test, feature = "test-utils"))]
mod tests;
pub mod types;

pub use actions::TicketAction;
pub use environment::TicketEnvironment;
pub use reducer::TicketReducer;
pub use types::{ResumePoint, TicketPhase, TicketState};
