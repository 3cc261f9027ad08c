//! Wallet capability: accounts, network selection and transaction signing.

use super::chain::{ChainFuture, TransactionRequest};
use crate::types::TxId;
use alloy::primitives::Address;
use tokio::sync::broadcast;

/// Notification pushed by the wallet when the participant changes something
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalletEvent {
    /// The selected account changed; `None` when the wallet disconnected
    AccountsChanged(Option<Address>),
    /// The wallet switched to another chain
    ChainChanged(u64),
}

/// Injected wallet (browser extension, hardware signer, in-memory test wallet)
///
/// Wallets serialize signing themselves, but callers must still keep at most
/// one `sign_and_send` in flight per account.
pub trait WalletProvider: Send + Sync {
    /// Ask the participant to connect and return the selected account
    ///
    /// # Errors
    ///
    /// Returns a [`super::ChainFailure`] if the participant declines or no wallet is present.
    fn connect(&self) -> ChainFuture<'_, Address>;

    /// The currently selected account, if connected
    fn current_account(&self) -> Option<Address>;

    /// The chain the wallet is currently pointed at
    ///
    /// # Errors
    ///
    /// Returns a [`super::ChainFailure`] if the wallet cannot be queried.
    fn chain_id(&self) -> ChainFuture<'_, u64>;

    /// Ask the wallet to switch to `chain_id`
    ///
    /// # Errors
    ///
    /// Returns a [`super::ChainFailure`] if the participant declines or the chain is unknown.
    fn switch_network(&self, chain_id: u64) -> ChainFuture<'_, ()>;

    /// Sign and broadcast a transaction, returning its hash without waiting for inclusion
    ///
    /// # Errors
    ///
    /// Returns a [`super::ChainFailure`] if signing is declined or broadcast fails.
    fn sign_and_send(&self, request: TransactionRequest) -> ChainFuture<'_, TxId>;

    /// Subscribe to account and network change notifications
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}
