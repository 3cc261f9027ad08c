//! Contract gateway: the only place that knows the lottery ABI.
//!
//! Typed operations go in, calldata goes out through the injected
//! [`WalletProvider`] (writes) or [`ChainClient`] (reads), and receipts and
//! logs come back decoded into domain types. Writes are never retried here.
//!
//! Mint events are decoded leniently: every log is tried on its own and
//! anything that is not a clean `minedSuccessfully` for the connected player
//! emitted by the configured contract is skipped.

use crate::error::{ErrorClassifier, LootError, Result};
use crate::providers::{
    CallRequest, ChainClient, ChainFailure, FailureCode, LogEntry, LogFilter, TransactionReceipt,
    TransactionRequest, WalletProvider,
};
use crate::types::{Blueprint, RedemptionResult, Tier, TxId};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolEvent};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

alloy::sol! {
    /// On-chain surface of the Aether Loot lottery
    #[derive(Debug, PartialEq, Eq)]
    interface AetherLoot {
        function addTier(string name, uint256 modulo_target, uint256 rarity) external returns (uint256);
        function addBlueprint(uint256 tier_rarity, string name, uint256 max_supply) external;
        function buyTicket(string seed, uint256 amount) external payable;
        function loot(string seed) external;
        function getTicketPrice() external view returns (uint256);

        event minedSuccessfully(
            address indexed player,
            string name,
            uint256 block_number,
            string tier_name,
            string blueprint_name,
            uint256 rarity
        );
    }
}

pub use AetherLoot::minedSuccessfully as MintEvent;

/// Stream of decoded historical mint events, consumed once
pub type MintEventStream = Pin<Box<dyn Stream<Item = Result<RedemptionResult>> + Send>>;

/// Gas limits attached to each write
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLimits {
    /// `buyTicket`
    pub buy: u64,
    /// `loot`
    pub redeem: u64,
    /// `addTier` / `addBlueprint`
    pub admin: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            buy: 400_000,
            redeem: 600_000,
            admin: 250_000,
        }
    }
}

/// An included write transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTx {
    /// Transaction hash
    pub tx_id: TxId,
    /// Account that signed and paid
    pub from: Address,
    /// Block of inclusion
    pub block_number: u64,
}

/// Typed access to the deployed lottery contract
#[derive(Clone)]
pub struct ContractGateway {
    wallet: Arc<dyn WalletProvider>,
    chain: Arc<dyn ChainClient>,
    contract: Address,
    gas: GasLimits,
}

impl std::fmt::Debug for ContractGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractGateway")
            .field("contract", &self.contract)
            .field("gas", &self.gas)
            .finish_non_exhaustive()
    }
}

impl ContractGateway {
    /// Creates a gateway for the contract deployed at `contract`
    #[must_use]
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        chain: Arc<dyn ChainClient>,
        contract: Address,
        gas: GasLimits,
    ) -> Self {
        Self {
            wallet,
            chain,
            contract,
            gas,
        }
    }

    /// Address of the lottery contract
    #[must_use]
    pub const fn contract_address(&self) -> Address {
        self.contract
    }

    /// Gas limits used for writes
    #[must_use]
    pub const fn gas_limits(&self) -> GasLimits {
        self.gas
    }

    /// Read the per-ticket price in wei
    ///
    /// # Errors
    ///
    /// - [`LootError::NetworkUnavailable`] if the node cannot be reached
    /// - [`LootError::ContractUnreachable`] if nothing answers at the contract address
    #[tracing::instrument(skip(self), fields(contract = %self.contract))]
    pub async fn get_ticket_price(&self) -> Result<U256> {
        let call = AetherLoot::getTicketPriceCall {};
        let output = self
            .chain
            .call(CallRequest {
                to: self.contract,
                data: call.abi_encode().into(),
            })
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure))?;

        if output.is_empty() {
            return Err(LootError::ContractUnreachable(format!(
                "no contract code at {}",
                self.contract
            )));
        }

        let price = AetherLoot::getTicketPriceCall::abi_decode_returns(&output)
            .map_err(|error| LootError::ContractUnreachable(error.to_string()))?;

        tracing::debug!(price_wei = %price, "Ticket price read");
        Ok(price)
    }

    /// Submit a ticket purchase and wait for inclusion
    ///
    /// `payment_wei` is attached as-is; the caller computes it from a validated price.
    ///
    /// # Errors
    ///
    /// - [`LootError::InvalidRequest`] if `quantity` is zero
    /// - [`LootError::UserRejected`], [`LootError::InsufficientFunds`],
    ///   [`LootError::ContractReverted`], [`LootError::NetworkUnavailable`] from the chain
    #[tracing::instrument(skip(self, seed))]
    pub async fn buy_ticket(&self, seed: &str, quantity: u64, payment_wei: U256) -> Result<ConfirmedTx> {
        if quantity == 0 {
            return Err(LootError::InvalidRequest(
                "ticket quantity must be at least 1".to_string(),
            ));
        }

        let call = AetherLoot::buyTicketCall {
            seed: seed.to_string(),
            amount: U256::from(quantity),
        };
        let (from, receipt) = self
            .submit(call.abi_encode().into(), payment_wei, self.gas.buy)
            .await?;

        metrics::counter!("loot.purchases.total").increment(1);
        tracing::info!(tx = %receipt.transaction_hash, block = receipt.block_number, "Ticket purchased");

        Ok(ConfirmedTx {
            tx_id: receipt.transaction_hash,
            from,
            block_number: receipt.block_number,
        })
    }

    /// Redeem a matured ticket and decode its outcome
    ///
    /// A redemption that mints nothing is a success with `matched == false`.
    ///
    /// # Errors
    ///
    /// Same categories as [`ContractGateway::buy_ticket`].
    #[tracing::instrument(skip(self, seed))]
    pub async fn redeem(&self, seed: &str) -> Result<RedemptionResult> {
        let call = AetherLoot::lootCall {
            seed: seed.to_string(),
        };
        let (player, receipt) = self
            .submit(call.abi_encode().into(), U256::ZERO, self.gas.redeem)
            .await?;

        let result = receipt
            .logs
            .iter()
            .enumerate()
            .find_map(|(position, log)| {
                let event = decode_mint_log(self.contract, player, log)?;
                let log_index = log.log_index.unwrap_or(position as u64);
                let block_number = log.block_number.unwrap_or(receipt.block_number);
                Some(matched_result(event, receipt.transaction_hash, block_number, log_index))
            })
            .unwrap_or_else(|| {
                RedemptionResult::unmatched(receipt.transaction_hash, Some(receipt.block_number))
            });

        let matched = if result.matched { "true" } else { "false" };
        metrics::counter!("loot.redemptions.total", "matched" => matched).increment(1);
        tracing::info!(
            tx = %result.tx_id,
            matched = result.matched,
            tier = result.tier_name.as_deref().unwrap_or("-"),
            blueprint = result.blueprint_name.as_deref().unwrap_or("-"),
            "Ticket redeemed"
        );

        Ok(result)
    }

    /// Register a rarity tier (administrative)
    ///
    /// # Errors
    ///
    /// Same categories as [`ContractGateway::buy_ticket`].
    #[tracing::instrument(skip(self, tier), fields(tier = %tier.name))]
    pub async fn add_tier(&self, tier: &Tier) -> Result<ConfirmedTx> {
        let call = AetherLoot::addTierCall {
            name: tier.name.clone(),
            modulo_target: tier.modulo_target,
            rarity: tier.rarity_id,
        };
        let (from, receipt) = self
            .submit(call.abi_encode().into(), U256::ZERO, self.gas.admin)
            .await?;
        Ok(ConfirmedTx {
            tx_id: receipt.transaction_hash,
            from,
            block_number: receipt.block_number,
        })
    }

    /// Register an item blueprint under an existing tier (administrative)
    ///
    /// # Errors
    ///
    /// Same categories as [`ContractGateway::buy_ticket`].
    #[tracing::instrument(skip(self, blueprint), fields(blueprint = %blueprint.name))]
    pub async fn add_blueprint(&self, blueprint: &Blueprint) -> Result<ConfirmedTx> {
        let call = AetherLoot::addBlueprintCall {
            tier_rarity: blueprint.tier_rarity_id,
            name: blueprint.name.clone(),
            max_supply: blueprint.max_supply,
        };
        let (from, receipt) = self
            .submit(call.abi_encode().into(), U256::ZERO, self.gas.admin)
            .await?;
        Ok(ConfirmedTx {
            tx_id: receipt.transaction_hash,
            from,
            block_number: receipt.block_number,
        })
    }

    /// Scan historical mint events for `owner` starting at `from_block`
    ///
    /// The query runs when the stream is first polled. Results come in
    /// ascending chain order; a failed query yields one error and ends.
    #[must_use]
    pub fn query_mint_events(&self, owner: Address, from_block: u64) -> MintEventStream {
        let chain = Arc::clone(&self.chain);
        let contract = self.contract;
        let filter = LogFilter {
            address: contract,
            topics: vec![Some(MintEvent::SIGNATURE_HASH), Some(owner.into_word())],
            from_block,
        };

        Box::pin(async_stream::stream! {
            tracing::debug!(%owner, from_block, "Querying mint events");
            let logs = match chain.get_logs(filter).await {
                Ok(logs) => logs,
                Err(failure) => {
                    yield Err(ErrorClassifier::classify(&failure));
                    return;
                }
            };

            for log in logs {
                let Some(event) = decode_mint_log(contract, owner, &log) else {
                    continue;
                };
                let (Some(tx_id), Some(block_number), Some(log_index)) =
                    (log.transaction_hash, log.block_number, log.log_index)
                else {
                    tracing::debug!("Skipping mint log without position metadata");
                    continue;
                };
                yield Ok(matched_result(event, tx_id, block_number, log_index));
            }
        })
    }

    fn account(&self) -> Result<Address> {
        self.wallet
            .current_account()
            .ok_or_else(|| LootError::InvalidRequest("wallet is not connected".to_string()))
    }

    /// Sign, send and wait for inclusion; returns the signing account with the receipt
    async fn submit(
        &self,
        data: Bytes,
        value: U256,
        gas_limit: u64,
    ) -> Result<(Address, TransactionReceipt)> {
        let from = self.account()?;
        let request = TransactionRequest {
            from,
            to: self.contract,
            data,
            value,
            gas_limit,
        };

        let tx = self
            .wallet
            .sign_and_send(request)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure))?;
        tracing::debug!(%tx, "Transaction submitted");

        let receipt = self
            .chain
            .wait_for_receipt(tx)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure))?;

        if !receipt.status {
            let failure = ChainFailure::with_code(
                FailureCode::CallException,
                format!("transaction {tx} reverted"),
            );
            return Err(ErrorClassifier::classify(&failure));
        }

        Ok((from, receipt))
    }
}

/// Decode one log as a mint event for `player` emitted by `contract`
fn decode_mint_log(contract: Address, player: Address, log: &LogEntry) -> Option<MintEvent> {
    if log.address != contract {
        tracing::debug!(emitter = %log.address, "Skipping log from another contract");
        return None;
    }
    if log.topics.first() != Some(&MintEvent::SIGNATURE_HASH) {
        tracing::debug!("Skipping non-mint log");
        return None;
    }

    match MintEvent::decode_raw_log(log.topics.iter().copied(), &log.data) {
        Ok(event) if event.player == player => Some(event),
        Ok(event) => {
            tracing::debug!(player = %event.player, "Skipping mint for another player");
            None
        },
        Err(error) => {
            metrics::counter!("loot.logs.malformed").increment(1);
            tracing::debug!(%error, "Skipping malformed mint log");
            None
        },
    }
}

fn matched_result(event: MintEvent, tx_id: TxId, block_number: u64, log_index: u64) -> RedemptionResult {
    RedemptionResult {
        matched: true,
        tier_name: Some(event.tier_name),
        blueprint_name: Some(event.blueprint_name),
        item_name: Some(event.name),
        rarity: Some(event.rarity),
        tx_id,
        block_number: Some(block_number),
        log_index: Some(log_index),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn mint_log(contract: Address, player: Address, index: u64) -> LogEntry {
        let event = MintEvent {
            player,
            name: "Aether Blade".to_string(),
            block_number: U256::from(12),
            tier_name: "Rare".to_string(),
            blueprint_name: "Aether Blade".to_string(),
            rarity: U256::from(3),
        };
        let data = event.encode_log_data();
        LogEntry {
            address: contract,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number: Some(12),
            transaction_hash: Some(B256::repeat_byte(5)),
            log_index: Some(index),
        }
    }

    #[test]
    fn decodes_mint_for_connected_player() {
        let contract = Address::repeat_byte(1);
        let player = Address::repeat_byte(2);
        let event = decode_mint_log(contract, player, &mint_log(contract, player, 0)).unwrap();
        assert_eq!(event.tier_name, "Rare");
        assert_eq!(event.blueprint_name, "Aether Blade");
    }

    #[test]
    fn skips_other_players_and_contracts() {
        let contract = Address::repeat_byte(1);
        let player = Address::repeat_byte(2);
        let stranger = Address::repeat_byte(3);

        assert!(decode_mint_log(contract, player, &mint_log(contract, stranger, 0)).is_none());
        assert!(decode_mint_log(contract, player, &mint_log(stranger, player, 0)).is_none());
    }

    #[test]
    fn skips_malformed_payloads() {
        let contract = Address::repeat_byte(1);
        let player = Address::repeat_byte(2);
        let mut log = mint_log(contract, player, 0);
        log.data = Bytes::from_static(&[0xde, 0xad]);
        assert!(decode_mint_log(contract, player, &log).is_none());
    }

    #[test]
    fn buy_calldata_carries_seed_and_quantity() {
        let call = AetherLoot::buyTicketCall {
            seed: "42".to_string(),
            amount: U256::from(3),
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], &AetherLoot::buyTicketCall::SELECTOR);
        let decoded = AetherLoot::buyTicketCall::abi_decode(&encoded).unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn default_gas_limits_match_deployment() {
        let gas = GasLimits::default();
        assert_eq!((gas.buy, gas.redeem, gas.admin), (400_000, 600_000, 250_000));
    }
}
