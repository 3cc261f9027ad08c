//! In-memory lottery contract, node and wallet.

use crate::config::{DEFAULT_CHAIN_ID, DEFAULT_CONTRACT_ADDRESS};
use crate::gateway::{AetherLoot, ContractGateway, GasLimits, MintEvent};
use crate::providers::{
    CallRequest, ChainClient, ChainFailure, ChainFuture, FailureCode, LogEntry, LogFilter,
    TransactionReceipt, TransactionRequest, WalletEvent, WalletProvider,
};
use crate::types::{Blueprint, Tier, TxId};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolEvent, SolInterface, SolValue};
use std::collections::{HashMap, VecDeque};
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// First block of a fresh mock chain
const START_BLOCK: u64 = 100;

/// Default ticket price: 0.001 ether
const DEFAULT_PRICE_WEI: u64 = 1_000_000_000_000_000;

/// Operations whose next call can be scripted to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `WalletProvider::connect`
    Connect,
    /// `WalletProvider::switch_network`
    SwitchNetwork,
    /// `WalletProvider::sign_and_send`
    SignAndSend,
    /// `ChainClient::wait_for_receipt`
    Receipt,
    /// `ChainClient::call`
    Call,
    /// `ChainClient::get_logs`
    GetLogs,
}

/// What the next `loot` call emits
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LootOutcome {
    /// A mint for the redeeming player
    Mint {
        /// Tier name in the event
        tier_name: String,
        /// Blueprint name in the event
        blueprint_name: String,
    },
    /// A mint event naming another player
    MintForOther(Address),
    /// No mint
    Nothing,
}

impl LootOutcome {
    /// A mint for the redeeming player
    #[must_use]
    pub fn mint(tier_name: impl Into<String>, blueprint_name: impl Into<String>) -> Self {
        Self::Mint {
            tier_name: tier_name.into(),
            blueprint_name: blueprint_name.into(),
        }
    }
}

#[derive(Debug)]
struct MockTicket {
    owner: Address,
    block: u64,
    redeemed: bool,
}

#[derive(Debug)]
struct ChainState {
    contract: Address,
    chain_id: u64,
    player: Address,
    account: Option<Address>,
    balance: U256,
    price: U256,
    deployed: bool,
    block: u64,
    tx_count: u64,
    receipts: HashMap<TxId, TransactionReceipt>,
    logs: Vec<LogEntry>,
    tickets: HashMap<String, MockTicket>,
    tiers: Vec<Tier>,
    blueprints: Vec<Blueprint>,
    outcomes: VecDeque<LootOutcome>,
    failures: HashMap<MockOperation, VecDeque<ChainFailure>>,
    revert_on_inclusion: bool,
    sent: Vec<TransactionRequest>,
    price_reads: usize,
    receipt_delay: Option<Duration>,
}

impl ChainState {
    fn take_failure(&mut self, operation: MockOperation) -> Option<ChainFailure> {
        self.failures.get_mut(&operation).and_then(VecDeque::pop_front)
    }

    /// Include a transaction in a new block and return its hash
    fn mine(&mut self, status: bool, logs: Vec<(Address, Vec<B256>, Bytes)>) -> TxId {
        self.block += 1;
        self.tx_count += 1;
        let tx = keccak256([self.tx_count.to_be_bytes(), self.block.to_be_bytes()].concat());

        let logs: Vec<LogEntry> = logs
            .into_iter()
            .enumerate()
            .map(|(index, (address, topics, data))| LogEntry {
                address,
                topics,
                data,
                block_number: Some(self.block),
                transaction_hash: Some(tx),
                log_index: Some(index as u64),
            })
            .collect();

        if status {
            self.logs.extend(logs.iter().cloned());
        }
        self.receipts.insert(
            tx,
            TransactionReceipt {
                transaction_hash: tx,
                block_number: self.block,
                status,
                logs: if status { logs } else { Vec::new() },
            },
        );
        tx
    }

    fn mint_log(&self, player: Address, tier_name: String, blueprint_name: String) -> (Address, Vec<B256>, Bytes) {
        let rarity = self
            .tiers
            .iter()
            .find(|tier| tier.name == tier_name)
            .map_or(U256::from(1), |tier| tier.rarity_id);
        let event = MintEvent {
            player,
            name: blueprint_name.clone(),
            block_number: U256::from(self.block + 1),
            tier_name,
            blueprint_name,
            rarity,
        };
        let data = event.encode_log_data();
        (self.contract, data.topics().to_vec(), data.data)
    }

    /// A log the contract emits on every redemption, unrelated to minting
    fn consumed_log(&self, player: Address) -> (Address, Vec<B256>, Bytes) {
        (
            self.contract,
            vec![keccak256("TicketConsumed(address)"), player.into_word()],
            Bytes::new(),
        )
    }

    fn execute(&mut self, request: &TransactionRequest) -> Result<Vec<(Address, Vec<B256>, Bytes)>, ChainFailure> {
        let call = AetherLoot::AetherLootCalls::abi_decode(&request.data).map_err(|_| {
            revert("function selector was not recognized")
        })?;

        match call {
            AetherLoot::AetherLootCalls::buyTicket(buy) => {
                if buy.amount.is_zero() {
                    return Err(revert("Amount must be greater than zero"));
                }
                let expected = self.price.checked_mul(buy.amount).unwrap_or(U256::MAX);
                if request.value != expected {
                    return Err(revert("Incorrect ETH amount sent"));
                }
                self.balance -= request.value;
                self.tickets.insert(
                    buy.seed,
                    MockTicket {
                        owner: request.from,
                        block: self.block + 1,
                        redeemed: false,
                    },
                );
                Ok(Vec::new())
            },
            AetherLoot::AetherLootCalls::loot(loot) => {
                let next_block = self.block + 1;
                let ticket = self
                    .tickets
                    .get_mut(&loot.seed)
                    .filter(|ticket| ticket.owner == request.from)
                    .ok_or_else(|| revert("No ticket for this seed"))?;
                if ticket.redeemed {
                    return Err(revert("Ticket already redeemed"));
                }
                if next_block <= ticket.block {
                    return Err(revert("Ticket not mature yet"));
                }
                ticket.redeemed = true;

                let mut logs = vec![self.consumed_log(request.from)];
                match self.outcomes.pop_front().unwrap_or(LootOutcome::Nothing) {
                    LootOutcome::Mint {
                        tier_name,
                        blueprint_name,
                    } => logs.push(self.mint_log(request.from, tier_name, blueprint_name)),
                    LootOutcome::MintForOther(other) => {
                        logs.push(self.mint_log(other, "Rare".to_string(), "Aether Blade".to_string()));
                    },
                    LootOutcome::Nothing => {},
                }
                Ok(logs)
            },
            AetherLoot::AetherLootCalls::addTier(tier) => {
                self.tiers.push(Tier {
                    name: tier.name,
                    modulo_target: tier.modulo_target,
                    rarity_id: tier.rarity,
                });
                Ok(Vec::new())
            },
            AetherLoot::AetherLootCalls::addBlueprint(blueprint) => {
                if !self.tiers.iter().any(|tier| tier.rarity_id == blueprint.tier_rarity) {
                    return Err(revert("Tier does not exist"));
                }
                self.blueprints.push(Blueprint {
                    tier_rarity_id: blueprint.tier_rarity,
                    name: blueprint.name,
                    max_supply: blueprint.max_supply,
                });
                Ok(Vec::new())
            },
            AetherLoot::AetherLootCalls::getTicketPrice(_) => Ok(Vec::new()),
        }
    }
}

fn revert(reason: &str) -> ChainFailure {
    ChainFailure::with_code(FailureCode::CallException, "execution reverted").reason(reason)
}

/// In-memory lottery chain implementing both [`ChainClient`] and [`WalletProvider`]
///
/// Simulates the contract well enough to drive the full ticket lifecycle:
/// exact payment checks, one redemption per seed, scripted mint outcomes and
/// scripted failures for any operation.
///
/// Clones share the same chain.
#[derive(Clone)]
pub struct MockLotteryChain {
    state: Arc<Mutex<ChainState>>,
    events: broadcast::Sender<WalletEvent>,
}

impl MockLotteryChain {
    /// A deployed contract with the default price and a disconnected wallet
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Arc::new(Mutex::new(ChainState {
                contract: DEFAULT_CONTRACT_ADDRESS,
                chain_id: DEFAULT_CHAIN_ID,
                player: Address::repeat_byte(0xa1),
                account: None,
                balance: U256::from(10u64).pow(U256::from(18u64)),
                price: U256::from(DEFAULT_PRICE_WEI),
                deployed: true,
                block: START_BLOCK,
                tx_count: 0,
                receipts: HashMap::new(),
                logs: Vec::new(),
                tickets: HashMap::new(),
                tiers: Vec::new(),
                blueprints: Vec::new(),
                outcomes: VecDeque::new(),
                failures: HashMap::new(),
                revert_on_inclusion: false,
                sent: Vec::new(),
                price_reads: 0,
                receipt_delay: None,
            })),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the ticket price
    #[must_use]
    pub fn with_price(self, price: U256) -> Self {
        self.set_price(price);
        self
    }

    /// Set the player's balance
    #[must_use]
    pub fn with_balance(self, balance: U256) -> Self {
        self.lock().balance = balance;
        self
    }

    /// Start the wallet on another chain
    #[must_use]
    pub fn with_chain_id(self, chain_id: u64) -> Self {
        self.lock().chain_id = chain_id;
        self
    }

    /// No code at the contract address
    #[must_use]
    pub fn undeployed(self) -> Self {
        self.lock().deployed = false;
        self
    }

    /// Wallet already connected to the default player
    #[must_use]
    pub fn connected(self) -> Self {
        {
            let mut state = self.lock();
            state.account = Some(state.player);
        }
        self
    }

    /// A gateway talking to this chain at the mock contract address
    #[must_use]
    pub fn gateway(&self) -> ContractGateway {
        let chain = Arc::new(self.clone());
        ContractGateway::new(
            Arc::clone(&chain) as Arc<dyn WalletProvider>,
            chain,
            self.contract(),
            GasLimits::default(),
        )
    }

    /// The account `connect` selects
    #[must_use]
    pub fn player(&self) -> Address {
        self.lock().player
    }

    /// Address of the simulated contract
    #[must_use]
    pub fn contract(&self) -> Address {
        self.lock().contract
    }

    /// Current ticket price
    #[must_use]
    pub fn price(&self) -> U256 {
        self.lock().price
    }

    /// Change the ticket price
    pub fn set_price(&self, price: U256) {
        self.lock().price = price;
    }

    /// Player balance
    #[must_use]
    pub fn balance(&self) -> U256 {
        self.lock().balance
    }

    /// Latest block
    #[must_use]
    pub fn block_number(&self) -> u64 {
        self.lock().block
    }

    /// Mine `count` empty blocks
    pub fn mine_blocks(&self, count: u64) {
        self.lock().block += count;
    }

    /// Number of `getTicketPrice` reads so far, failed ones included
    #[must_use]
    pub fn price_reads(&self) -> usize {
        self.lock().price_reads
    }

    /// Every transaction handed to the wallet, in order
    #[must_use]
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.lock().sent.clone()
    }

    /// Registered tiers
    #[must_use]
    pub fn tiers(&self) -> Vec<Tier> {
        self.lock().tiers.clone()
    }

    /// Registered blueprints
    #[must_use]
    pub fn blueprints(&self) -> Vec<Blueprint> {
        self.lock().blueprints.clone()
    }

    /// Make the next call of `operation` fail with `failure`
    pub fn fail_next(&self, operation: MockOperation, failure: ChainFailure) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Make the next signing request be declined by the participant
    pub fn reject_next_signature(&self) {
        self.fail_next(
            MockOperation::SignAndSend,
            ChainFailure::with_code(FailureCode::ActionRejected, "user rejected transaction")
                .rpc_code(4001),
        );
    }

    /// Include the next transaction with a failed status
    pub fn revert_next_inclusion(&self) {
        self.lock().revert_on_inclusion = true;
    }

    /// Hold every receipt back for `delay` before returning it
    pub fn delay_receipts(&self, delay: Duration) {
        self.lock().receipt_delay = Some(delay);
    }

    /// Queue the outcome of the next `loot`
    pub fn script_outcome(&self, outcome: LootOutcome) {
        self.lock().outcomes.push_back(outcome);
    }

    /// Put a historical mint for `player` on chain
    pub fn preload_mint(&self, player: Address, tier_name: &str, blueprint_name: &str) -> TxId {
        let mut state = self.lock();
        let log = state.mint_log(player, tier_name.to_string(), blueprint_name.to_string());
        state.mine(true, vec![log])
    }

    /// Switch the wallet account and notify subscribers
    pub fn switch_account(&self, account: Option<Address>) {
        {
            let mut state = self.lock();
            state.account = account;
            if let Some(account) = account {
                state.player = account;
            }
        }
        let _ = self.events.send(WalletEvent::AccountsChanged(account));
    }

    /// Switch the wallet chain and notify subscribers
    pub fn change_chain(&self, chain_id: u64) {
        self.lock().chain_id = chain_id;
        let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
    }

    fn send_transaction(&self, request: TransactionRequest) -> Result<TxId, ChainFailure> {
        let mut state = self.lock();
        if let Some(failure) = state.take_failure(MockOperation::SignAndSend) {
            return Err(failure);
        }
        if state.account != Some(request.from) {
            return Err(ChainFailure::message("the requested account has not been authorized").rpc_code(4100));
        }
        if request.to != state.contract {
            return Err(ChainFailure::with_code(FailureCode::BadData, "no contract at target address"));
        }
        if request.value > state.balance {
            return Err(ChainFailure::with_code(
                FailureCode::InsufficientFunds,
                "insufficient funds for intrinsic transaction cost",
            )
            .amounts(request.value, state.balance));
        }

        state.sent.push(request.clone());
        if std::mem::take(&mut state.revert_on_inclusion) {
            return Ok(state.mine(false, Vec::new()));
        }

        let logs = state.execute(&request)?;
        Ok(state.mine(true, logs))
    }

    fn read(&self, request: &CallRequest) -> Result<Bytes, ChainFailure> {
        let mut state = self.lock();
        let is_price_read = request.data.starts_with(&AetherLoot::getTicketPriceCall::SELECTOR);
        if is_price_read {
            state.price_reads += 1;
        }
        if let Some(failure) = state.take_failure(MockOperation::Call) {
            return Err(failure);
        }
        if !state.deployed || request.to != state.contract {
            return Ok(Bytes::new());
        }
        if is_price_read {
            Ok(state.price.abi_encode().into())
        } else {
            Err(revert("function selector was not recognized"))
        }
    }
}

impl Default for MockLotteryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockLotteryChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MockLotteryChain")
            .field("chain_id", &state.chain_id)
            .field("block", &state.block)
            .field("account", &state.account)
            .finish_non_exhaustive()
    }
}

impl ChainClient for MockLotteryChain {
    fn call(&self, request: CallRequest) -> ChainFuture<'_, Bytes> {
        Box::pin(ready(self.read(&request)))
    }

    fn wait_for_receipt(&self, tx: TxId) -> ChainFuture<'_, TransactionReceipt> {
        let mut state = self.lock();
        let result = match state.take_failure(MockOperation::Receipt) {
            Some(failure) => Err(failure),
            None => state.receipts.get(&tx).cloned().ok_or_else(|| {
                ChainFailure::with_code(FailureCode::Timeout, format!("transaction {tx} not found"))
            }),
        };
        match state.receipt_delay {
            Some(delay) => Box::pin(async move {
                tokio::time::sleep(delay).await;
                result
            }),
            None => Box::pin(ready(result)),
        }
    }

    fn get_logs(&self, filter: LogFilter) -> ChainFuture<'_, Vec<LogEntry>> {
        let mut state = self.lock();
        let result = match state.take_failure(MockOperation::GetLogs) {
            Some(failure) => Err(failure),
            None => Ok(state
                .logs
                .iter()
                .filter(|log| filter.matches(log))
                .cloned()
                .collect()),
        };
        Box::pin(ready(result))
    }
}

impl WalletProvider for MockLotteryChain {
    fn connect(&self) -> ChainFuture<'_, Address> {
        let mut state = self.lock();
        let result = match state.take_failure(MockOperation::Connect) {
            Some(failure) => Err(failure),
            None => {
                state.account = Some(state.player);
                Ok(state.player)
            },
        };
        Box::pin(ready(result))
    }

    fn current_account(&self) -> Option<Address> {
        self.lock().account
    }

    fn chain_id(&self) -> ChainFuture<'_, u64> {
        Box::pin(ready(Ok(self.lock().chain_id)))
    }

    fn switch_network(&self, chain_id: u64) -> ChainFuture<'_, ()> {
        let result = {
            let mut state = self.lock();
            match state.take_failure(MockOperation::SwitchNetwork) {
                Some(failure) => Err(failure),
                None => {
                    let changed = state.chain_id != chain_id;
                    state.chain_id = chain_id;
                    Ok(changed)
                },
            }
        };
        let result = result.map(|changed| {
            if changed {
                let _ = self.events.send(WalletEvent::ChainChanged(chain_id));
            }
        });
        Box::pin(ready(result))
    }

    fn sign_and_send(&self, request: TransactionRequest) -> ChainFuture<'_, TxId> {
        Box::pin(ready(self.send_transaction(request)))
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn purchase_requires_exact_payment() {
        let chain = MockLotteryChain::new().connected().with_price(U256::from(1000));
        let gateway = chain.gateway();

        let error = gateway
            .buy_ticket("1", 3, U256::from(2999))
            .await
            .unwrap_err();
        assert_eq!(
            error,
            crate::error::LootError::ContractReverted("Incorrect ETH amount sent".to_string())
        );

        gateway.buy_ticket("1", 3, U256::from(3000)).await.unwrap();
        assert_eq!(chain.sent_transactions().len(), 2);
    }

    #[tokio::test]
    async fn seed_is_redeemable_once() {
        let chain = MockLotteryChain::new().connected();
        let gateway = chain.gateway();
        gateway.buy_ticket("9", 1, chain.price()).await.unwrap();

        gateway.redeem("9").await.unwrap();
        let error = gateway.redeem("9").await.unwrap_err();
        assert_eq!(
            error,
            crate::error::LootError::ContractReverted("Ticket already redeemed".to_string())
        );
    }

    #[tokio::test]
    async fn switching_network_notifies_subscribers() {
        let chain = MockLotteryChain::new();
        let mut events = chain.subscribe();
        chain.switch_network(1).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), WalletEvent::ChainChanged(1));
        assert_eq!(chain.chain_id().await.unwrap(), 1);
    }
}
