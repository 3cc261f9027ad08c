//! Raw chain access: read calls, receipts and log queries.

use crate::types::TxId;
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by chain and wallet providers
pub type ChainFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChainFailure>> + Send + 'a>>;

/// A read-only contract call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    /// Contract address
    pub to: Address,
    /// ABI-encoded calldata
    pub data: Bytes,
}

/// A transaction handed to the wallet for signing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sender
    pub from: Address,
    /// Contract address
    pub to: Address,
    /// ABI-encoded calldata
    pub data: Bytes,
    /// Attached value in wei
    pub value: U256,
    /// Gas limit
    pub gas_limit: u64,
}

/// A log as delivered by the node, with its position metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics, topic0 first
    pub topics: Vec<B256>,
    /// Non-indexed data
    pub data: Bytes,
    /// Block the log was included in
    pub block_number: Option<u64>,
    /// Transaction that emitted the log
    pub transaction_hash: Option<TxId>,
    /// Index of the log in its block
    pub log_index: Option<u64>,
}

/// Filter for a historical log query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    /// Emitting contract
    pub address: Address,
    /// Topic constraints by position; `None` matches anything
    pub topics: Vec<Option<B256>>,
    /// First block to scan (inclusive)
    pub from_block: u64,
}

impl LogFilter {
    /// Whether a log satisfies this filter
    #[must_use]
    pub fn matches(&self, log: &LogEntry) -> bool {
        if log.address != self.address {
            return false;
        }
        if log.block_number.is_some_and(|block| block < self.from_block) {
            return false;
        }
        self.topics.iter().enumerate().all(|(position, wanted)| match wanted {
            None => true,
            Some(topic) => log.topics.get(position) == Some(topic),
        })
    }
}

/// Receipt of an included transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Transaction hash
    pub transaction_hash: TxId,
    /// Block of inclusion
    pub block_number: u64,
    /// `true` when execution succeeded, `false` when it reverted
    pub status: bool,
    /// Logs emitted by the transaction
    pub logs: Vec<LogEntry>,
}

/// Structured failure code reported by wallets and providers
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureCode {
    /// The participant declined to sign
    ActionRejected,
    /// The account cannot cover value plus gas
    InsufficientFunds,
    /// Execution reverted
    CallException,
    /// The node could not be reached
    NetworkError,
    /// The request timed out
    Timeout,
    /// The node answered with an internal error
    ServerError,
    /// The response could not be decoded (e.g. no contract at the address)
    BadData,
    /// Any other provider code, kept verbatim
    Other(String),
}

impl FailureCode {
    /// Parses a provider code such as `ACTION_REJECTED`
    #[must_use]
    pub fn parse(code: &str) -> Self {
        match code {
            "ACTION_REJECTED" => Self::ActionRejected,
            "INSUFFICIENT_FUNDS" => Self::InsufficientFunds,
            "CALL_EXCEPTION" => Self::CallException,
            "NETWORK_ERROR" => Self::NetworkError,
            "TIMEOUT" => Self::Timeout,
            "SERVER_ERROR" => Self::ServerError,
            "BAD_DATA" => Self::BadData,
            other => Self::Other(other.to_string()),
        }
    }

    /// The provider spelling of this code
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ActionRejected => "ACTION_REJECTED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::CallException => "CALL_EXCEPTION",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::ServerError => "SERVER_ERROR",
            Self::BadData => "BAD_DATA",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw failure from a chain client or wallet, before classification
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ChainFailure {
    /// Structured provider code
    pub code: Option<FailureCode>,
    /// JSON-RPC / EIP-1193 numeric code
    pub rpc_code: Option<i64>,
    /// Human-readable reason (e.g. a revert string)
    pub reason: Option<String>,
    /// Generic message
    pub message: String,
    /// Amount the operation needed, when known
    pub required: Option<U256>,
    /// Amount the account holds, when known
    pub available: Option<U256>,
}

impl ChainFailure {
    /// A failure with only a generic message
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// A failure with a structured code
    #[must_use]
    pub fn with_code(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a human-readable reason
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach a numeric RPC code
    #[must_use]
    pub const fn rpc_code(mut self, code: i64) -> Self {
        self.rpc_code = Some(code);
        self
    }

    /// Attach required vs. available amounts
    #[must_use]
    pub const fn amounts(mut self, required: U256, available: U256) -> Self {
        self.required = Some(required);
        self.available = Some(available);
        self
    }
}

impl fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.reason) {
            (Some(code), Some(reason)) => write!(f, "{code}: {reason}"),
            (Some(code), None) => write!(f, "{code}: {}", self.message),
            (None, Some(reason)) => f.write_str(reason),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ChainFailure {}

/// Raw RPC access to the chain the lottery contract lives on
///
/// Implementations must not retry writes; this trait has none. Reads may be
/// served from any node.
pub trait ChainClient: Send + Sync {
    /// Execute a read-only call and return the raw return data
    ///
    /// # Errors
    ///
    /// Returns a [`ChainFailure`] if the node is unreachable or the call reverts.
    fn call(&self, request: CallRequest) -> ChainFuture<'_, Bytes>;

    /// Wait until a transaction is included and return its receipt
    ///
    /// # Errors
    ///
    /// Returns a [`ChainFailure`] if the node is unreachable.
    fn wait_for_receipt(&self, tx: TxId) -> ChainFuture<'_, TransactionReceipt>;

    /// Return all logs matching a filter, in ascending ledger order
    ///
    /// # Errors
    ///
    /// Returns a [`ChainFailure`] if the node is unreachable.
    fn get_logs(&self, filter: LogFilter) -> ChainFuture<'_, Vec<LogEntry>>;
}
