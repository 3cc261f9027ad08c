//! Error taxonomy for the lottery client and the classifier that produces it.
//!
//! Every failure surfaced by a [`ChainClient`](crate::providers::ChainClient)
//! or [`WalletProvider`](crate::providers::WalletProvider) is mapped into a
//! [`LootError`] before it reaches a caller. Classification looks at the
//! structured code first, then the numeric RPC code, then the reason string,
//! and finally the generic message. It never makes up a reason.

use crate::providers::{ChainFailure, FailureCode};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-1193 "user rejected request"
const RPC_USER_REJECTED: i64 = 4001;
/// EIP-1474 "execution reverted"
const RPC_EXECUTION_REVERTED: i64 = 3;
/// EIP-1193 "disconnected" / "chain disconnected"
const RPC_DISCONNECTED: [i64; 2] = [4900, 4901];
/// EIP-1474 "limit exceeded" / "resource unavailable"
const RPC_UNAVAILABLE: [i64; 2] = [-32005, -32002];

/// Fallback text when a failure carries no message at all
const GENERIC_FAILURE: &str = "chain request failed";

/// Result alias for lottery operations
pub type Result<T> = std::result::Result<T, LootError>;

/// Classified failure of a lottery operation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LootError {
    /// The participant declined to sign
    #[error("Transaction was rejected by the wallet")]
    UserRejected,

    /// The account cannot cover the payment plus gas
    #[error("Insufficient funds{}", format_amounts(.required.as_ref(), .available.as_ref()))]
    InsufficientFunds {
        /// Amount needed, when the wallet reported it
        required: Option<U256>,
        /// Amount held, when the wallet reported it
        available: Option<U256>,
    },

    /// The contract reverted; the reason is propagated unmodified
    #[error("Contract reverted: {0}")]
    ContractReverted(String),

    /// No contract answered at the configured address
    #[error("Contract unreachable: {0}")]
    ContractUnreachable(String),

    /// The node could not be reached; the same call may be retried
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// No validated ticket price could be obtained; purchases must not proceed
    #[error("Ticket price unavailable")]
    PriceUnavailable,

    /// The caller broke a precondition (e.g. zero quantity)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Anything that could not be classified
    #[error("{0}")]
    Unknown(String),
}

impl LootError {
    /// Whether the same call may be retried as-is
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_))
    }

    /// Short stable label for logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UserRejected => "user_rejected",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::ContractReverted(_) => "contract_reverted",
            Self::ContractUnreachable(_) => "contract_unreachable",
            Self::NetworkUnavailable(_) => "network_unavailable",
            Self::PriceUnavailable => "price_unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unknown(_) => "unknown",
        }
    }
}

fn format_amounts(required: Option<&U256>, available: Option<&U256>) -> String {
    match (required, available) {
        (Some(required), Some(available)) => {
            format!(" (required {required} wei, available {available} wei)")
        },
        (Some(required), None) => format!(" (required {required} wei)"),
        (None, Some(available)) => format!(" (available {available} wei)"),
        (None, None) => String::new(),
    }
}

/// Maps raw chain/wallet failures into [`LootError`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a raw failure
    #[must_use]
    pub fn classify(failure: &ChainFailure) -> LootError {
        if let Some(error) = failure.code.as_ref().and_then(|code| Self::from_code(code, failure)) {
            return error;
        }
        if let Some(error) = failure.rpc_code.and_then(|code| Self::from_rpc_code(code, failure)) {
            return error;
        }
        if let Some(reason) = failure.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            return Self::from_reason(reason, failure);
        }
        Self::from_message(failure)
    }

    fn from_code(code: &FailureCode, failure: &ChainFailure) -> Option<LootError> {
        match code {
            FailureCode::ActionRejected => Some(LootError::UserRejected),
            FailureCode::InsufficientFunds => Some(Self::insufficient(failure)),
            FailureCode::CallException => Some(LootError::ContractReverted(Self::reason_or_message(failure))),
            FailureCode::NetworkError | FailureCode::Timeout | FailureCode::ServerError => {
                Some(LootError::NetworkUnavailable(Self::reason_or_message(failure)))
            },
            FailureCode::BadData => Some(LootError::ContractUnreachable(Self::reason_or_message(failure))),
            FailureCode::Other(_) => None,
        }
    }

    fn from_rpc_code(code: i64, failure: &ChainFailure) -> Option<LootError> {
        match code {
            RPC_USER_REJECTED => Some(LootError::UserRejected),
            RPC_EXECUTION_REVERTED => Some(LootError::ContractReverted(Self::reason_or_message(failure))),
            code if RPC_DISCONNECTED.contains(&code) || RPC_UNAVAILABLE.contains(&code) => {
                Some(LootError::NetworkUnavailable(Self::reason_or_message(failure)))
            },
            _ => None,
        }
    }

    fn from_reason(reason: &str, failure: &ChainFailure) -> LootError {
        let lowered = reason.to_ascii_lowercase();
        if Self::mentions_rejection(&lowered) {
            LootError::UserRejected
        } else if lowered.contains("insufficient funds") {
            Self::insufficient(failure)
        } else {
            LootError::ContractReverted(reason.to_string())
        }
    }

    fn from_message(failure: &ChainFailure) -> LootError {
        let message = failure.message.trim();
        if message.is_empty() {
            return LootError::Unknown(GENERIC_FAILURE.to_string());
        }

        let lowered = message.to_ascii_lowercase();
        if Self::mentions_rejection(&lowered) {
            LootError::UserRejected
        } else if lowered.contains("insufficient funds") {
            Self::insufficient(failure)
        } else if ["connection refused", "timed out", "network", "unreachable"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            LootError::NetworkUnavailable(message.to_string())
        } else {
            LootError::Unknown(message.to_string())
        }
    }

    fn mentions_rejection(lowered: &str) -> bool {
        lowered.contains("user rejected") || lowered.contains("user denied")
    }

    const fn insufficient(failure: &ChainFailure) -> LootError {
        LootError::InsufficientFunds {
            required: failure.required,
            available: failure.available,
        }
    }

    fn reason_or_message(failure: &ChainFailure) -> String {
        failure
            .reason
            .clone()
            .filter(|reason| !reason.trim().is_empty())
            .unwrap_or_else(|| {
                if failure.message.trim().is_empty() {
                    GENERIC_FAILURE.to_string()
                } else {
                    failure.message.clone()
                }
            })
    }
}

impl From<ChainFailure> for LootError {
    fn from(failure: ChainFailure) -> Self {
        ErrorClassifier::classify(&failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_code_wins_over_reason() {
        let failure = ChainFailure::with_code(FailureCode::ActionRejected, "user rejected action")
            .reason("execution reverted: nope");
        assert_eq!(ErrorClassifier::classify(&failure), LootError::UserRejected);
    }

    #[test]
    fn revert_reason_is_propagated_unmodified() {
        let failure = ChainFailure::with_code(FailureCode::CallException, "call failed")
            .reason("Not enough ETH sent for tickets");
        assert_eq!(
            ErrorClassifier::classify(&failure),
            LootError::ContractReverted("Not enough ETH sent for tickets".to_string())
        );
    }

    #[test]
    fn insufficient_funds_carries_amounts() {
        let failure = ChainFailure::with_code(FailureCode::InsufficientFunds, "insufficient funds")
            .amounts(U256::from(3000), U256::from(100));
        let error = ErrorClassifier::classify(&failure);
        assert_eq!(
            error,
            LootError::InsufficientFunds {
                required: Some(U256::from(3000)),
                available: Some(U256::from(100)),
            }
        );
        assert_eq!(
            error.to_string(),
            "Insufficient funds (required 3000 wei, available 100 wei)"
        );
    }

    #[test]
    fn rpc_codes_are_used_when_no_structured_code() {
        let rejected = ChainFailure::message("request failed").rpc_code(4001);
        assert_eq!(ErrorClassifier::classify(&rejected), LootError::UserRejected);

        let disconnected = ChainFailure::message("provider disconnected").rpc_code(4900);
        assert!(ErrorClassifier::classify(&disconnected).is_transient());
    }

    #[test]
    fn network_codes_are_transient() {
        let failure = ChainFailure::with_code(FailureCode::NetworkError, "could not detect network");
        let error = ErrorClassifier::classify(&failure);
        assert_eq!(error, LootError::NetworkUnavailable("could not detect network".to_string()));
        assert!(error.is_transient());
    }

    #[test]
    fn bad_data_means_contract_unreachable() {
        let failure = ChainFailure::with_code(FailureCode::BadData, "could not decode result data");
        assert!(matches!(
            ErrorClassifier::classify(&failure),
            LootError::ContractUnreachable(_)
        ));
    }

    #[test]
    fn bare_reason_is_treated_as_revert_reason() {
        let failure = ChainFailure::message("ignored").reason("Blueprint sold out");
        assert_eq!(
            ErrorClassifier::classify(&failure),
            LootError::ContractReverted("Blueprint sold out".to_string())
        );
    }

    #[test]
    fn message_fallbacks() {
        assert_eq!(
            ErrorClassifier::classify(&ChainFailure::message("MetaMask Tx Signature: User denied transaction signature.")),
            LootError::UserRejected
        );
        assert_eq!(
            ErrorClassifier::classify(&ChainFailure::message("connection refused")),
            LootError::NetworkUnavailable("connection refused".to_string())
        );
        assert_eq!(
            ErrorClassifier::classify(&ChainFailure::message("something odd")),
            LootError::Unknown("something odd".to_string())
        );
        assert_eq!(
            ErrorClassifier::classify(&ChainFailure::default()),
            LootError::Unknown("chain request failed".to_string())
        );
    }

    #[test]
    fn unknown_provider_code_falls_through() {
        let failure = ChainFailure::with_code(FailureCode::parse("NONCE_EXPIRED"), "nonce has already been used");
        assert_eq!(
            ErrorClassifier::classify(&failure),
            LootError::Unknown("nonce has already been used".to_string())
        );
    }
}
