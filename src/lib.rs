use std::str::FromStr;

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

pub mod account;
pub mod aggregator;
pub mod compiler;
pub mod config;
pub mod fee;
pub mod lookup_table;
pub mod orchestrator;
pub mod quote;
pub mod rpc;
pub mod serde_helpers;
pub mod simulator;
pub mod swap;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregator::{AggregatorClient, SwapInstructionSource};
pub use config::SwapConfig;
pub use orchestrator::SwapOrchestrator;
pub use quote::{Quote, SlippageMode, SwapRequest};
pub use rpc::{LedgerRpc, SolanaLedger};
pub use simulator::SimulationMode;
pub use swap::{InstructionSet, SwapTransaction};
pub use telemetry::{ErrorSink, NoopSink, TracingSink};

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Cannot derive token account: {0}")]
    AccountDerivation(String),
    #[error("Payer cannot fund account creation: {0}")]
    Funding(String),
    #[error("Quote expired: {0}")]
    QuoteExpired(String),
    #[error("Invalid quote: {0}")]
    InvalidQuote(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Lookup table {address} not found: {reason}")]
    LookupTableNotFound { address: Pubkey, reason: String },
    #[error("Invalid fee account: {0}")]
    FeeAccountInvalid(String),
    #[error("Invalid fee amount: {0}")]
    InvalidFeeAmount(String),
    #[error("Transaction compilation failed: {0}")]
    Compilation(String),
    #[error("Simulation failed: {error}")]
    SimulationFailed { error: String, logs: Vec<String> },
    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwapErrorKind {
    AccountDerivation,
    Funding,
    QuoteExpired,
    InvalidQuote,
    UpstreamUnavailable,
    LookupTableNotFound,
    FeeAccountInvalid,
    InvalidFeeAmount,
    Compilation,
    SimulationFailed,
    Config,
}

impl SwapErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountDerivation => "account_derivation",
            Self::Funding => "funding",
            Self::QuoteExpired => "quote_expired",
            Self::InvalidQuote => "invalid_quote",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::LookupTableNotFound => "lookup_table_not_found",
            Self::FeeAccountInvalid => "fee_account_invalid",
            Self::InvalidFeeAmount => "invalid_fee_amount",
            Self::Compilation => "compilation",
            Self::SimulationFailed => "simulation_failed",
            Self::Config => "config",
        }
    }
}

impl SwapError {
    pub fn kind(&self) -> SwapErrorKind {
        match self {
            Self::AccountDerivation(_) => SwapErrorKind::AccountDerivation,
            Self::Funding(_) => SwapErrorKind::Funding,
            Self::QuoteExpired(_) => SwapErrorKind::QuoteExpired,
            Self::InvalidQuote(_) => SwapErrorKind::InvalidQuote,
            Self::UpstreamUnavailable(_) => SwapErrorKind::UpstreamUnavailable,
            Self::LookupTableNotFound { .. } => SwapErrorKind::LookupTableNotFound,
            Self::FeeAccountInvalid(_) => SwapErrorKind::FeeAccountInvalid,
            Self::InvalidFeeAmount(_) => SwapErrorKind::InvalidFeeAmount,
            Self::Compilation(_) => SwapErrorKind::Compilation,
            Self::SimulationFailed { .. } => SwapErrorKind::SimulationFailed,
            Self::Config(_) => SwapErrorKind::Config,
        }
    }

    /// Only transport-level failures are worth retrying, and then only with a fresh quote.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }

    /// Caller-facing message. Never includes addresses, program logs or raw upstream bodies.
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            SwapErrorKind::AccountDerivation => "The token address is not valid for this swap.",
            SwapErrorKind::Funding => "Unable to prepare the token account right now.",
            SwapErrorKind::QuoteExpired => "The quote has expired. Please request a new quote.",
            SwapErrorKind::InvalidQuote => "The quote is invalid. Please request a new quote.",
            SwapErrorKind::UpstreamUnavailable => {
                "The swap service is temporarily unavailable. Please try again."
            }
            SwapErrorKind::LookupTableNotFound => {
                "The swap route is no longer available. Please request a new quote."
            }
            SwapErrorKind::FeeAccountInvalid => "The fee account is not valid.",
            SwapErrorKind::InvalidFeeAmount => "The fee amount is not valid.",
            SwapErrorKind::Compilation => {
                "The swap route is too complex to fit in one transaction."
            }
            SwapErrorKind::SimulationFailed => "The swap transaction failed simulation.",
            SwapErrorKind::Config => "The swap service is misconfigured.",
        }
    }
}

pub(crate) fn parse_pubkey(value: &str) -> Option<Pubkey> {
    Pubkey::from_str(value.trim()).ok()
}
