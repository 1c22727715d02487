use std::str::FromStr;

use crate::serde_helpers::{field_as_string, option_field_as_string};
use crate::SwapError;
use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

#[derive(Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
pub enum SwapMode {
    #[default]
    ExactIn,
    ExactOut,
}

impl FromStr for SwapMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExactIn" => Ok(Self::ExactIn),
            "ExactOut" => Ok(Self::ExactOut),
            _ => Err(anyhow!("{} is not a valid SwapMode", s)),
        }
    }
}

/// How the slippage sent to the aggregator is chosen.
#[derive(Serialize, Deserialize, Default, PartialEq, Eq, Clone, Copy, Debug)]
#[serde(rename_all = "lowercase")]
pub enum SlippageMode {
    /// Use the tolerance embedded in the quote.
    #[default]
    Auto,
    /// Use the caller's basis points verbatim.
    Fixed,
}

impl FromStr for SlippageMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "fixed" => Ok(Self::Fixed),
            _ => Err(anyhow!("{} is not a valid SlippageMode", s)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    pub percent: u8,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    #[serde(with = "field_as_string")]
    pub amm_key: Pubkey,
    #[serde(default)]
    pub label: String,
    #[serde(with = "field_as_string")]
    pub input_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub output_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub in_amount: u64,
    #[serde(with = "field_as_string")]
    pub out_amount: u64,
    #[serde(with = "option_field_as_string", default)]
    pub fee_mint: Option<Pubkey>,
    #[serde(with = "option_field_as_string", default)]
    pub fee_amount: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFee {
    #[serde(with = "field_as_string")]
    pub amount: u64,
    pub fee_bps: u16,
}

/// Fields of an aggregator quote this crate relies on. Anything else in the
/// payload is carried through untouched.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    #[serde(with = "field_as_string")]
    pub input_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub in_amount: u64,
    #[serde(with = "field_as_string")]
    pub output_mint: Pubkey,
    #[serde(with = "field_as_string")]
    pub out_amount: u64,
    #[serde(default)]
    pub swap_mode: SwapMode,
    pub slippage_bps: u16,
    #[serde(default)]
    pub platform_fee: Option<PlatformFee>,
    pub route_plan: Vec<RoutePlanStep>,
    #[serde(default)]
    pub context_slot: Option<u64>,
}

/// Aggregator-issued quote. Immutable once parsed; the original JSON is what
/// gets sent back to the aggregator.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Quote {
    raw: serde_json::Value,
    summary: QuoteSummary,
}

impl Quote {
    pub fn summary(&self) -> &QuoteSummary {
        &self.summary
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn slippage_bps(&self) -> u16 {
        self.summary.slippage_bps
    }
}

impl TryFrom<serde_json::Value> for Quote {
    type Error = SwapError;

    fn try_from(raw: serde_json::Value) -> Result<Self, Self::Error> {
        if !raw.is_object() {
            return Err(SwapError::InvalidQuote("quote is not an object".to_string()));
        }

        let summary: QuoteSummary = serde_json::from_value(raw.clone())
            .map_err(|e| SwapError::InvalidQuote(e.to_string()))?;

        if summary.in_amount == 0 {
            return Err(SwapError::InvalidQuote("inAmount is zero".to_string()));
        }
        if summary.route_plan.is_empty() {
            return Err(SwapError::InvalidQuote("routePlan is empty".to_string()));
        }

        Ok(Self { raw, summary })
    }
}

impl From<Quote> for serde_json::Value {
    fn from(quote: Quote) -> Self {
        quote.raw
    }
}

/// One call's worth of input. Addresses stay as strings until the stage that
/// owns them parses them, so each malformed field maps to its own error.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    #[serde(rename = "quoteResponse")]
    pub quote: Quote,
    pub wallet_address: String,
    #[serde(default)]
    pub fee_token_account: Option<String>,
    #[serde(default)]
    pub fee_amount: Option<String>,
    #[serde(default)]
    pub priority_fee_lamports: Option<u64>,
    pub mint_address: String,
    #[serde(default)]
    pub is_copy_trade: bool,
    #[serde(default)]
    pub slippage_mode: SlippageMode,
    #[serde(default)]
    pub slippage_bps: u16,
}

impl SwapRequest {
    pub fn effective_slippage_bps(&self) -> u16 {
        match self.slippage_mode {
            SlippageMode::Auto => self.quote.slippage_bps(),
            SlippageMode::Fixed => self.slippage_bps,
        }
    }

    pub fn has_fee_account(&self) -> bool {
        self.fee_token_account
            .as_deref()
            .is_some_and(|account| !account.trim().is_empty())
    }
}
