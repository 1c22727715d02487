use std::{env, str::FromStr, time::Duration};

use solana_sdk::{pubkey::Pubkey, signature::Keypair};

use crate::{
    account::{PriorityTier, TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID},
    fee::FeeAsset,
    parse_pubkey,
    simulator::SimulationMode,
    SwapError,
};

const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_AGGREGATOR_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_FEE_DECIMALS: u8 = 6;
const DEFAULT_ACCOUNT_COMPUTE_UNIT_LIMIT: u32 = 50_000;

/// Read-only settings shared by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapConfig {
    /// Owner of the output-asset account the aggregator routes its fee into.
    pub fee_wallet: Pubkey,
    pub fee_asset: FeeAsset,
    pub rpc_timeout: Duration,
    pub aggregator_timeout: Duration,
    pub confirm_timeout: Duration,
    pub simulation_mode: SimulationMode,
    pub account_priority: PriorityTier,
    pub account_compute_unit_limit: u32,
}

impl SwapConfig {
    pub fn new(fee_wallet: Pubkey, fee_mint: Pubkey) -> Self {
        Self {
            fee_wallet,
            fee_asset: FeeAsset {
                mint: fee_mint,
                decimals: DEFAULT_FEE_DECIMALS,
                token_program: TOKEN_PROGRAM_ID,
            },
            rpc_timeout: Duration::from_millis(DEFAULT_RPC_TIMEOUT_MS),
            aggregator_timeout: Duration::from_millis(DEFAULT_AGGREGATOR_TIMEOUT_MS),
            confirm_timeout: Duration::from_millis(DEFAULT_CONFIRM_TIMEOUT_MS),
            simulation_mode: SimulationMode::default(),
            account_priority: PriorityTier::default(),
            account_compute_unit_limit: DEFAULT_ACCOUNT_COMPUTE_UNIT_LIMIT,
        }
    }

    pub fn from_env() -> Result<Self, SwapError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SwapError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let fee_wallet = required_pubkey(&get, "FEE_WALLET")?;
        let fee_mint = required_pubkey(&get, "FEE_TOKEN_MINT")?;
        let mut config = Self::new(fee_wallet, fee_mint);

        if let Some(decimals) = get("FEE_TOKEN_DECIMALS") {
            config.fee_asset.decimals = parse_value("FEE_TOKEN_DECIMALS", &decimals)?;
        }
        if let Some(program) = get("FEE_TOKEN_PROGRAM") {
            config.fee_asset.token_program = match program.as_str() {
                "token" => TOKEN_PROGRAM_ID,
                "token-2022" => TOKEN_2022_PROGRAM_ID,
                other => parse_pubkey(other).ok_or_else(|| {
                    SwapError::Config(format!("FEE_TOKEN_PROGRAM is not a pubkey: {other}"))
                })?,
            };
        }
        if let Some(ms) = get("RPC_TIMEOUT_MS") {
            config.rpc_timeout = Duration::from_millis(parse_value("RPC_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = get("AGGREGATOR_TIMEOUT_MS") {
            config.aggregator_timeout =
                Duration::from_millis(parse_value("AGGREGATOR_TIMEOUT_MS", &ms)?);
        }
        if let Some(ms) = get("CONFIRM_TIMEOUT_MS") {
            config.confirm_timeout = Duration::from_millis(parse_value("CONFIRM_TIMEOUT_MS", &ms)?);
        }
        if let Some(mode) = get("SIMULATION_MODE") {
            config.simulation_mode = parse_value("SIMULATION_MODE", &mode)?;
        }
        if let Some(tier) = get("ACCOUNT_PRIORITY") {
            config.account_priority = parse_value("ACCOUNT_PRIORITY", &tier)?;
        }
        if let Some(limit) = get("ACCOUNT_COMPUTE_UNIT_LIMIT") {
            config.account_compute_unit_limit = parse_value("ACCOUNT_COMPUTE_UNIT_LIMIT", &limit)?;
        }

        Ok(config)
    }
}

fn required_pubkey<F>(get: &F, key: &str) -> Result<Pubkey, SwapError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = get(key).ok_or_else(|| SwapError::Config(format!("{key} is not set")))?;
    parse_pubkey(&value).ok_or_else(|| SwapError::Config(format!("{key} is not a pubkey")))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, SwapError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SwapError::Config(format!("{key}: {e}")))
}

/// Loads the account-creation payer from `PAYER_PRIVATE_KEY` (base58 secret key).
pub fn payer_from_env() -> Result<Keypair, SwapError> {
    let encoded = env::var("PAYER_PRIVATE_KEY")
        .map_err(|_| SwapError::Config("PAYER_PRIVATE_KEY is not set".to_string()))?;
    payer_from_base58(&encoded)
}

pub fn payer_from_base58(encoded: &str) -> Result<Keypair, SwapError> {
    let bytes = bs58::decode(encoded.trim())
        .into_vec()
        .map_err(|e| SwapError::Config(format!("PAYER_PRIVATE_KEY is not base58: {e}")))?;
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| SwapError::Config(format!("PAYER_PRIVATE_KEY is not a keypair: {e}")))
}
