use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, Error};
use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_sdk::{
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use spl_associated_token_account_interface::{
    address::get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use tracing::{debug, info, warn};

use crate::{rpc::LedgerRpc, telemetry::redact, SwapError};

pub const TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

const TOKEN_ACCOUNT_LEN: usize = 165;
const SIGNATURE_FEE_LAMPORTS: u64 = 5_000;
const MICRO_LAMPORTS_PER_LAMPORT: u64 = 1_000_000;

/// Urgency of the account-creation transaction, as a percentile of recent
/// prioritization fees paid for the accounts it touches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PriorityTier {
    Min,
    Low,
    Medium,
    #[default]
    High,
    VeryHigh,
}

impl PriorityTier {
    pub fn percentile(&self) -> usize {
        match self {
            Self::Min => 0,
            Self::Low => 25,
            Self::Medium => 50,
            Self::High => 75,
            Self::VeryHigh => 95,
        }
    }

    /// Micro-lamports per compute unit for this tier given a sample of recent fees.
    pub fn pick(&self, mut recent_fees: Vec<u64>) -> u64 {
        if recent_fees.is_empty() {
            return 0;
        }
        recent_fees.sort_unstable();
        let index = (recent_fees.len() - 1) * self.percentile() / 100;
        recent_fees[index]
    }
}

impl FromStr for PriorityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Min" => Ok(Self::Min),
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            "VeryHigh" => Ok(Self::VeryHigh),
            _ => Err(anyhow!("{} is not a valid PriorityTier", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub address: Pubkey,
    pub token_program: Pubkey,
    pub was_created: bool,
}

/// Best-effort facts gathered after a resolution failure, for logging only.
#[derive(Debug, Clone)]
pub struct AccountDiagnostics {
    pub account: Pubkey,
    pub mint_exists: bool,
}

/// Makes sure an owner has an associated token account for a mint, creating it
/// with the local payer when it is missing. Creation is idempotent on-chain.
pub struct AccountResolver {
    ledger: Arc<dyn LedgerRpc>,
    payer: Arc<Keypair>,
    priority: PriorityTier,
    compute_unit_limit: u32,
}

impl AccountResolver {
    pub fn new(
        ledger: Arc<dyn LedgerRpc>,
        payer: Arc<Keypair>,
        priority: PriorityTier,
        compute_unit_limit: u32,
    ) -> Self {
        Self {
            ledger,
            payer,
            priority,
            compute_unit_limit,
        }
    }

    pub fn derive(mint: &Pubkey, owner: &Pubkey, token_program: &Pubkey) -> Pubkey {
        get_associated_token_address_with_program_id(owner, mint, token_program)
    }

    /// Token program that owns the mint. Anything else means the address is not a usable mint.
    pub async fn token_program_for(&self, mint: &Pubkey) -> Result<Pubkey, SwapError> {
        let account = self
            .ledger
            .get_account(mint)
            .await?
            .ok_or_else(|| SwapError::AccountDerivation(format!("mint {mint} does not exist")))?;

        if account.owner == TOKEN_PROGRAM_ID || account.owner == TOKEN_2022_PROGRAM_ID {
            Ok(account.owner)
        } else {
            Err(SwapError::AccountDerivation(format!(
                "mint {mint} is owned by {}, not a token program",
                account.owner
            )))
        }
    }

    pub async fn ensure_account(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
    ) -> Result<ResolvedAccount, SwapError> {
        let token_program = self.token_program_for(mint).await?;
        let address = Self::derive(mint, owner, &token_program);

        if self.ledger.get_account(&address).await?.is_some() {
            debug!(account = %redact(&address.to_string()), "token account exists");
            return Ok(ResolvedAccount {
                address,
                token_program,
                was_created: false,
            });
        }

        match self.create(mint, owner, &address, &token_program).await {
            Ok(()) => {
                info!(
                    account = %redact(&address.to_string()),
                    owner = %redact(&owner.to_string()),
                    mint = %redact(&mint.to_string()),
                    "created token account"
                );
                Ok(ResolvedAccount {
                    address,
                    token_program,
                    was_created: true,
                })
            }
            Err(err) => {
                // Lost a race with another creator; the account is there either way.
                if self.ledger.get_account(&address).await?.is_some() {
                    warn!(
                        account = %redact(&address.to_string()),
                        error = %err,
                        "token account appeared during creation"
                    );
                    return Ok(ResolvedAccount {
                        address,
                        token_program,
                        was_created: false,
                    });
                }
                Err(err)
            }
        }
    }

    pub async fn diagnose(&self, mint: &Pubkey, owner: &Pubkey) -> AccountDiagnostics {
        let mint_account = self.ledger.get_account(mint).await.ok().flatten();
        let token_program = mint_account
            .as_ref()
            .map_or(TOKEN_PROGRAM_ID, |account| account.owner);
        AccountDiagnostics {
            account: Self::derive(mint, owner, &token_program),
            mint_exists: mint_account.is_some(),
        }
    }

    async fn create(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        address: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<(), SwapError> {
        let payer = self.payer.pubkey();

        let recent_fees = self
            .ledger
            .get_recent_prioritization_fees(&[payer, *address])
            .await?;
        let unit_price = self.priority.pick(recent_fees);

        let rent = self
            .ledger
            .get_minimum_balance_for_rent_exemption(TOKEN_ACCOUNT_LEN)
            .await?;
        // The payer must stay rent-exempt after paying for the new account.
        let payer_reserve = self.ledger.get_minimum_balance_for_rent_exemption(0).await?;
        let priority_cost = unit_price
            .saturating_mul(u64::from(self.compute_unit_limit))
            .div_ceil(MICRO_LAMPORTS_PER_LAMPORT);
        let required = rent
            .saturating_add(payer_reserve)
            .saturating_add(SIGNATURE_FEE_LAMPORTS)
            .saturating_add(priority_cost);
        let balance = self.ledger.get_balance(&payer).await?;
        if balance < required {
            return Err(SwapError::Funding(format!(
                "payer {} holds {balance} lamports, needs {required}",
                redact(&payer.to_string())
            )));
        }

        let instructions = [
            ComputeBudgetInstruction::set_compute_unit_limit(self.compute_unit_limit),
            ComputeBudgetInstruction::set_compute_unit_price(unit_price),
            create_associated_token_account_idempotent(&payer, owner, mint, token_program),
        ];

        let block = self.ledger.get_latest_block_reference().await?;
        let message = v0::Message::try_compile(&payer, &instructions, &[], block.blockhash)
            .map_err(|e| SwapError::Compilation(format!("account creation message: {e}")))?;
        let transaction =
            VersionedTransaction::try_new(VersionedMessage::V0(message), &[self.payer.as_ref()])
                .map_err(|e| SwapError::Funding(format!("payer could not sign: {e}")))?;

        let signature = self.ledger.send_and_confirm_transaction(&transaction).await?;
        debug!(%signature, unit_price, "account creation confirmed");
        Ok(())
    }
}
