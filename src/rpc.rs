//! Ledger access used by the pipeline.
//!
//! Every call carries its own timeout; an elapsed timeout and any transport
//! failure both surface as [`SwapError::UpstreamUnavailable`].

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use solana_client::{nonblocking::rpc_client::RpcClient, rpc_config::RpcSimulateTransactionConfig};
use solana_commitment_config::CommitmentConfig;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::InstructionError,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};

use crate::SwapError;

/// Outcome of a non-committing dry run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Block reference for compilation plus the height after which it is no longer accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, SwapError>;

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, SwapError>;

    async fn get_latest_block_reference(&self) -> Result<BlockReference, SwapError>;

    async fn get_block_height(&self) -> Result<u64, SwapError>;

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, SwapError>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize)
        -> Result<u64, SwapError>;

    /// Recent per-slot prioritization fees (micro-lamports per CU) for the given accounts.
    async fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<u64>, SwapError>;

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SwapError>;

    async fn send_and_confirm_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SwapError>;
}

pub struct SolanaLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    timeout: Duration,
    confirm_timeout: Duration,
}

impl SolanaLedger {
    pub fn new(rpc_url: String, timeout: Duration, confirm_timeout: Duration) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            client: Arc::new(RpcClient::new_with_timeout_and_commitment(
                rpc_url, timeout, commitment,
            )),
            commitment,
            timeout,
            confirm_timeout,
        }
    }

    pub fn from_client(client: Arc<RpcClient>, timeout: Duration, confirm_timeout: Duration) -> Self {
        Self {
            commitment: client.commitment(),
            client,
            timeout,
            confirm_timeout,
        }
    }
}

async fn with_timeout<T, E, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, SwapError>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(SwapError::UpstreamUnavailable(format!("{operation}: {e}"))),
        Err(_) => Err(SwapError::UpstreamUnavailable(format!(
            "{operation}: timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

#[async_trait]
impl LedgerRpc for SolanaLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, SwapError> {
        let response = with_timeout(
            "getAccountInfo",
            self.timeout,
            self.client
                .get_account_with_commitment(address, self.commitment),
        )
        .await?;
        Ok(response.value)
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, SwapError> {
        with_timeout(
            "getMultipleAccounts",
            self.timeout,
            self.client.get_multiple_accounts(addresses),
        )
        .await
    }

    async fn get_latest_block_reference(&self) -> Result<BlockReference, SwapError> {
        let (blockhash, last_valid_block_height) = with_timeout(
            "getLatestBlockhash",
            self.timeout,
            self.client
                .get_latest_blockhash_with_commitment(self.commitment),
        )
        .await?;
        Ok(BlockReference {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, SwapError> {
        with_timeout("getBlockHeight", self.timeout, self.client.get_block_height()).await
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, SwapError> {
        with_timeout("getBalance", self.timeout, self.client.get_balance(address)).await
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, SwapError> {
        with_timeout(
            "getMinimumBalanceForRentExemption",
            self.timeout,
            self.client.get_minimum_balance_for_rent_exemption(data_len),
        )
        .await
    }

    async fn get_recent_prioritization_fees(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<u64>, SwapError> {
        let fees = with_timeout(
            "getRecentPrioritizationFees",
            self.timeout,
            self.client.get_recent_prioritization_fees(addresses),
        )
        .await?;
        Ok(fees.into_iter().map(|fee| fee.prioritization_fee).collect())
    }

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SwapError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = with_timeout(
            "simulateTransaction",
            self.timeout,
            self.client
                .simulate_transaction_with_config(transaction, config),
        )
        .await?;

        let result = response.value;
        Ok(SimulationOutcome {
            error: result.err.map(|err| format!("{err:?}")),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn send_and_confirm_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SwapError> {
        match tokio::time::timeout(
            self.confirm_timeout,
            self.client.send_and_confirm_transaction(transaction),
        )
        .await
        {
            Ok(Ok(signature)) => Ok(signature),
            Ok(Err(e)) => Err(classify_send_failure(e.get_transaction_error(), &e.to_string())),
            Err(_) => Err(SwapError::UpstreamUnavailable(format!(
                "sendTransaction: timed out after {}ms",
                self.confirm_timeout.as_millis()
            ))),
        }
    }
}

/// `SystemError::ResultWithNegativeLamports`, raised when the payer cannot
/// cover the lamports moved into a new account.
const SYSTEM_RESULT_WITH_NEGATIVE_LAMPORTS: u32 = 1;

/// A rejected send caused by the payer's balance is a funding problem, not an outage.
fn classify_send_failure(error: Option<TransactionError>, detail: &str) -> SwapError {
    match error {
        Some(
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. }
            | TransactionError::InstructionError(_, InstructionError::InsufficientFunds)
            | TransactionError::InstructionError(
                _,
                InstructionError::Custom(SYSTEM_RESULT_WITH_NEGATIVE_LAMPORTS),
            ),
        ) => SwapError::Funding(format!("sendTransaction: {detail}")),
        _ => SwapError::UpstreamUnavailable(format!("sendTransaction: {detail}")),
    }
}
