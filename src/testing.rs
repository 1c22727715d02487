//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use solana_sdk::{
    account::Account,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

use crate::{
    aggregator::SwapInstructionSource,
    quote::Quote,
    rpc::{BlockReference, LedgerRpc, SimulationOutcome},
    swap::InstructionSet,
    telemetry::{ErrorReport, ErrorSink},
    SwapError,
};

pub(crate) fn sample_quote_json(in_amount: u64, slippage_bps: u16) -> serde_json::Value {
    let input = Pubkey::new_unique().to_string();
    let output = Pubkey::new_unique().to_string();
    serde_json::json!({
        "inputMint": input,
        "inAmount": in_amount.to_string(),
        "outputMint": output,
        "outAmount": "2000",
        "otherAmountThreshold": "1990",
        "swapMode": "ExactIn",
        "slippageBps": slippage_bps,
        "routePlan": [{
            "swapInfo": {
                "ammKey": Pubkey::new_unique().to_string(),
                "label": "Whirlpool",
                "inputMint": input,
                "outputMint": output,
                "inAmount": in_amount.to_string(),
                "outAmount": "2000",
            },
            "percent": 100,
        }],
    })
}

pub(crate) fn sample_quote(slippage_bps: u16) -> Quote {
    Quote::try_from(sample_quote_json(1_500_000, slippage_bps)).unwrap()
}

/// Raw lookup-table account data: 56-byte meta (active, no authority) followed by addresses.
pub(crate) fn lookup_table_data(addresses: &[Pubkey]) -> Vec<u8> {
    let mut data = Vec::with_capacity(56 + addresses.len() * 32);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.extend_from_slice(&u64::MAX.to_le_bytes());
    data.extend_from_slice(&0u64.to_le_bytes());
    data.push(0);
    data.push(0);
    data.resize(56, 0);
    for address in addresses {
        data.extend_from_slice(address.as_ref());
    }
    data
}

pub(crate) fn owned_account(owner: Pubkey, data: Vec<u8>) -> Account {
    Account {
        lamports: 2_039_280,
        data,
        owner,
        executable: false,
        rent_epoch: 0,
    }
}

pub(crate) fn swap_leg(program: Pubkey, signer: Pubkey, data: Vec<u8>) -> Instruction {
    Instruction {
        program_id: program,
        accounts: vec![
            AccountMeta::new(signer, true),
            AccountMeta::new(Pubkey::new_unique(), false),
            AccountMeta::new_readonly(Pubkey::new_unique(), false),
        ],
        data,
    }
}

pub(crate) struct FakeLedger {
    pub accounts: Mutex<HashMap<Pubkey, Account>>,
    pub balances: Mutex<HashMap<Pubkey, u64>>,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    pub simulation: Mutex<Result<SimulationOutcome, String>>,
    pub fail_blockhash: bool,
    /// Whether a send applies its account creations; off models a rejected transaction.
    pub sends_create_accounts: AtomicBool,
    /// Error returned by every send, after any account creations are applied.
    pub send_error: Mutex<Option<fn() -> SwapError>>,
    pub sends: AtomicUsize,
    pub simulations: AtomicUsize,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            blockhash: Hash::new_from_array([7u8; 32]),
            last_valid_block_height: 5_000,
            simulation: Mutex::new(Ok(SimulationOutcome::default())),
            fail_blockhash: false,
            sends_create_accounts: AtomicBool::new(true),
            send_error: Mutex::new(None),
            sends: AtomicUsize::new(0),
            simulations: AtomicUsize::new(0),
        }
    }

    pub fn insert_account(&self, address: Pubkey, account: Account) {
        self.accounts.lock().unwrap().insert(address, account);
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }

    pub fn set_simulation(&self, outcome: Result<SimulationOutcome, String>) {
        *self.simulation.lock().unwrap() = outcome;
    }

    pub fn fail_sends(&self, error: fn() -> SwapError, create_accounts: bool) {
        *self.send_error.lock().unwrap() = Some(error);
        self.sends_create_accounts
            .store(create_accounts, Ordering::SeqCst);
    }

    pub fn has_account(&self, address: &Pubkey) -> bool {
        self.accounts.lock().unwrap().contains_key(address)
    }
}

#[async_trait]
impl LedgerRpc for FakeLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, SwapError> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, SwapError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(addresses.iter().map(|a| accounts.get(a).cloned()).collect())
    }

    async fn get_latest_block_reference(&self) -> Result<BlockReference, SwapError> {
        if self.fail_blockhash {
            return Err(SwapError::UpstreamUnavailable(
                "getLatestBlockhash: timed out".to_string(),
            ));
        }
        Ok(BlockReference {
            blockhash: self.blockhash,
            last_valid_block_height: self.last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, SwapError> {
        Ok(self.last_valid_block_height - 150)
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, SwapError> {
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> Result<u64, SwapError> {
        Ok((128 + data_len as u64) * 6_960)
    }

    async fn get_recent_prioritization_fees(
        &self,
        _addresses: &[Pubkey],
    ) -> Result<Vec<u64>, SwapError> {
        Ok(vec![0, 100, 200, 300, 400, 500, 600, 700, 800, 900, 1_000])
    }

    async fn simulate_transaction(
        &self,
        _transaction: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SwapError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        self.simulation
            .lock()
            .unwrap()
            .clone()
            .map_err(SwapError::UpstreamUnavailable)
    }

    /// Applies every idempotent associated-account creation found in the transaction.
    async fn send_and_confirm_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, SwapError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if self.sends_create_accounts.load(Ordering::SeqCst) {
            let keys = transaction.message.static_account_keys();
            for ix in transaction.message.instructions() {
                let program = keys[ix.program_id_index as usize];
                if program == crate::account::ASSOCIATED_TOKEN_PROGRAM_ID {
                    let ata = keys[ix.accounts[1] as usize];
                    let token_program = keys[ix.accounts[5] as usize];
                    self.insert_account(ata, owned_account(token_program, vec![0; 165]));
                }
            }
        }
        match *self.send_error.lock().unwrap() {
            Some(make) => Err(make()),
            None => Ok(Signature::default()),
        }
    }
}

pub(crate) struct FakeAggregator {
    pub set: Result<InstructionSet, fn() -> SwapError>,
    pub calls: Mutex<Vec<(Pubkey, Option<Pubkey>, u16, Option<u64>)>>,
}

impl FakeAggregator {
    pub fn returning(set: InstructionSet) -> Self {
        Self {
            set: Ok(set),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: fn() -> SwapError) -> Self {
        Self {
            set: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_slippage(&self) -> Option<u16> {
        self.calls.lock().unwrap().last().map(|call| call.2)
    }

    pub fn last_fee_account(&self) -> Option<Pubkey> {
        self.calls.lock().unwrap().last().and_then(|call| call.1)
    }
}

#[async_trait]
impl SwapInstructionSource for FakeAggregator {
    async fn fetch(
        &self,
        _quote: &Quote,
        requester: &Pubkey,
        priority_fee_lamports: Option<u64>,
        fee_account: Option<&Pubkey>,
        slippage_bps: u16,
    ) -> Result<InstructionSet, SwapError> {
        self.calls.lock().unwrap().push((
            *requester,
            fee_account.copied(),
            slippage_bps,
            priority_fee_lamports,
        ));
        match &self.set {
            Ok(set) => Ok(set.clone()),
            Err(make) => Err(make()),
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingSink {
    pub fn operations(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.operation.clone())
            .collect()
    }
}

impl ErrorSink for RecordingSink {
    fn log_error(&self, report: &ErrorReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}
