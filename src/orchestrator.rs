use std::sync::Arc;

use solana_sdk::{message::AddressLookupTableAccount, pubkey::Pubkey, signature::Keypair};
use tracing::{info, warn};

use crate::{
    account::{AccountResolver, ResolvedAccount},
    aggregator::SwapInstructionSource,
    compiler::{self, CompiledTransaction},
    config::SwapConfig,
    fee::{FeeInstructionBuilder, FeeTransfer},
    lookup_table::LookupTableResolver,
    parse_pubkey,
    quote::SwapRequest,
    rpc::LedgerRpc,
    simulator::{SimulationMode, TransactionSimulator},
    swap::{InstructionSet, SwapTransaction},
    telemetry::{redact, ErrorReport, ErrorSink, NoopSink, Severity},
    SwapError,
};

/// Runs one swap request through account resolution, instruction fetch,
/// lookup-table resolution, fee injection, compilation and simulation.
///
/// Every failure is reported to the sink and then returned unchanged. The
/// transaction is never signed by the requester or submitted here.
pub struct SwapOrchestrator {
    config: SwapConfig,
    aggregator: Arc<dyn SwapInstructionSource>,
    ledger: Arc<dyn LedgerRpc>,
    sink: Arc<dyn ErrorSink>,
    accounts: AccountResolver,
    lookup_tables: LookupTableResolver,
    fees: FeeInstructionBuilder,
    simulator: TransactionSimulator,
}

struct BuiltTransaction {
    compiled: CompiledTransaction,
    instruction_set: InstructionSet,
    lookup_tables: Vec<AddressLookupTableAccount>,
    last_valid_block_height: u64,
}

impl SwapOrchestrator {
    pub fn new(
        config: SwapConfig,
        ledger: Arc<dyn LedgerRpc>,
        aggregator: Arc<dyn SwapInstructionSource>,
        payer: Arc<Keypair>,
    ) -> Self {
        Self {
            accounts: AccountResolver::new(
                ledger.clone(),
                payer,
                config.account_priority,
                config.account_compute_unit_limit,
            ),
            lookup_tables: LookupTableResolver::new(ledger.clone()),
            fees: FeeInstructionBuilder::new(config.fee_asset),
            simulator: TransactionSimulator::new(ledger.clone(), config.simulation_mode),
            sink: Arc::new(NoopSink),
            aggregator,
            ledger,
            config,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn create_swap_transaction(
        &self,
        request: &SwapRequest,
    ) -> Result<SwapTransaction, SwapError> {
        info!(
            operation = "createSwapTransaction:start",
            wallet = %redact(&request.wallet_address),
            mint = %redact(&request.mint_address),
            slippage_mode = ?request.slippage_mode,
            slippage_bps = request.slippage_bps,
            has_fee = request.has_fee_account(),
            copy_trade = request.is_copy_trade,
        );

        match self.run(request).await {
            Ok(transaction) => {
                info!(
                    operation = "createSwapTransaction:success",
                    wallet = %redact(&request.wallet_address),
                    mint = %redact(&request.mint_address),
                    last_valid_block_height = transaction.last_valid_block_height,
                    compute_unit_limit = transaction.compute_unit_limit,
                );
                Ok(transaction)
            }
            Err(err) => {
                self.report(Severity::Error, "createSwapTransaction", request, &err, Vec::new());
                Err(err)
            }
        }
    }

    async fn run(&self, request: &SwapRequest) -> Result<SwapTransaction, SwapError> {
        let requester = parse_pubkey(&request.wallet_address).ok_or_else(|| {
            self.fail(
                "parseRequest",
                request,
                SwapError::AccountDerivation("wallet address is not a pubkey".to_string()),
                Vec::new(),
            )
        })?;
        let output_mint = parse_pubkey(&request.mint_address).ok_or_else(|| {
            self.fail(
                "parseRequest",
                request,
                SwapError::AccountDerivation("mint address is not a pubkey".to_string()),
                Vec::new(),
            )
        })?;

        let fee_transfer = self.fees.parse_request(request).map_err(|err| {
            self.fail(
                "createFeeTransferInstruction",
                request,
                err,
                vec![("feeAmount", request.fee_amount.clone().unwrap_or_default())],
            )
        })?;

        let output_account = self
            .resolve_account(request, &output_mint, &self.config.fee_wallet, "output-token")
            .await?;

        let fee_leg = match fee_transfer {
            Some(transfer) => {
                let fee_account = self
                    .resolve_account(request, &self.fees.asset().mint, &requester, "fee-token")
                    .await?;
                Some((transfer, fee_account.token_program))
            }
            None => None,
        };

        let built = self
            .build_transaction(request, &requester, &output_account.address, fee_leg)
            .await?;

        self.simulate(request, &built).await?;

        Ok(SwapTransaction {
            transaction_base64: built.compiled.to_base64(),
            last_valid_block_height: built.last_valid_block_height,
            compute_unit_limit: built.instruction_set.compute_unit_limit,
            prioritization_fee_lamports: built.instruction_set.prioritization_fee_lamports,
        })
    }

    async fn resolve_account(
        &self,
        request: &SwapRequest,
        mint: &Pubkey,
        owner: &Pubkey,
        label: &str,
    ) -> Result<ResolvedAccount, SwapError> {
        match self.accounts.ensure_account(mint, owner).await {
            Ok(resolved) => {
                let operation = if resolved.was_created {
                    "verifyOrCreateATA:created"
                } else {
                    "verifyOrCreateATA:exists"
                };
                info!(
                    operation,
                    label,
                    mint = %redact(&mint.to_string()),
                    owner = %redact(&owner.to_string()),
                    account = %redact(&resolved.address.to_string()),
                );
                Ok(resolved)
            }
            Err(err) => {
                let diagnostics = self.accounts.diagnose(mint, owner).await;
                Err(self.fail(
                    "verifyOrCreateATA",
                    request,
                    err,
                    vec![
                        ("label", label.to_string()),
                        ("ataAddress", redact(&diagnostics.account.to_string())),
                        ("mintExists", diagnostics.mint_exists.to_string()),
                        ("isForFeeWallet", (*owner == self.config.fee_wallet).to_string()),
                    ],
                ))
            }
        }
    }

    async fn build_transaction(
        &self,
        request: &SwapRequest,
        requester: &Pubkey,
        output_account: &Pubkey,
        fee_leg: Option<(FeeTransfer, Pubkey)>,
    ) -> Result<BuiltTransaction, SwapError> {
        let slippage_bps = request.effective_slippage_bps();

        let instruction_set = self
            .aggregator
            .fetch(
                &request.quote,
                requester,
                request.priority_fee_lamports,
                Some(output_account),
                slippage_bps,
            )
            .await
            .map_err(|err| {
                self.fail(
                    "fetchSwapInstructions",
                    request,
                    err,
                    vec![
                        ("outputAta", redact(&output_account.to_string())),
                        ("slippageBps", slippage_bps.to_string()),
                        (
                            "priorityFee",
                            request
                                .priority_fee_lamports
                                .map_or_else(|| "none".to_string(), |fee| fee.to_string()),
                        ),
                    ],
                )
            })?;

        let lookup_tables = self
            .lookup_tables
            .resolve(&instruction_set.address_lookup_table_addresses)
            .await
            .map_err(|err| {
                self.fail(
                    "getAddressLookupTableAccounts",
                    request,
                    err,
                    vec![(
                        "lookupTableCount",
                        instruction_set.address_lookup_table_addresses.len().to_string(),
                    )],
                )
            })?;

        let fee_instruction = fee_leg
            .map_or(Ok(None), |(transfer, token_program)| {
                self.fees.build(&transfer, requester, &token_program)
            })
            .map_err(|err| {
                self.fail(
                    "createFeeTransferInstruction",
                    request,
                    err,
                    vec![(
                        "feeAmount",
                        request.fee_amount.clone().unwrap_or_default(),
                    )],
                )
            })?;

        let block = self
            .ledger
            .get_latest_block_reference()
            .await
            .map_err(|err| self.fail("getLatestBlockhash", request, err, Vec::new()))?;

        let compiled = compiler::compile(
            requester,
            block.blockhash,
            &instruction_set,
            fee_instruction.as_ref(),
            &lookup_tables,
        )
        .map_err(|err| {
            self.fail(
                "buildSwapTransaction",
                request,
                err,
                vec![
                    ("instructionCount", instruction_set.instructions.len().to_string()),
                    ("hasFeeTransfer", fee_instruction.is_some().to_string()),
                ],
            )
        })?;

        let last_valid_block_height = instruction_set
            .last_valid_block_height
            .unwrap_or(block.last_valid_block_height);

        Ok(BuiltTransaction {
            compiled,
            lookup_tables,
            instruction_set,
            last_valid_block_height,
        })
    }

    async fn simulate(&self, request: &SwapRequest, built: &BuiltTransaction) -> Result<(), SwapError> {
        let result = self
            .simulator
            .simulate(&built.compiled.transaction, &built.lookup_tables)
            .await;

        match result {
            Ok(report) if report.succeeded() => Ok(()),
            Ok(report) => {
                let err = SwapError::SimulationFailed {
                    error: report.error.clone().unwrap_or_default(),
                    logs: report.logs.clone(),
                };
                self.report(
                    Severity::Warning,
                    "simulateTransaction",
                    request,
                    &err,
                    vec![
                        ("simulationLogs", report.logs.join(" | ")),
                        ("errorCode", report.error.clone().unwrap_or_default()),
                        ("lookupTableCount", report.lookup_table_count.to_string()),
                    ],
                );
                warn!(
                    wallet = %redact(&request.wallet_address),
                    units_consumed = ?report.units_consumed,
                    mode = ?self.simulator.mode(),
                    "simulation failed"
                );
                self.simulator.enforce(&report)
            }
            Err(err) => {
                self.report(Severity::Warning, "simulateTransaction", request, &err, Vec::new());
                match self.simulator.mode() {
                    SimulationMode::Advisory => Ok(()),
                    SimulationMode::Strict => Err(err),
                }
            }
        }
    }

    fn fail(
        &self,
        operation: &str,
        request: &SwapRequest,
        err: SwapError,
        details: Vec<(&str, String)>,
    ) -> SwapError {
        self.report(Severity::Error, operation, request, &err, details);
        err
    }

    fn report(
        &self,
        severity: Severity,
        operation: &str,
        request: &SwapRequest,
        err: &SwapError,
        details: Vec<(&str, String)>,
    ) {
        let report = details.into_iter().fold(
            ErrorReport::new(severity, operation, &err.to_string())
                .with_address("wallet", Some(request.wallet_address.as_str()))
                .with_address("mint", Some(request.mint_address.as_str()))
                .with("errorType", err.kind().as_str()),
            |report, (key, value)| report.with(key, value),
        );
        self.sink.log_error(&report);
    }
}
