use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, Error};
use solana_sdk::{message::AddressLookupTableAccount, transaction::VersionedTransaction};
use tracing::debug;

use crate::{rpc::LedgerRpc, SwapError};

/// Whether a failed dry run stops the pipeline.
///
/// `Advisory` is the default: a dry run against a block reference that is a
/// few slots old can fail even though the signed transaction would land, so
/// the failure is only recorded. `Strict` turns it into
/// [`SwapError::SimulationFailed`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SimulationMode {
    #[default]
    Advisory,
    Strict,
}

impl FromStr for SimulationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advisory" => Ok(Self::Advisory),
            "strict" => Ok(Self::Strict),
            _ => Err(anyhow!("{} is not a valid SimulationMode", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub error: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    pub lookup_table_count: usize,
}

impl SimulationReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct TransactionSimulator {
    ledger: Arc<dyn LedgerRpc>,
    mode: SimulationMode,
}

impl TransactionSimulator {
    pub fn new(ledger: Arc<dyn LedgerRpc>, mode: SimulationMode) -> Self {
        Self { ledger, mode }
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Dry-runs the transaction. An `Err` here is a transport failure; a
    /// program failure comes back as a report with `error` set.
    pub async fn simulate(
        &self,
        transaction: &VersionedTransaction,
        lookup_tables: &[AddressLookupTableAccount],
    ) -> Result<SimulationReport, SwapError> {
        let outcome = self.ledger.simulate_transaction(transaction).await?;
        debug!(
            units_consumed = ?outcome.units_consumed,
            failed = outcome.error.is_some(),
            "simulation finished"
        );
        Ok(SimulationReport {
            error: outcome.error,
            logs: outcome.logs,
            units_consumed: outcome.units_consumed,
            lookup_table_count: lookup_tables.len(),
        })
    }

    /// Applies the configured policy to a report.
    pub fn enforce(&self, report: &SimulationReport) -> Result<(), SwapError> {
        match (&report.error, self.mode) {
            (Some(error), SimulationMode::Strict) => Err(SwapError::SimulationFailed {
                error: error.clone(),
                logs: report.logs.clone(),
            }),
            _ => Ok(()),
        }
    }
}
