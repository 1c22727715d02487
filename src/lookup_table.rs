use std::{collections::HashSet, sync::Arc};

use solana_address_lookup_table_interface::state::AddressLookupTable;
use solana_sdk::{message::AddressLookupTableAccount, pubkey::Pubkey};
use tracing::debug;

use crate::{rpc::LedgerRpc, SwapError};

const MAX_ACCOUNTS_PER_CALL: usize = 100;

/// Loads the lookup tables an instruction set refers to, in the order given.
pub struct LookupTableResolver {
    ledger: Arc<dyn LedgerRpc>,
}

impl LookupTableResolver {
    pub fn new(ledger: Arc<dyn LedgerRpc>) -> Self {
        Self { ledger }
    }

    pub async fn resolve(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<AddressLookupTableAccount>, SwapError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::with_capacity(addresses.len());
        let unique: Vec<Pubkey> = addresses
            .iter()
            .copied()
            .filter(|address| seen.insert(*address))
            .collect();

        let mut tables = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(MAX_ACCOUNTS_PER_CALL) {
            let accounts = self.ledger.get_multiple_accounts(chunk).await?;
            if accounts.len() != chunk.len() {
                return Err(SwapError::UpstreamUnavailable(format!(
                    "getMultipleAccounts returned {} entries for {} addresses",
                    accounts.len(),
                    chunk.len()
                )));
            }

            for (address, account) in chunk.iter().zip(accounts) {
                let account = account.ok_or_else(|| SwapError::LookupTableNotFound {
                    address: *address,
                    reason: "account does not exist".to_string(),
                })?;

                let table = AddressLookupTable::deserialize(&account.data).map_err(|e| {
                    SwapError::LookupTableNotFound {
                        address: *address,
                        reason: format!("not a lookup table: {e}"),
                    }
                })?;

                debug!(table = %address, addresses = table.addresses.len(), "loaded lookup table");
                tables.push(AddressLookupTableAccount {
                    key: *address,
                    addresses: table.addresses.to_vec(),
                });
            }
        }

        Ok(tables)
    }
}
