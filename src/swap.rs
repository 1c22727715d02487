use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use crate::{parse_pubkey, quote::Quote, SwapError};

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsRequest<'a> {
    pub quote_response: &'a Quote,
    pub user_public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_account: Option<String>,
    pub slippage_bps: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prioritization_fee_lamports: Option<u64>,
    pub wrap_and_unwrap_sol: bool,
    pub dynamic_compute_unit_limit: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPayload {
    pub program_id: String,
    pub accounts: Vec<AccountMetaPayload>,
    pub data: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetaPayload {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructionsResponse {
    #[serde(default)]
    pub token_ledger_instruction: Option<InstructionPayload>,
    #[serde(default)]
    pub compute_budget_instructions: Vec<InstructionPayload>,
    #[serde(default)]
    pub setup_instructions: Vec<InstructionPayload>,
    pub swap_instruction: Option<InstructionPayload>,
    #[serde(default)]
    pub cleanup_instruction: Option<InstructionPayload>,
    #[serde(default)]
    pub other_instructions: Vec<InstructionPayload>,
    #[serde(default)]
    pub address_lookup_table_addresses: Vec<String>,
    #[serde(default)]
    pub last_valid_block_height: Option<u64>,
    #[serde(default)]
    pub compute_unit_limit: Option<u32>,
    #[serde(default)]
    pub prioritization_fee_lamports: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

/// Instructions returned by the aggregator for one quote. The order of
/// `instructions` is the route order and must be preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionSet {
    pub instructions: Vec<Instruction>,
    pub address_lookup_table_addresses: Vec<Pubkey>,
    pub compute_unit_limit: u32,
    pub prioritization_fee_lamports: u64,
    pub last_valid_block_height: Option<u64>,
}

impl TryFrom<SwapInstructionsResponse> for InstructionSet {
    type Error = SwapError;

    fn try_from(response: SwapInstructionsResponse) -> Result<Self, Self::Error> {
        let swap_instruction = response
            .swap_instruction
            .ok_or_else(|| SwapError::InvalidQuote("swapInstruction is missing".to_string()))?;

        let ordered = response
            .compute_budget_instructions
            .into_iter()
            .chain(response.setup_instructions)
            .chain(response.token_ledger_instruction)
            .chain(std::iter::once(swap_instruction))
            .chain(response.cleanup_instruction)
            .chain(response.other_instructions);

        let instructions = ordered
            .map(instruction_from_payload)
            .collect::<Result<Vec<_>, _>>()?;

        let address_lookup_table_addresses = response
            .address_lookup_table_addresses
            .iter()
            .map(|address| {
                parse_pubkey(address).ok_or_else(|| {
                    SwapError::InvalidQuote(format!("invalid lookup table address {address}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            instructions,
            address_lookup_table_addresses,
            compute_unit_limit: response.compute_unit_limit.unwrap_or(0),
            prioritization_fee_lamports: response.prioritization_fee_lamports.unwrap_or(0),
            last_valid_block_height: response.last_valid_block_height,
        })
    }
}

fn instruction_from_payload(payload: InstructionPayload) -> Result<Instruction, SwapError> {
    let program_id = parse_pubkey(&payload.program_id).ok_or_else(|| {
        SwapError::InvalidQuote(format!("invalid program id {}", payload.program_id))
    })?;

    let accounts = payload
        .accounts
        .iter()
        .map(|meta| {
            let pubkey = parse_pubkey(&meta.pubkey).ok_or_else(|| {
                SwapError::InvalidQuote(format!("invalid account {}", meta.pubkey))
            })?;
            Ok(AccountMeta {
                pubkey,
                is_signer: meta.is_signer,
                is_writable: meta.is_writable,
            })
        })
        .collect::<Result<Vec<_>, SwapError>>()?;

    let data = STANDARD
        .decode(&payload.data)
        .map_err(|e| SwapError::InvalidQuote(format!("instruction data is not base64: {e}")))?;

    Ok(Instruction {
        program_id,
        accounts,
        data,
    })
}

/// What the caller receives: an unsigned transaction plus the metadata needed
/// to decide when it has expired.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransaction {
    pub transaction_base64: String,
    pub last_valid_block_height: u64,
    pub compute_unit_limit: u32,
    pub prioritization_fee_lamports: u64,
}
