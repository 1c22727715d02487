use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

use crate::{
    account::{AccountResolver, TOKEN_2022_PROGRAM_ID},
    parse_pubkey,
    quote::SwapRequest,
    SwapError,
};

/// The designated asset protocol fees are paid in.
///
/// `token_program` is the fallback for when the mint's owner has not been read
/// yet; the program that actually owns the mint wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeAsset {
    pub mint: Pubkey,
    pub decimals: u8,
    pub token_program: Pubkey,
}

/// Fee leg of a request, parsed and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeTransfer {
    pub destination: Pubkey,
    pub amount: u64,
}

impl FeeTransfer {
    pub fn is_active(&self) -> bool {
        self.amount > 0
    }
}

/// Builds the optional protocol-fee transfer from the requester's fee-asset
/// account to the configured collection account. Never creates accounts.
pub struct FeeInstructionBuilder {
    asset: FeeAsset,
}

impl FeeInstructionBuilder {
    pub fn new(asset: FeeAsset) -> Self {
        Self { asset }
    }

    pub fn asset(&self) -> &FeeAsset {
        &self.asset
    }

    /// `None` when the request carries no collection account. A malformed
    /// account or amount fails here, before anything touches the ledger.
    pub fn parse_request(&self, request: &SwapRequest) -> Result<Option<FeeTransfer>, SwapError> {
        let Some(destination) = request
            .fee_token_account
            .as_deref()
            .map(str::trim)
            .filter(|account| !account.is_empty())
        else {
            return Ok(None);
        };

        let destination = parse_pubkey(destination)
            .ok_or_else(|| SwapError::FeeAccountInvalid(format!("cannot parse {destination}")))?;
        let amount = match request.fee_amount.as_deref() {
            Some(raw) => parse_base_units(raw)?,
            None => 0,
        };

        Ok(Some(FeeTransfer {
            destination,
            amount,
        }))
    }

    /// Transfer instruction for an active fee, `None` for a zero amount.
    /// `token_program` must be the owner of the fee mint.
    pub fn build(
        &self,
        transfer: &FeeTransfer,
        requester: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Option<Instruction>, SwapError> {
        if !transfer.is_active() {
            return Ok(None);
        }

        let source = AccountResolver::derive(&self.asset.mint, requester, token_program);

        let instruction = if *token_program == TOKEN_2022_PROGRAM_ID {
            spl_token_2022_interface::instruction::transfer_checked(
                token_program,
                &source,
                &self.asset.mint,
                &transfer.destination,
                requester,
                &[],
                transfer.amount,
                self.asset.decimals,
            )
            .map_err(|e| SwapError::FeeAccountInvalid(format!("fee transfer: {e}")))?
        } else {
            spl_token_interface::instruction::transfer_checked(
                token_program,
                &source,
                &self.asset.mint,
                &transfer.destination,
                requester,
                &[],
                transfer.amount,
                self.asset.decimals,
            )
            .map_err(|e| SwapError::FeeAccountInvalid(format!("fee transfer: {e}")))?
        };

        Ok(Some(instruction))
    }

    /// Parses and builds in one step under the configured asset program.
    pub fn build_if_requested(
        &self,
        request: &SwapRequest,
        requester: &Pubkey,
    ) -> Result<Option<Instruction>, SwapError> {
        match self.parse_request(request)? {
            Some(transfer) => self.build(&transfer, requester, &self.asset.token_program),
            None => Ok(None),
        }
    }
}

/// Parses a base-10 integer amount in the asset's smallest unit.
pub fn parse_base_units(raw: &str) -> Result<u64, SwapError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SwapError::InvalidFeeAmount(format!(
            "{raw:?} is not a whole number of base units"
        )));
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| SwapError::InvalidFeeAmount(format!("{raw:?} does not fit in u64")))
}
