use base64::{engine::general_purpose::STANDARD, Engine};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, AddressLookupTableAccount, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};

use crate::{swap::InstructionSet, SwapError};

/// Largest serialized transaction the ledger accepts.
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Unsigned v0 transaction with placeholder signatures, ready to hand out.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledTransaction {
    pub transaction: VersionedTransaction,
    pub serialized: Vec<u8>,
}

impl CompiledTransaction {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.serialized)
    }

    pub fn instruction_count(&self) -> usize {
        self.transaction.message.instructions().len()
    }
}

/// Swap legs first, in aggregator order; the fee transfer, if any, last.
pub fn compile(
    requester: &Pubkey,
    blockhash: Hash,
    set: &InstructionSet,
    fee_instruction: Option<&Instruction>,
    lookup_tables: &[AddressLookupTableAccount],
) -> Result<CompiledTransaction, SwapError> {
    let mut instructions = Vec::with_capacity(set.instructions.len() + 1);
    instructions.extend(set.instructions.iter().cloned());
    instructions.extend(fee_instruction.cloned());

    let message = v0::Message::try_compile(requester, &instructions, lookup_tables, blockhash)
        .map_err(|e| SwapError::Compilation(e.to_string()))?;

    if message.instructions.len() != instructions.len() {
        return Err(SwapError::Compilation(format!(
            "compiled {} instructions, expected {}",
            message.instructions.len(),
            instructions.len()
        )));
    }
    if let (Some(fee), Some(last)) = (fee_instruction, message.instructions.last()) {
        let program = message
            .account_keys
            .get(usize::from(last.program_id_index))
            .copied();
        if program != Some(fee.program_id) || last.data != fee.data {
            return Err(SwapError::Compilation(
                "fee transfer is not the final instruction".to_string(),
            ));
        }
    }

    let signer_count = usize::from(message.header.num_required_signatures);
    let transaction = VersionedTransaction {
        signatures: vec![Signature::default(); signer_count],
        message: VersionedMessage::V0(message),
    };

    let serialized =
        bincode::serialize(&transaction).map_err(|e| SwapError::Compilation(e.to_string()))?;
    if serialized.len() > MAX_TRANSACTION_SIZE {
        return Err(SwapError::Compilation(format!(
            "transaction is {} bytes, limit is {MAX_TRANSACTION_SIZE}",
            serialized.len()
        )));
    }

    Ok(CompiledTransaction {
        transaction,
        serialized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::swap_leg;
    use solana_sdk::instruction::AccountMeta;

    fn instruction_set(requester: Pubkey, legs: usize) -> InstructionSet {
        InstructionSet {
            instructions: (0..legs)
                .map(|i| swap_leg(Pubkey::new_unique(), requester, vec![i as u8; 4]))
                .collect(),
            address_lookup_table_addresses: Vec::new(),
            compute_unit_limit: 200_000,
            prioritization_fee_lamports: 1_000,
            last_valid_block_height: Some(99),
        }
    }

    fn fee_transfer(requester: Pubkey) -> Instruction {
        Instruction {
            program_id: crate::account::TOKEN_PROGRAM_ID,
            accounts: vec![
                AccountMeta::new(Pubkey::new_unique(), false),
                AccountMeta::new_readonly(Pubkey::new_unique(), false),
                AccountMeta::new(Pubkey::new_unique(), false),
                AccountMeta::new_readonly(requester, true),
            ],
            data: vec![12, 232, 3, 0, 0, 0, 0, 0, 0, 6],
        }
    }

    #[test]
    fn identical_inputs_compile_identically() {
        let requester = Pubkey::new_unique();
        let set = instruction_set(requester, 3);
        let fee = fee_transfer(requester);
        let hash = Hash::new_from_array([3; 32]);

        let a = compile(&requester, hash, &set, Some(&fee), &[]).unwrap();
        let b = compile(&requester, hash, &set, Some(&fee), &[]).unwrap();
        assert_eq!(a.serialized, b.serialized);
    }

    #[test]
    fn fee_transfer_is_last() {
        let requester = Pubkey::new_unique();
        let set = instruction_set(requester, 4);
        let fee = fee_transfer(requester);

        let compiled = compile(&requester, Hash::default(), &set, Some(&fee), &[]).unwrap();
        let message = &compiled.transaction.message;
        let keys = message.static_account_keys();
        let programs: Vec<_> = message
            .instructions()
            .iter()
            .map(|ix| keys[usize::from(ix.program_id_index)])
            .collect();

        assert_eq!(compiled.instruction_count(), set.instructions.len() + 1);
        let expected: Vec<_> = set
            .instructions
            .iter()
            .map(|ix| ix.program_id)
            .chain(std::iter::once(fee.program_id))
            .collect();
        assert_eq!(programs, expected);
        assert_eq!(message.instructions().last().unwrap().data, fee.data);
    }

    #[test]
    fn no_fee_matches_plain_compilation() {
        let requester = Pubkey::new_unique();
        let set = instruction_set(requester, 2);
        let hash = Hash::new_from_array([9; 32]);

        let compiled = compile(&requester, hash, &set, None, &[]).unwrap();
        let direct = v0::Message::try_compile(&requester, &set.instructions, &[], hash).unwrap();

        assert_eq!(compiled.instruction_count(), 2);
        assert_eq!(compiled.transaction.message, VersionedMessage::V0(direct));
        assert_eq!(compiled.transaction.signatures, vec![Signature::default()]);
    }

    #[test]
    fn lookup_tables_shrink_the_transaction() {
        let requester = Pubkey::new_unique();
        let set = instruction_set(requester, 6);
        let table_addresses: Vec<Pubkey> = set
            .instructions
            .iter()
            .flat_map(|ix| ix.accounts.iter().skip(1).map(|meta| meta.pubkey))
            .collect();
        let table = AddressLookupTableAccount {
            key: Pubkey::new_unique(),
            addresses: table_addresses,
        };

        let without = compile(&requester, Hash::default(), &set, None, &[]).unwrap();
        let with = compile(&requester, Hash::default(), &set, None, &[table]).unwrap();

        assert!(with.serialized.len() < without.serialized.len());
        match &with.transaction.message {
            VersionedMessage::V0(message) => assert_eq!(message.address_table_lookups.len(), 1),
            VersionedMessage::Legacy(_) => panic!("expected v0 message"),
        }
    }

    #[test]
    fn oversized_transaction_is_rejected() {
        let requester = Pubkey::new_unique();
        let set = instruction_set(requester, 20);

        let err = compile(&requester, Hash::default(), &set, None, &[]).unwrap_err();
        assert!(matches!(err, SwapError::Compilation(_)));
    }

    #[test]
    fn base64_round_trips_to_serialized_bytes() {
        let requester = Pubkey::new_unique();
        let compiled =
            compile(&requester, Hash::default(), &instruction_set(requester, 1), None, &[])
                .unwrap();
        assert_eq!(STANDARD.decode(compiled.to_base64()).unwrap(), compiled.serialized);
    }
}
