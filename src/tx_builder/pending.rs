//! The per-submission transaction unit.

use std::collections::BTreeSet;

use solana_sdk::{hash::Hash, instruction::Instruction, pubkey::Pubkey, signature::Signature};

use crate::authority::AuthorityRole;

/// Status machine for one submission attempt.
///
/// `Confirmed`, `Failed`, and `Expired` are terminal; an expired unit is
/// discarded and a fresh one is built rather than resubmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Built,
    Signed,
    Submitted,
    Confirmed,
    Failed,
    Expired,
}

/// An ordered instruction list bound to a validity window.
#[derive(Debug)]
pub struct PendingTransaction {
    pub instructions: Vec<Instruction>,
    pub fee_payer: Pubkey,
    /// Authority roles that ended up signing, filled in by `sign`.
    pub required_roles: Vec<AuthorityRole>,
    /// Reference blockhash the unit was built against.
    pub blockhash: Hash,
    /// Height after which the submission can no longer execute.
    pub expiry_height: u64,
    pub status: TxStatus,
    pub(crate) serialized: Option<Vec<u8>>,
    pub(crate) signature: Option<Signature>,
}

impl PendingTransaction {
    pub(crate) fn new(
        instructions: Vec<Instruction>,
        fee_payer: Pubkey,
        blockhash: Hash,
        expiry_height: u64,
    ) -> Self {
        Self {
            instructions,
            fee_payer,
            required_roles: Vec::new(),
            blockhash,
            expiry_height,
            status: TxStatus::Built,
            serialized: None,
            signature: None,
        }
    }

    /// Signature id assigned at submission.
    pub fn signature(&self) -> Option<Signature> {
        self.signature
    }

    /// Serialized bytes produced by signing.
    pub fn serialized_bytes(&self) -> Option<&[u8]> {
        self.serialized.as_deref()
    }

    /// The minimal signer set: every account an instruction marks as a
    /// signer, plus the fee payer.
    pub fn required_signer_keys(&self) -> BTreeSet<Pubkey> {
        let mut keys = BTreeSet::new();
        keys.insert(self.fee_payer);
        for instruction in &self.instructions {
            for meta in &instruction.accounts {
                if meta.is_signer {
                    keys.insert(meta.pubkey);
                }
            }
        }
        keys
    }
}
