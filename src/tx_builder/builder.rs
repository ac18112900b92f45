//! Core transaction assembly and submission.
//!
//! `build` binds an instruction list to a freshly fetched validity window;
//! `sign` resolves the minimal signer set through the authority registry and
//! serializes; `submit` hands the bytes to the ledger. Signer resolution is
//! where revoked authorities die: a required role that is revoked or unbound
//! fails before anything reaches the wire.

use std::sync::Arc;

use solana_sdk::{
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use tracing::debug;

use crate::authority::AuthorityRegistry;
use crate::error::{LifecycleError, Result};
use crate::ledger::LedgerClient;
use crate::tx_builder::pending::{PendingTransaction, TxStatus};
use crate::wallet::WalletManager;

/// Assembles, signs, and submits pending transactions.
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    payer: Arc<WalletManager>,
}

/// How a required signer key gets its keypair.
enum ResolvedSigner {
    Payer,
    Wallet(usize),
    Ephemeral(usize),
}

impl TransactionBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>, payer: Arc<WalletManager>) -> Self {
        Self { ledger, payer }
    }

    pub fn payer_pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    /// Bind `instructions` to a fresh validity window.
    pub async fn build(&self, instructions: Vec<Instruction>) -> Result<PendingTransaction> {
        if instructions.is_empty() {
            return Err(LifecycleError::internal(
                "refusing to build an empty transaction",
            ));
        }
        let (blockhash, expiry_height) = self.ledger.latest_reference_point().await?;
        debug!(
            instruction_count = instructions.len(),
            expiry_height, "Built pending transaction"
        );
        Ok(PendingTransaction::new(
            instructions,
            self.payer.pubkey(),
            blockhash,
            expiry_height,
        ))
    }

    /// Resolve the minimal signer set and sign.
    ///
    /// Each required key must be the fee payer, a role wallet in the
    /// registry, or one of `ephemeral_signers` (e.g. a freshly generated
    /// mint account keypair). A key held by a revoked role fails with
    /// `SignerUnavailable`; a key nothing covers fails with `Signing`.
    pub fn sign(
        &self,
        tx: &mut PendingTransaction,
        registry: &AuthorityRegistry,
        ephemeral_signers: &[&Keypair],
    ) -> Result<()> {
        if tx.status != TxStatus::Built {
            return Err(LifecycleError::internal(format!(
                "sign called on transaction in state {:?}",
                tx.status
            )));
        }

        let required = tx.required_signer_keys();
        let mut plan: Vec<ResolvedSigner> = Vec::with_capacity(required.len());
        let mut role_wallets: Vec<Arc<WalletManager>> = Vec::new();
        let mut roles = Vec::new();

        for key in &required {
            if *key == self.payer.pubkey() {
                plan.push(ResolvedSigner::Payer);
            } else if let Some(role) = registry.role_of(key) {
                let wallet = registry.signer_for(role)?;
                roles.push(role);
                role_wallets.push(wallet);
                plan.push(ResolvedSigner::Wallet(role_wallets.len() - 1));
            } else if let Some(position) = ephemeral_signers
                .iter()
                .position(|keypair| keypair.pubkey() == *key)
            {
                plan.push(ResolvedSigner::Ephemeral(position));
            } else {
                return Err(LifecycleError::Signing(format!(
                    "no signer available for required key {key}"
                )));
            }
        }

        let signers: Vec<&Keypair> = plan
            .iter()
            .map(|resolved| match resolved {
                ResolvedSigner::Payer => self.payer.keypair(),
                ResolvedSigner::Wallet(index) => role_wallets[*index].keypair(),
                ResolvedSigner::Ephemeral(index) => ephemeral_signers[*index],
            })
            .collect();

        let message =
            Message::new_with_blockhash(&tx.instructions, Some(&tx.fee_payer), &tx.blockhash);
        let mut transaction = Transaction::new_unsigned(message);
        transaction
            .try_sign(&signers, tx.blockhash)
            .map_err(|err| LifecycleError::Signing(err.to_string()))?;

        let bytes = bincode::serialize(&transaction)
            .map_err(|err| LifecycleError::internal(format!("serialization failed: {err}")))?;

        tx.required_roles = roles;
        tx.serialized = Some(bytes);
        tx.status = TxStatus::Signed;
        Ok(())
    }

    /// Submit the signed bytes, recording the assigned signature id.
    pub async fn submit(&self, tx: &mut PendingTransaction) -> Result<Signature> {
        if tx.status != TxStatus::Signed {
            return Err(LifecycleError::internal(format!(
                "submit called on transaction in state {:?}",
                tx.status
            )));
        }
        let bytes = tx
            .serialized
            .as_deref()
            .ok_or_else(|| LifecycleError::internal("signed transaction lost its bytes"))?;

        let signature = self.ledger.send_serialized(bytes).await?;
        debug!(signature = %signature, "Submitted transaction");
        tx.signature = Some(signature);
        tx.status = TxStatus::Submitted;
        Ok(signature)
    }
}
