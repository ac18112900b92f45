//! Ledger client interface and its RPC-backed implementation.
//!
//! The orchestrator talks to the ledger exclusively through [`LedgerClient`]:
//! fetch a validity window, send serialized bytes, poll execution status, and
//! read balances. Production wires in [`RpcLedgerClient`]; tests script a
//! mock implementation of the same trait.

use async_trait::async_trait;
use solana_client::{
    client_error::ClientError,
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};

use crate::error::{LifecycleError, Result};

/// Observable fate of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Not yet visible at the tracked commitment.
    Pending,
    /// Executed successfully.
    Succeeded,
    /// Executed and failed; carries the ledger-reported error payload.
    Failed(String),
}

/// Minimal view of an existing account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data_len: usize,
}

/// External ledger interface consumed by the lifecycle core.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fresh reference blockhash plus the height at which it stops being
    /// valid.
    async fn latest_reference_point(&self) -> Result<(Hash, u64)>;

    /// Submit serialized transaction bytes, returning the signature id.
    async fn send_serialized(&self, bytes: &[u8]) -> Result<Signature>;

    /// Execution status of a previously submitted signature.
    async fn execution_status(&self, signature: &Signature) -> Result<ExecutionStatus>;

    /// Current block height.
    async fn current_height(&self) -> Result<u64>;

    /// Native balance in lamports.
    async fn balance(&self, address: &Pubkey) -> Result<u64>;

    /// Raw token balance of a token account.
    async fn token_account_balance(&self, address: &Pubkey) -> Result<u64>;

    /// Account summary, or `None` if the account does not exist.
    async fn account_info(&self, address: &Pubkey) -> Result<Option<AccountSummary>>;

    /// Minimum lamports for rent exemption at the given account size.
    async fn minimum_rent_exempt_balance(&self, space: usize) -> Result<u64>;

    /// Request a faucet airdrop (test networks only).
    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature>;
}

/// RPC-backed ledger client.
pub struct RpcLedgerClient {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl RpcLedgerClient {
    pub fn new(endpoint: &str) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc: RpcClient::new_with_commitment(endpoint.to_string(), commitment),
            commitment,
        }
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn latest_reference_point(&self) -> Result<(Hash, u64)> {
        self.rpc
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(classify_client_error)
    }

    async fn send_serialized(&self, bytes: &[u8]) -> Result<Signature> {
        let transaction: Transaction = bincode::deserialize(bytes)
            .map_err(|err| LifecycleError::internal(format!("malformed transaction bytes: {err}")))?;

        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(5),
            ..Default::default()
        };
        self.rpc
            .send_transaction_with_config(&transaction, config)
            .await
            .map_err(classify_client_error)
    }

    async fn execution_status(&self, signature: &Signature) -> Result<ExecutionStatus> {
        let response = self
            .rpc
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify_client_error)?;

        match response.value.into_iter().next().flatten() {
            None => Ok(ExecutionStatus::Pending),
            Some(status) => {
                if let Some(err) = status.err {
                    Ok(ExecutionStatus::Failed(err.to_string()))
                } else if status.satisfies_commitment(self.commitment) {
                    Ok(ExecutionStatus::Succeeded)
                } else {
                    Ok(ExecutionStatus::Pending)
                }
            }
        }
    }

    async fn current_height(&self) -> Result<u64> {
        self.rpc
            .get_block_height()
            .await
            .map_err(classify_client_error)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        self.rpc
            .get_balance(address)
            .await
            .map_err(classify_client_error)
    }

    async fn token_account_balance(&self, address: &Pubkey) -> Result<u64> {
        let balance = self
            .rpc
            .get_token_account_balance(address)
            .await
            .map_err(classify_client_error)?;
        balance
            .amount
            .parse::<u64>()
            .map_err(|err| LifecycleError::internal(format!("unparseable token amount: {err}")))
    }

    async fn account_info(&self, address: &Pubkey) -> Result<Option<AccountSummary>> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(classify_client_error)?;
        Ok(response.value.map(|account| AccountSummary {
            owner: account.owner,
            lamports: account.lamports,
            data_len: account.data.len(),
        }))
    }

    async fn minimum_rent_exempt_balance(&self, space: usize) -> Result<u64> {
        self.rpc
            .get_minimum_balance_for_rent_exemption(space)
            .await
            .map_err(classify_client_error)
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        self.rpc
            .request_airdrop(address, lamports)
            .await
            .map_err(classify_client_error)
    }
}

/// Map an RPC client error onto the lifecycle taxonomy.
///
/// Preflight simulation failures are execution errors the ledger has already
/// decided on; everything else at this layer is transport and eligible for
/// retry.
fn classify_client_error(err: ClientError) -> LifecycleError {
    let message = err.to_string();
    let lower = message.to_lowercase();

    if lower.contains("insufficient funds")
        || lower.contains("custom program error")
        || lower.contains("simulation failed")
        || lower.contains("invalid account")
    {
        LifecycleError::Execution {
            stage: "preflight".to_string(),
            payload: message,
        }
    } else {
        LifecycleError::Transport(message)
    }
}
