//! Persisted lifecycle record and its store.
//!
//! One JSON record carries everything the lifecycle needs to resume after a
//! crash or between separately invoked commands: the network endpoint, the
//! wallet bound to each authority role, the holder wallets, the current
//! stage, and the token sub-record once a mint exists. The store replaces
//! the file atomically (write-temp-then-rename) so a crash mid-stage never
//! leaves a partial record behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::authority::{AuthorityRegistry, AuthorityRole};
use crate::error::{LifecycleError, Result};
use crate::fee::TransferFeeParams;
use crate::lifecycle::LifecycleStage;
use crate::wallet::WalletManager;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// RPC endpoint URL.
    pub endpoint: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

/// One wallet reference: always a public key, plus a keypair path when this
/// process is expected to sign with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEntry {
    pub public_key: String,
    #[serde(default)]
    pub keypair_path: Option<String>,
}

impl WalletEntry {
    pub fn pubkey(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.public_key).map_err(|err| {
            LifecycleError::config(format!("invalid public key {}: {err}", self.public_key))
        })
    }

    /// Load the signing wallet, verifying it matches the declared key.
    pub fn load_wallet(&self) -> Result<Arc<WalletManager>> {
        let path = self.keypair_path.as_deref().ok_or_else(|| {
            LifecycleError::config(format!("no keypair path for wallet {}", self.public_key))
        })?;
        let wallet = WalletManager::from_file(path)
            .map_err(|err| LifecycleError::config(format!("{err:#}")))?;
        if wallet.pubkey() != self.pubkey()? {
            return Err(LifecycleError::config(format!(
                "keypair at {path} does not match declared key {}",
                self.public_key
            )));
        }
        Ok(Arc::new(wallet))
    }
}

/// Token metadata as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEntry {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub mutable: bool,
}

/// The token sub-record, written once the mint exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub mint_address: String,
    pub decimals: u8,
    pub program_id: String,
    #[serde(default)]
    pub supply: u64,
    /// Current key per role; `None` means the role has been revoked.
    pub authorities: BTreeMap<AuthorityRole, Option<String>>,
    pub extensions: Vec<String>,
    #[serde(default)]
    pub transfer_fee: Option<TransferFeeParams>,
    #[serde(default)]
    pub metadata: Option<MetadataEntry>,
    /// Holder name to associated-token-account address.
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
}

/// The full persisted lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRecord {
    pub network: NetworkConfig,
    /// Fee payer for every lifecycle transaction.
    pub payer: WalletEntry,
    pub authorities: BTreeMap<AuthorityRole, WalletEntry>,
    /// Token holders to provision accounts for (e.g. treasury, fee collector).
    pub holders: BTreeMap<String, WalletEntry>,
    #[serde(default)]
    pub stage: LifecycleStage,
    #[serde(default)]
    pub token: Option<TokenRecord>,
}

impl LifecycleRecord {
    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if self.network.endpoint.is_empty() {
            return Err(LifecycleError::config("network endpoint is empty"));
        }
        self.payer.pubkey()?;
        for entry in self.authorities.values() {
            entry.pubkey()?;
        }
        for entry in self.holders.values() {
            entry.pubkey()?;
        }
        Ok(())
    }

    /// Build the authority registry from the recorded role wallets,
    /// carrying over any revocations the token record already shows.
    pub fn build_registry(&self) -> Result<AuthorityRegistry> {
        let mut wallets = BTreeMap::new();
        for (role, entry) in &self.authorities {
            if entry.keypair_path.is_some() {
                wallets.insert(*role, entry.load_wallet()?);
            }
        }
        let registry = AuthorityRegistry::new(wallets);

        if let Some(token) = &self.token {
            for (role, key) in &token.authorities {
                if key.is_none() {
                    let was = self
                        .authorities
                        .get(role)
                        .map(|entry| entry.pubkey())
                        .transpose()?
                        .unwrap_or_default();
                    registry.mark_revoked(*role, was);
                }
            }
        }
        Ok(registry)
    }

    pub fn load_payer(&self) -> Result<Arc<WalletManager>> {
        self.payer.load_wallet()
    }

    pub fn holder(&self, name: &str) -> Result<&WalletEntry> {
        self.holders
            .get(name)
            .ok_or_else(|| LifecycleError::config(format!("unknown holder {name}")))
    }
}

/// Load/save interface for the lifecycle record.
pub struct LifecycleStateStore {
    path: PathBuf,
}

impl LifecycleStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<LifecycleRecord> {
        let content = std::fs::read_to_string(&self.path).map_err(|err| {
            LifecycleError::config(format!("cannot read {}: {err}", self.path.display()))
        })?;
        let record: LifecycleRecord = serde_json::from_str(&content).map_err(|err| {
            LifecycleError::config(format!("malformed record {}: {err}", self.path.display()))
        })?;
        record.validate()?;
        Ok(record)
    }

    /// Write the record atomically: serialize to a temp file in the same
    /// directory, fsync, then rename over the target.
    pub fn save_atomic(&self, record: &LifecycleRecord) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir).map_err(|err| {
            LifecycleError::config(format!("cannot create temp file in {}: {err}", dir.display()))
        })?;
        serde_json::to_writer_pretty(&mut tmp, record)
            .map_err(|err| LifecycleError::config(format!("cannot serialize record: {err}")))?;
        tmp.as_file()
            .sync_all()
            .map_err(|err| LifecycleError::config(format!("cannot sync record: {err}")))?;
        tmp.persist(&self.path).map_err(|err| {
            LifecycleError::config(format!("cannot replace {}: {err}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), stage = %record.stage, "Lifecycle record saved");
        Ok(())
    }
}
