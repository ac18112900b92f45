//! Wallet management module

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use tracing::{info, warn};

use crate::ledger::LedgerClient;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Wallet manager holding one exclusively-owned keypair.
///
/// Loaded once at startup; never mutated; the secret is never logged.
#[derive(Debug)]
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Create a new wallet manager from a keypair file.
    ///
    /// Accepts either raw 64-byte keypair files or the JSON byte-array
    /// format the ledger tooling writes.
    pub fn from_file(path: &str) -> Result<Self> {
        let keypair_bytes =
            std::fs::read(path).with_context(|| format!("Failed to read keypair file: {}", path))?;

        let keypair = if keypair_bytes.len() == 64 {
            // Raw bytes format - validate before conversion
            if keypair_bytes.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(keypair_bytes.as_slice()).context("Invalid keypair bytes")?
        } else {
            // JSON format
            let json: Vec<u8> = serde_json::from_slice(&keypair_bytes)
                .context("Failed to parse keypair JSON")?;
            if json.len() != 64 {
                anyhow::bail!(
                    "Invalid keypair length: expected 64 bytes, got {}",
                    json.len()
                );
            }
            if json.iter().all(|&b| b == 0) {
                anyhow::bail!("Invalid keypair: all-zero key rejected");
            }
            Keypair::try_from(json.as_slice()).context("Invalid keypair from JSON")?
        };

        Ok(Self {
            keypair: Arc::new(keypair),
        })
    }

    /// Create a new wallet manager from a keypair.
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Get the public key.
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Get a reference to the keypair.
    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Get an Arc reference to the keypair.
    pub fn keypair_arc(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

/// Request faucet airdrops for a set of wallets, spacing consecutive
/// requests by a fixed cooldown so the faucet does not throttle us.
///
/// The cooldown is a fixed inter-call delay, not a retry policy: a failed
/// airdrop for one wallet is logged and skipped, and the next request still
/// waits out the cooldown.
pub async fn fund_with_cooldown(
    ledger: &dyn LedgerClient,
    recipients: &[(String, Pubkey)],
    lamports: u64,
    cooldown: Duration,
) {
    for (index, (label, address)) in recipients.iter().enumerate() {
        if index > 0 {
            tokio::time::sleep(cooldown).await;
        }
        match ledger.request_airdrop(address, lamports).await {
            Ok(signature) => {
                info!(
                    wallet = %label,
                    address = %address,
                    lamports = lamports,
                    signature = %signature,
                    "Airdrop requested"
                );
            }
            Err(err) => {
                warn!(
                    wallet = %label,
                    address = %address,
                    error = %err,
                    "Airdrop request failed"
                );
            }
        }
    }
}
