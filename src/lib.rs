//! mintforge - SPL Token-2022 launch orchestrator
//!
//! Provisions and evolves a fungible token on Solana: creates an
//! extension-enabled mint, attaches metadata, provisions holding accounts,
//! mints the initial supply, optionally applies a transfer fee, and - as an
//! irrevocable final step - revokes minting and metadata-update capability so
//! the token's supply and identity become permanently fixed.

pub mod authority;
pub mod config;
pub mod derive;
pub mod error;
pub mod fee;
pub mod gate;
pub mod ledger;
pub mod lifecycle;
pub mod retry;
pub mod tx_builder;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use authority::{AuthorityRegistry, AuthorityRole};
pub use error::LifecycleError;
pub use lifecycle::{LifecycleStage, TokenLifecycle};

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
