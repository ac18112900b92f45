//! Deterministic program-owned address derivation.
//!
//! A program-derived address must not be a valid curve point. The raw hash of
//! a seed set can land on the curve, so derivation appends a single bump byte
//! and searches candidates in descending order from 255, returning the first
//! off-curve result. Identical seeds and owning program always yield the same
//! address; no network access is involved.

use solana_sdk::pubkey::{Pubkey, PubkeyError};

use crate::error::{LifecycleError, Result};

/// Derive a program-owned address from `seeds` under `owning_program`.
///
/// Returns the address and the bump byte that produced it. Exhausting the
/// full bump range without an off-curve candidate is cryptographically
/// near-impossible but still surfaces as a fatal error rather than a panic.
pub fn derive(seeds: &[&[u8]], owning_program: &Pubkey) -> Result<(Pubkey, u8)> {
    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut candidate: Vec<&[u8]> = Vec::with_capacity(seeds.len() + 1);
        candidate.extend_from_slice(seeds);
        candidate.push(&bump_seed);

        match Pubkey::create_program_address(&candidate, owning_program) {
            Ok(address) => return Ok((address, bump)),
            // Candidate landed on the curve; try the next bump down.
            Err(PubkeyError::InvalidSeeds) => continue,
            Err(err) => {
                return Err(LifecycleError::internal(format!(
                    "address derivation failed: {err}"
                )))
            }
        }
    }
    Err(LifecycleError::AddressDerivationExhausted)
}

/// Associated token account address for `owner` holding `mint` under the
/// Token-2022 program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
    let token_program = spl_token_2022::id();
    derive(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &spl_associated_token_account::id(),
    )
    .map(|(address, _)| address)
}

/// Metadata account address for `mint` under the token-metadata program.
pub fn metadata_address(mint: &Pubkey) -> Result<Pubkey> {
    let program = mpl_token_metadata::ID;
    derive(&[b"metadata", program.as_ref(), mint.as_ref()], &program).map(|(address, _)| address)
}
