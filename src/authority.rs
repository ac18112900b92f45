//! Authority roles and the role-to-signer registry.
//!
//! Roles are a closed enumeration; each maps to a binding that is either a
//! signing wallet, `Revoked` (terminal), or unbound. Revocation is one-way:
//! once a role is revoked, resolving it fails with `SignerUnavailable` and
//! nothing downstream ever constructs a transaction for it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{LifecycleError, Result};
use crate::wallet::WalletManager;

/// The capabilities a token carries, as a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorityRole {
    MintAuthority,
    FreezeAuthority,
    UpdateAuthority,
    FeeAuthority,
    WithdrawWithheldAuthority,
}

impl AuthorityRole {
    pub const ALL: [AuthorityRole; 5] = [
        AuthorityRole::MintAuthority,
        AuthorityRole::FreezeAuthority,
        AuthorityRole::UpdateAuthority,
        AuthorityRole::FeeAuthority,
        AuthorityRole::WithdrawWithheldAuthority,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityRole::MintAuthority => "mint authority",
            AuthorityRole::FreezeAuthority => "freeze authority",
            AuthorityRole::UpdateAuthority => "update authority",
            AuthorityRole::FeeAuthority => "fee authority",
            AuthorityRole::WithdrawWithheldAuthority => "withdraw-withheld authority",
        }
    }
}

impl fmt::Display for AuthorityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a role currently resolves to.
///
/// `Revoked` keeps the former public key so the registry can still answer
/// reverse lookups for it and fail them with the right error.
pub enum AuthorityBinding {
    Bound(Arc<WalletManager>),
    Revoked { was: Pubkey },
    Unbound,
}

/// Total mapping from role to binding.
///
/// Built once at load; the only permitted mutation afterwards is the one-way
/// [`AuthorityRegistry::revoke`]. Safe to share across concurrent lifecycle
/// instances.
pub struct AuthorityRegistry {
    bindings: RwLock<BTreeMap<AuthorityRole, AuthorityBinding>>,
}

impl AuthorityRegistry {
    /// Build a registry from the wallets bound at load time. Roles absent
    /// from `wallets` are `Unbound`.
    pub fn new(wallets: BTreeMap<AuthorityRole, Arc<WalletManager>>) -> Self {
        let mut bindings = BTreeMap::new();
        for role in AuthorityRole::ALL {
            bindings.insert(role, AuthorityBinding::Unbound);
        }
        for (role, wallet) in wallets {
            bindings.insert(role, AuthorityBinding::Bound(wallet));
        }
        Self {
            bindings: RwLock::new(bindings),
        }
    }

    /// Mark a role as revoked without a live wallet, e.g. when resuming a
    /// lifecycle whose persisted record already shows the revocation.
    pub fn mark_revoked(&self, role: AuthorityRole, was: Pubkey) {
        self.bindings
            .write()
            .insert(role, AuthorityBinding::Revoked { was });
    }

    /// Resolve a role to its signing wallet.
    pub fn signer_for(&self, role: AuthorityRole) -> Result<Arc<WalletManager>> {
        match self.bindings.read().get(&role) {
            Some(AuthorityBinding::Bound(wallet)) => Ok(Arc::clone(wallet)),
            Some(AuthorityBinding::Revoked { .. }) => Err(LifecycleError::signer_unavailable(
                role,
                "authority has been revoked",
            )),
            _ => Err(LifecycleError::signer_unavailable(
                role,
                "no signing wallet bound",
            )),
        }
    }

    /// Public key currently bound to a role, if any.
    pub fn pubkey_of(&self, role: AuthorityRole) -> Option<Pubkey> {
        match self.bindings.read().get(&role) {
            Some(AuthorityBinding::Bound(wallet)) => Some(wallet.pubkey()),
            _ => None,
        }
    }

    /// Reverse lookup: which role does this key hold (or formerly hold)?
    pub fn role_of(&self, key: &Pubkey) -> Option<AuthorityRole> {
        for (role, binding) in self.bindings.read().iter() {
            let matches = match binding {
                AuthorityBinding::Bound(wallet) => wallet.pubkey() == *key,
                AuthorityBinding::Revoked { was } => was == key,
                AuthorityBinding::Unbound => false,
            };
            if matches {
                return Some(*role);
            }
        }
        None
    }

    pub fn is_revoked(&self, role: AuthorityRole) -> bool {
        matches!(
            self.bindings.read().get(&role),
            Some(AuthorityBinding::Revoked { .. })
        )
    }

    /// Irreversibly revoke a role. Returns the public key the role held.
    ///
    /// Revoking an already-revoked or unbound role fails with
    /// `SignerUnavailable`; there is no path back to `Bound`.
    pub fn revoke(&self, role: AuthorityRole) -> Result<Pubkey> {
        let mut bindings = self.bindings.write();
        match bindings.get(&role) {
            Some(AuthorityBinding::Bound(wallet)) => {
                let was = wallet.pubkey();
                bindings.insert(role, AuthorityBinding::Revoked { was });
                Ok(was)
            }
            Some(AuthorityBinding::Revoked { .. }) => Err(LifecycleError::signer_unavailable(
                role,
                "authority has been revoked",
            )),
            _ => Err(LifecycleError::signer_unavailable(
                role,
                "no signing wallet bound",
            )),
        }
    }
}
