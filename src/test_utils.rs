//! Test utilities: a scriptable in-memory ledger.
//!
//! `MockLedger` implements [`LedgerClient`] entirely in memory. Tests queue
//! per-submission behaviors (confirm after N polls, fail on-chain, never
//! land, reject the send) and inspect everything that was submitted.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::{hashv, Hash},
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};

use crate::error::{LifecycleError, Result};
use crate::ledger::{AccountSummary, ExecutionStatus, LedgerClient};

/// What the mock does with the next submission.
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Accept; report success after this many pending polls.
    ConfirmAfterPolls(u32),
    /// Accept; report an on-chain execution failure with this payload.
    FailExecution(String),
    /// Accept; never report any status, so the validity window lapses.
    NeverLand,
    /// Reject the send itself with a transport error.
    TransportError(String),
}

enum Terminal {
    Success,
    Failure(String),
    Never,
}

struct SignatureState {
    polls_remaining: u32,
    terminal: Terminal,
}

struct MockState {
    height: u64,
    height_step: u64,
    window: u64,
    reference_counter: u64,
    behaviors: VecDeque<SubmitBehavior>,
    submissions: Vec<Vec<u8>>,
    statuses: HashMap<Signature, SignatureState>,
    balances: HashMap<Pubkey, u64>,
    token_balances: HashMap<Pubkey, u64>,
    existing_accounts: HashMap<Pubkey, AccountSummary>,
    airdrops: Vec<(Pubkey, u64)>,
}

/// Scriptable ledger double. Default behavior confirms every submission on
/// the first poll with a generous validity window.
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                height: 1_000,
                height_step: 1,
                window: 1_000,
                reference_counter: 0,
                behaviors: VecDeque::new(),
                submissions: Vec::new(),
                statuses: HashMap::new(),
                balances: HashMap::new(),
                token_balances: HashMap::new(),
                existing_accounts: HashMap::new(),
                airdrops: Vec::new(),
            }),
        }
    }

    /// Height range a reference point stays valid for.
    pub fn set_window(&self, window: u64) {
        self.state.lock().window = window;
    }

    /// How far the chain advances per height query.
    pub fn set_height_step(&self, step: u64) {
        self.state.lock().height_step = step;
    }

    /// Queue a behavior for the next unconsumed submission.
    pub fn queue_behavior(&self, behavior: SubmitBehavior) {
        self.state.lock().behaviors.push_back(behavior);
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions.len()
    }

    /// Every accepted submission, deserialized.
    pub fn submitted_transactions(&self) -> Vec<Transaction> {
        self.state
            .lock()
            .submissions
            .iter()
            .map(|bytes| bincode::deserialize(bytes).expect("mock received valid bytes"))
            .collect()
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.state.lock().balances.insert(address, lamports);
    }

    pub fn set_token_balance(&self, address: Pubkey, amount: u64) {
        self.state.lock().token_balances.insert(address, amount);
    }

    /// Register an account as existing on the ledger.
    pub fn add_account(&self, address: Pubkey, owner: Pubkey) {
        self.state.lock().existing_accounts.insert(
            address,
            AccountSummary {
                owner,
                lamports: 1,
                data_len: 0,
            },
        );
    }

    pub fn airdrop_log(&self) -> Vec<(Pubkey, u64)> {
        self.state.lock().airdrops.clone()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn latest_reference_point(&self) -> Result<(Hash, u64)> {
        let mut state = self.state.lock();
        state.reference_counter += 1;
        let hash = hashv(&[&state.reference_counter.to_le_bytes()]);
        let expiry = state.height + state.window;
        Ok((hash, expiry))
    }

    async fn send_serialized(&self, bytes: &[u8]) -> Result<Signature> {
        let mut state = self.state.lock();
        let behavior = state
            .behaviors
            .pop_front()
            .unwrap_or(SubmitBehavior::ConfirmAfterPolls(0));

        let sig_state = match behavior {
            SubmitBehavior::TransportError(message) => {
                return Err(LifecycleError::transport(message));
            }
            SubmitBehavior::ConfirmAfterPolls(polls) => SignatureState {
                polls_remaining: polls,
                terminal: Terminal::Success,
            },
            SubmitBehavior::FailExecution(payload) => SignatureState {
                polls_remaining: 0,
                terminal: Terminal::Failure(payload),
            },
            SubmitBehavior::NeverLand => SignatureState {
                polls_remaining: 0,
                terminal: Terminal::Never,
            },
        };

        state.submissions.push(bytes.to_vec());
        let signature = Signature::new_unique();
        state.statuses.insert(signature, sig_state);
        Ok(signature)
    }

    async fn execution_status(&self, signature: &Signature) -> Result<ExecutionStatus> {
        let mut state = self.state.lock();
        let Some(sig_state) = state.statuses.get_mut(signature) else {
            return Ok(ExecutionStatus::Pending);
        };
        if sig_state.polls_remaining > 0 {
            sig_state.polls_remaining -= 1;
            return Ok(ExecutionStatus::Pending);
        }
        match &sig_state.terminal {
            Terminal::Never => Ok(ExecutionStatus::Pending),
            Terminal::Success => Ok(ExecutionStatus::Succeeded),
            Terminal::Failure(payload) => Ok(ExecutionStatus::Failed(payload.clone())),
        }
    }

    async fn current_height(&self) -> Result<u64> {
        let mut state = self.state.lock();
        state.height += state.height_step;
        Ok(state.height)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.state.lock().balances.get(address).copied().unwrap_or(0))
    }

    async fn token_account_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self
            .state
            .lock()
            .token_balances
            .get(address)
            .copied()
            .unwrap_or(0))
    }

    async fn account_info(&self, address: &Pubkey) -> Result<Option<AccountSummary>> {
        Ok(self.state.lock().existing_accounts.get(address).cloned())
    }

    async fn minimum_rent_exempt_balance(&self, space: usize) -> Result<u64> {
        // Roughly two years of rent at the historical lamports-per-byte rate.
        Ok(890_880 + space as u64 * 6_960)
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        let mut state = self.state.lock();
        state.airdrops.push((*address, lamports));
        *state.balances.entry(*address).or_insert(0) += lamports;
        Ok(Signature::new_unique())
    }
}
