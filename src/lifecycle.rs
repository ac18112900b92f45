//! Token lifecycle orchestration.
//!
//! One orchestrator instance owns one token's journey through a linear stage
//! machine: mint creation, metadata, account provisioning, supply, optional
//! fee configuration, and the irreversible authority revocations. Each stage
//! builds its instruction set, runs the build/sign/submit/confirm round trip
//! under the retry policy, and only on a confirmed outcome updates the
//! in-memory records, advances the stage, and persists the lifecycle record
//! atomically. A failed stage leaves the lifecycle at its last confirmed
//! stage, resumable later.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
};
use spl_token_2022::{
    extension::{metadata_pointer, transfer_fee, ExtensionType},
    instruction as token_instruction,
    instruction::AuthorityType,
    state::Mint,
};
use tracing::{info, warn};

use crate::authority::{AuthorityRegistry, AuthorityRole};
use crate::config::{LifecycleRecord, LifecycleStateStore, MetadataEntry, TokenRecord};
use crate::derive;
use crate::error::{LifecycleError, Result};
use crate::fee::TransferFeeParams;
use crate::gate::ConfirmationGate;
use crate::ledger::{ExecutionStatus, LedgerClient};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::tx_builder::{ConfirmationTracker, TransactionBuilder, TxOutcome};
use crate::wallet::WalletManager;

/// Position in the stage sequence. Linear; optional stages may be skipped
/// but never revisited.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStage {
    #[default]
    Uninitialized,
    MintCreated,
    MetadataAttached,
    AccountsProvisioned,
    SupplyMinted,
    FeeConfigured,
    MintAuthorityRevoked,
    MetadataImmutabilized,
    Finalized,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Uninitialized => "uninitialized",
            LifecycleStage::MintCreated => "mint-created",
            LifecycleStage::MetadataAttached => "metadata-attached",
            LifecycleStage::AccountsProvisioned => "accounts-provisioned",
            LifecycleStage::SupplyMinted => "supply-minted",
            LifecycleStage::FeeConfigured => "fee-configured",
            LifecycleStage::MintAuthorityRevoked => "mint-authority-revoked",
            LifecycleStage::MetadataImmutabilized => "metadata-immutabilized",
            LifecycleStage::Finalized => "finalized",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory view of the mint.
#[derive(Debug, Clone)]
pub struct MintRecord {
    pub address: Pubkey,
    pub decimals: u8,
    pub supply: u64,
    pub extensions: Vec<&'static str>,
    pub transfer_fee: Option<TransferFeeParams>,
}

/// In-memory view of one holding account.
#[derive(Debug, Clone)]
pub struct TokenAccountRecord {
    pub address: Pubkey,
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub balance: u64,
    pub withheld: u64,
}

/// In-memory view of the attached metadata.
#[derive(Debug, Clone)]
pub struct MetadataRecord {
    pub mint: Pubkey,
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub mutable: bool,
}

/// Descriptive metadata supplied to `attach_metadata`.
#[derive(Debug, Clone)]
pub struct TokenMetadataArgs {
    pub name: String,
    pub symbol: String,
    pub uri: String,
}

const EXTENSION_NAMES: [&str; 2] = ["transferFeeConfig", "metadataPointer"];

/// Orchestrates one token's lifecycle. Strictly sequential per instance;
/// distinct instances share nothing mutable.
pub struct TokenLifecycle {
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<AuthorityRegistry>,
    builder: TransactionBuilder,
    tracker: ConfirmationTracker,
    gate: Arc<dyn ConfirmationGate>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
    policy: RetryPolicy,
    poll_interval: Duration,
    mint: Option<MintRecord>,
    metadata: Option<MetadataRecord>,
    accounts: BTreeMap<String, TokenAccountRecord>,
}

impl TokenLifecycle {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        registry: Arc<AuthorityRegistry>,
        payer: Arc<WalletManager>,
        gate: Arc<dyn ConfirmationGate>,
        store: LifecycleStateStore,
        record: LifecycleRecord,
    ) -> Result<Self> {
        let builder = TransactionBuilder::new(Arc::clone(&ledger), payer);
        let tracker = ConfirmationTracker::new(Arc::clone(&ledger));

        let mut lifecycle = Self {
            ledger,
            registry,
            builder,
            tracker,
            gate,
            store,
            record,
            policy: RetryPolicy::default(),
            poll_interval: Duration::from_millis(500),
            mint: None,
            metadata: None,
            accounts: BTreeMap::new(),
        };
        lifecycle.hydrate()?;
        Ok(lifecycle)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Install a cancellation flag honored between confirmation polls.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.tracker = ConfirmationTracker::new(Arc::clone(&self.ledger)).with_cancel_flag(cancel);
        self
    }

    pub fn stage(&self) -> LifecycleStage {
        self.record.stage
    }

    pub fn mint(&self) -> Option<&MintRecord> {
        self.mint.as_ref()
    }

    pub fn metadata(&self) -> Option<&MetadataRecord> {
        self.metadata.as_ref()
    }

    pub fn account(&self, holder: &str) -> Option<&TokenAccountRecord> {
        self.accounts.get(holder)
    }

    pub fn record(&self) -> &LifecycleRecord {
        &self.record
    }

    /// Rebuild in-memory records from the persisted token sub-record, so a
    /// lifecycle can resume from wherever its last confirmed stage left it.
    fn hydrate(&mut self) -> Result<()> {
        let Some(token) = self.record.token.clone() else {
            return Ok(());
        };

        let mint_address = parse_pubkey(&token.mint_address)?;
        self.mint = Some(MintRecord {
            address: mint_address,
            decimals: token.decimals,
            supply: token.supply,
            extensions: EXTENSION_NAMES.to_vec(),
            transfer_fee: token.transfer_fee,
        });
        self.metadata = token.metadata.as_ref().map(|entry| MetadataRecord {
            mint: mint_address,
            name: entry.name.clone(),
            symbol: entry.symbol.clone(),
            uri: entry.uri.clone(),
            mutable: entry.mutable,
        });
        for (holder, address) in &token.accounts {
            let owner = self.record.holder(holder)?.pubkey()?;
            self.accounts.insert(
                holder.clone(),
                TokenAccountRecord {
                    address: parse_pubkey(address)?,
                    owner,
                    mint: mint_address,
                    balance: 0,
                    withheld: 0,
                },
            );
        }
        Ok(())
    }

    /// Stage `Uninitialized -> MintCreated`.
    ///
    /// Creates the mint account with the transfer-fee and metadata-pointer
    /// extensions enabled, then initializes the mint itself. Extension
    /// initialization must precede `initialize_mint`; the fee rate starts at
    /// zero and is raised by the optional fee stage later.
    pub async fn create_mint(&mut self, decimals: u8) -> Result<Pubkey> {
        self.ensure_stage("create_mint", &[LifecycleStage::Uninitialized])?;

        let mint_authority = self.require_role_key(AuthorityRole::MintAuthority)?;
        let freeze_authority = self.require_role_key(AuthorityRole::FreezeAuthority)?;
        let update_authority = self.require_role_key(AuthorityRole::UpdateAuthority)?;
        let fee_authority = self.registry.pubkey_of(AuthorityRole::FeeAuthority);
        let withdraw_authority = self
            .registry
            .pubkey_of(AuthorityRole::WithdrawWithheldAuthority);

        let mint_keypair = Keypair::new();
        let mint_address = mint_keypair.pubkey();
        let token_program = spl_token_2022::id();
        let metadata_pda = derive::metadata_address(&mint_address)?;

        let extensions = [
            ExtensionType::TransferFeeConfig,
            ExtensionType::MetadataPointer,
        ];
        let space = ExtensionType::try_calculate_account_len::<Mint>(&extensions)
            .map_err(|err| LifecycleError::internal(format!("mint size calculation: {err}")))?;
        let rent = self.ledger.minimum_rent_exempt_balance(space).await?;

        let instructions = vec![
            system_instruction::create_account(
                &self.builder.payer_pubkey(),
                &mint_address,
                rent,
                space as u64,
                &token_program,
            ),
            transfer_fee::instruction::initialize_transfer_fee_config(
                &token_program,
                &mint_address,
                fee_authority.as_ref(),
                withdraw_authority.as_ref(),
                0,
                0,
            )
            .map_err(instruction_error)?,
            metadata_pointer::instruction::initialize(
                &token_program,
                &mint_address,
                Some(update_authority),
                Some(metadata_pda),
            )
            .map_err(instruction_error)?,
            token_instruction::initialize_mint(
                &token_program,
                &mint_address,
                &mint_authority,
                Some(&freeze_authority),
                decimals,
            )
            .map_err(instruction_error)?,
        ];

        info!(mint = %mint_address, decimals, "Creating mint");
        self.run_stage("create_mint", instructions, &[&mint_keypair])
            .await?;

        self.mint = Some(MintRecord {
            address: mint_address,
            decimals,
            supply: 0,
            extensions: EXTENSION_NAMES.to_vec(),
            transfer_fee: None,
        });
        self.advance(LifecycleStage::MintCreated)?;
        Ok(mint_address)
    }

    /// Stage `MintCreated -> MetadataAttached`.
    pub async fn attach_metadata(&mut self, args: TokenMetadataArgs) -> Result<Pubkey> {
        self.ensure_stage("attach_metadata", &[LifecycleStage::MintCreated])?;

        let mint = self.require_mint()?.address;
        let mint_authority = self.require_role_key(AuthorityRole::MintAuthority)?;
        let update_authority = self.require_role_key(AuthorityRole::UpdateAuthority)?;
        let metadata_pda = derive::metadata_address(&mint)?;

        let instruction =
            mpl_token_metadata::instructions::CreateMetadataAccountV3Builder::new()
                .metadata(metadata_pda)
                .mint(mint)
                .mint_authority(mint_authority)
                .payer(self.builder.payer_pubkey())
                .update_authority(update_authority, true)
                .data(mpl_token_metadata::types::DataV2 {
                    name: args.name.clone(),
                    symbol: args.symbol.clone(),
                    uri: args.uri.clone(),
                    seller_fee_basis_points: 0,
                    creators: None,
                    collection: None,
                    uses: None,
                })
                .is_mutable(true)
                .instruction();

        info!(mint = %mint, metadata = %metadata_pda, name = %args.name, "Attaching metadata");
        self.run_stage("attach_metadata", vec![instruction], &[])
            .await?;

        self.metadata = Some(MetadataRecord {
            mint,
            name: args.name,
            symbol: args.symbol,
            uri: args.uri,
            mutable: true,
        });
        self.advance(LifecycleStage::MetadataAttached)?;
        Ok(metadata_pda)
    }

    /// Stage `MetadataAttached -> AccountsProvisioned`.
    ///
    /// Creates an associated token account for every configured holder.
    /// Already-existing accounts are recorded without re-creating them.
    pub async fn provision_accounts(&mut self) -> Result<()> {
        self.ensure_stage("provision_accounts", &[LifecycleStage::MetadataAttached])?;

        let mint = self.require_mint()?.address;
        let token_program = spl_token_2022::id();
        let payer = self.builder.payer_pubkey();

        let mut planned: Vec<(String, Pubkey, Pubkey)> = Vec::new();
        for (name, entry) in &self.record.holders {
            let owner = entry.pubkey()?;
            let address = derive::associated_token_address(&owner, &mint)?;
            planned.push((name.clone(), owner, address));
        }

        let mut instructions = Vec::new();
        for (name, owner, address) in &planned {
            if self.ledger.account_info(address).await?.is_some() {
                info!(holder = %name, address = %address, "Token account already exists");
                continue;
            }
            instructions.push(
                spl_associated_token_account::instruction::create_associated_token_account(
                    &payer,
                    owner,
                    &mint,
                    &token_program,
                ),
            );
        }

        if !instructions.is_empty() {
            info!(count = instructions.len(), "Provisioning token accounts");
            self.run_stage("provision_accounts", instructions, &[])
                .await?;
        }

        for (name, owner, address) in planned {
            self.accounts.insert(
                name,
                TokenAccountRecord {
                    address,
                    owner,
                    mint,
                    balance: 0,
                    withheld: 0,
                },
            );
        }
        self.advance(LifecycleStage::AccountsProvisioned)?;
        Ok(())
    }

    /// Stage `AccountsProvisioned -> SupplyMinted` (first mint); top-up
    /// mints stay at the current stage.
    ///
    /// The mint authority is resolved before anything is built, so a revoked
    /// authority fails here with `SignerUnavailable` and produces no
    /// transaction.
    pub async fn mint_supply(&mut self, holder: &str, amount: u64) -> Result<Signature> {
        self.ensure_stage_at_least("mint_supply", LifecycleStage::AccountsProvisioned)?;
        let authority = self.registry.signer_for(AuthorityRole::MintAuthority)?;

        let mint = self.require_mint()?.address;
        let destination = self
            .accounts
            .get(holder)
            .ok_or_else(|| LifecycleError::config(format!("no token account for {holder}")))?
            .address;

        let instruction = token_instruction::mint_to(
            &spl_token_2022::id(),
            &mint,
            &destination,
            &authority.pubkey(),
            &[],
            amount,
        )
        .map_err(instruction_error)?;
        drop(authority);

        info!(mint = %mint, holder = %holder, amount, "Minting supply");
        let signature = self.run_stage("mint_supply", vec![instruction], &[]).await?;

        if let Some(record) = self.mint.as_mut() {
            record.supply += amount;
        }
        if let Some(account) = self.accounts.get_mut(holder) {
            account.balance += amount;
        }
        self.advance(LifecycleStage::SupplyMinted)?;
        Ok(signature)
    }

    /// Optional stage `SupplyMinted -> FeeConfigured`. Set at most once.
    pub async fn configure_fee(&mut self, params: TransferFeeParams) -> Result<Signature> {
        self.ensure_stage("configure_fee", &[LifecycleStage::SupplyMinted])?;
        let authority = self.registry.signer_for(AuthorityRole::FeeAuthority)?;

        let mint = self.require_mint()?.address;
        let instruction = transfer_fee::instruction::set_transfer_fee(
            &spl_token_2022::id(),
            &mint,
            &authority.pubkey(),
            &[],
            params.fee_basis_points,
            params.max_fee,
        )
        .map_err(instruction_error)?;
        drop(authority);

        info!(
            mint = %mint,
            fee_basis_points = params.fee_basis_points,
            max_fee = params.max_fee,
            "Configuring transfer fee"
        );
        let signature = self
            .run_stage("configure_fee", vec![instruction], &[])
            .await?;

        if let Some(record) = self.mint.as_mut() {
            record.transfer_fee = Some(params);
        }
        self.advance(LifecycleStage::FeeConfigured)?;
        Ok(signature)
    }

    /// Fee-bearing transfer between holder accounts. Not a stage transition;
    /// available once supply exists. The withheld amount accrues on the
    /// recipient account, drawable only by the withdraw-withheld authority.
    pub async fn transfer(
        &mut self,
        from: &str,
        to: &str,
        amount: u64,
        owner: &WalletManager,
    ) -> Result<Signature> {
        self.ensure_stage_at_least("transfer", LifecycleStage::SupplyMinted)?;

        let mint = self.require_mint()?.clone();
        let source = self
            .accounts
            .get(from)
            .ok_or_else(|| LifecycleError::config(format!("no token account for {from}")))?;
        let destination = self
            .accounts
            .get(to)
            .ok_or_else(|| LifecycleError::config(format!("no token account for {to}")))?;

        if source.owner != owner.pubkey() {
            return Err(LifecycleError::Signing(format!(
                "wallet {} does not own source account {}",
                owner.pubkey(),
                source.address
            )));
        }
        if source.balance < amount {
            return Err(LifecycleError::Execution {
                stage: "transfer".to_string(),
                payload: format!(
                    "insufficient token balance: have {}, need {amount}",
                    source.balance
                ),
            });
        }

        let withheld = mint
            .transfer_fee
            .map(|fee| fee.withheld(amount))
            .unwrap_or(0);

        let instruction = transfer_fee::instruction::transfer_checked_with_fee(
            &spl_token_2022::id(),
            &source.address,
            &mint.address,
            &destination.address,
            &owner.pubkey(),
            &[],
            amount,
            mint.decimals,
            withheld,
        )
        .map_err(instruction_error)?;

        info!(
            from = %source.address,
            to = %destination.address,
            amount,
            withheld,
            "Transferring tokens"
        );
        let signature = self
            .run_stage("transfer", vec![instruction], &[owner.keypair()])
            .await?;

        if let Some(account) = self.accounts.get_mut(from) {
            account.balance -= amount;
        }
        if let Some(account) = self.accounts.get_mut(to) {
            account.balance += amount - withheld;
            account.withheld += withheld;
        }
        self.persist()?;
        Ok(signature)
    }

    /// Optional, gated, irreversible: `-> MintAuthorityRevoked`.
    ///
    /// After confirmation the supply is permanently fixed; any later mint
    /// attempt dies at signer resolution.
    pub async fn revoke_mint_authority(&mut self) -> Result<Signature> {
        self.ensure_stage(
            "revoke_mint_authority",
            &[LifecycleStage::SupplyMinted, LifecycleStage::FeeConfigured],
        )?;
        if !self.gate.confirm("revoke-mint-authority").await? {
            warn!("Mint authority revocation declined");
            return Err(LifecycleError::Declined("revoke-mint-authority".into()));
        }

        let authority = self.registry.signer_for(AuthorityRole::MintAuthority)?;
        let mint = self.require_mint()?.address;
        let instruction = token_instruction::set_authority(
            &spl_token_2022::id(),
            &mint,
            None,
            AuthorityType::MintTokens,
            &authority.pubkey(),
            &[],
        )
        .map_err(instruction_error)?;
        drop(authority);

        info!(mint = %mint, "Revoking mint authority");
        let signature = self
            .run_stage("revoke_mint_authority", vec![instruction], &[])
            .await?;

        self.registry.revoke(AuthorityRole::MintAuthority)?;
        self.advance(LifecycleStage::MintAuthorityRevoked)?;
        info!(mint = %mint, "Mint authority revoked; supply is now fixed");
        Ok(signature)
    }

    /// Optional, gated, irreversible: `-> MetadataImmutabilized`.
    pub async fn immutabilize_metadata(&mut self) -> Result<Signature> {
        self.ensure_stage(
            "immutabilize_metadata",
            &[
                LifecycleStage::SupplyMinted,
                LifecycleStage::FeeConfigured,
                LifecycleStage::MintAuthorityRevoked,
            ],
        )?;
        if !self.gate.confirm("immutabilize-metadata").await? {
            warn!("Metadata immutabilization declined");
            return Err(LifecycleError::Declined("immutabilize-metadata".into()));
        }

        let authority = self.registry.signer_for(AuthorityRole::UpdateAuthority)?;
        let mint = self.require_mint()?.address;
        let metadata_pda = derive::metadata_address(&mint)?;

        let instruction =
            mpl_token_metadata::instructions::UpdateMetadataAccountV2Builder::new()
                .metadata(metadata_pda)
                .update_authority(authority.pubkey())
                .is_mutable(false)
                .instruction();
        drop(authority);

        info!(mint = %mint, metadata = %metadata_pda, "Making metadata immutable");
        let signature = self
            .run_stage("immutabilize_metadata", vec![instruction], &[])
            .await?;

        if let Some(metadata) = self.metadata.as_mut() {
            metadata.mutable = false;
        }
        self.registry.revoke(AuthorityRole::UpdateAuthority)?;
        self.advance(LifecycleStage::MetadataImmutabilized)?;
        info!(mint = %mint, "Metadata is now immutable");
        Ok(signature)
    }

    /// Terminal bookkeeping once the optional stages are done or skipped.
    pub fn finalize(&mut self) -> Result<()> {
        self.ensure_stage(
            "finalize",
            &[
                LifecycleStage::SupplyMinted,
                LifecycleStage::FeeConfigured,
                LifecycleStage::MintAuthorityRevoked,
                LifecycleStage::MetadataImmutabilized,
            ],
        )?;
        self.advance(LifecycleStage::Finalized)?;
        info!("Lifecycle finalized");
        Ok(())
    }

    /// Re-derive the fate of a submission whose wait was abandoned. The
    /// submission may have landed after we stopped watching.
    pub async fn resync(&self, signature: &Signature) -> Result<ExecutionStatus> {
        self.ledger.execution_status(signature).await
    }

    /// Refresh holder balances from the ledger, e.g. after resuming.
    pub async fn refresh_balances(&mut self) -> Result<()> {
        let addresses: Vec<(String, Pubkey)> = self
            .accounts
            .iter()
            .map(|(name, account)| (name.clone(), account.address))
            .collect();
        for (name, address) in addresses {
            let balance = self.ledger.token_account_balance(&address).await?;
            if let Some(account) = self.accounts.get_mut(&name) {
                account.balance = balance;
            }
        }
        Ok(())
    }

    /// Run one stage's submit-and-confirm round trip under the retry policy.
    ///
    /// Every attempt rebuilds from a fresh reference point, so an expired
    /// window naturally becomes a rebuild rather than a resend. On-chain
    /// failures are fatal and surface with the stage name attached.
    async fn run_stage(
        &self,
        stage_name: &'static str,
        instructions: Vec<Instruction>,
        ephemeral_signers: &[&Keypair],
    ) -> Result<Signature> {
        retry_with_backoff(stage_name, &self.policy, || {
            let instructions = instructions.clone();
            async move {
                let mut tx = self.builder.build(instructions).await?;
                self.builder.sign(&mut tx, &self.registry, ephemeral_signers)?;
                self.builder.submit(&mut tx).await?;

                match self.tracker.await_outcome(&mut tx, self.poll_interval).await? {
                    TxOutcome::Confirmed(signature) => Ok(signature),
                    TxOutcome::Failed(payload) => Err(LifecycleError::Execution {
                        stage: stage_name.to_string(),
                        payload,
                    }),
                    TxOutcome::Expired => Err(LifecycleError::ExpiredWindow {
                        expiry_height: tx.expiry_height,
                    }),
                    TxOutcome::Abandoned => {
                        Err(LifecycleError::Interrupted(stage_name.to_string()))
                    }
                }
            }
        })
        .await
    }

    fn ensure_stage(&self, operation: &str, allowed: &[LifecycleStage]) -> Result<()> {
        let actual = self.record.stage;
        if allowed.contains(&actual) {
            return Ok(());
        }
        let expected = allowed
            .iter()
            .map(|stage| stage.as_str())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(LifecycleError::Precondition {
            operation: operation.to_string(),
            expected,
            actual: actual.to_string(),
        })
    }

    fn ensure_stage_at_least(&self, operation: &str, floor: LifecycleStage) -> Result<()> {
        if self.record.stage >= floor {
            return Ok(());
        }
        Err(LifecycleError::Precondition {
            operation: operation.to_string(),
            expected: format!("{floor} or later"),
            actual: self.record.stage.to_string(),
        })
    }

    fn require_mint(&self) -> Result<&MintRecord> {
        self.mint
            .as_ref()
            .ok_or_else(|| LifecycleError::internal("no mint record at this stage"))
    }

    fn require_role_key(&self, role: AuthorityRole) -> Result<Pubkey> {
        self.registry
            .pubkey_of(role)
            .ok_or_else(|| LifecycleError::signer_unavailable(role, "no signing wallet bound"))
    }

    fn advance(&mut self, target: LifecycleStage) -> Result<()> {
        if target > self.record.stage {
            info!(from = %self.record.stage, to = %target, "Lifecycle advanced");
            self.record.stage = target;
        }
        self.persist()
    }

    fn persist(&mut self) -> Result<()> {
        self.sync_token_record();
        self.store.save_atomic(&self.record)
    }

    /// Mirror the in-memory records into the persisted token sub-record.
    fn sync_token_record(&mut self) {
        let Some(mint) = &self.mint else {
            return;
        };

        let mut authorities = BTreeMap::new();
        for role in AuthorityRole::ALL {
            let value = if self.registry.is_revoked(role) {
                None
            } else {
                self.registry
                    .pubkey_of(role)
                    .map(|key| key.to_string())
                    .or_else(|| {
                        self.record
                            .authorities
                            .get(&role)
                            .map(|entry| entry.public_key.clone())
                    })
            };
            authorities.insert(role, value);
        }

        let accounts = self
            .accounts
            .iter()
            .map(|(name, account)| (name.clone(), account.address.to_string()))
            .collect();

        self.record.token = Some(TokenRecord {
            mint_address: mint.address.to_string(),
            decimals: mint.decimals,
            program_id: spl_token_2022::id().to_string(),
            supply: mint.supply,
            authorities,
            extensions: mint.extensions.iter().map(|s| s.to_string()).collect(),
            transfer_fee: mint.transfer_fee,
            metadata: self.metadata.as_ref().map(|metadata| MetadataEntry {
                name: metadata.name.clone(),
                symbol: metadata.symbol.clone(),
                uri: metadata.uri.clone(),
                mutable: metadata.mutable,
            }),
            accounts,
        });
    }
}

fn parse_pubkey(value: &str) -> Result<Pubkey> {
    use std::str::FromStr;
    Pubkey::from_str(value)
        .map_err(|err| LifecycleError::config(format!("invalid address {value}: {err}")))
}

fn instruction_error(err: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::internal(format!("instruction build failed: {err}"))
}
