//! mintforge - SPL Token-2022 launch CLI
//!
//! Subcommands cover the operational surface around the lifecycle core:
//! balance inspection, token creation, fee-bearing transfers, irreversible
//! authority revocation, the mainnet preflight checklist, and devnet
//! funding. Every command exits 0 on success and 1 with a human-readable
//! message on stderr on any unhandled error.

#![warn(dead_code)]
#![warn(unused_must_use)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mintforge::config::{LifecycleRecord, LifecycleStateStore};
use mintforge::fee::TransferFeeParams;
use mintforge::gate::{ConfirmationGate, InteractiveGate, PolicyGate};
use mintforge::ledger::{LedgerClient, RpcLedgerClient};
use mintforge::lifecycle::{TokenLifecycle, TokenMetadataArgs};
use mintforge::wallet::{fund_with_cooldown, LAMPORTS_PER_SOL};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the lifecycle record
    #[arg(short, long, default_value = "config.json")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show SOL and token balances for every configured wallet
    Balances,

    /// Run the launch sequence: mint, metadata, accounts, supply, optional fee
    Create {
        /// Token name
        #[arg(long)]
        name: String,
        /// Token symbol
        #[arg(long)]
        symbol: String,
        /// Metadata URI
        #[arg(long)]
        uri: String,
        /// Decimal precision, fixed at creation
        #[arg(long, default_value_t = 6)]
        decimals: u8,
        /// Initial supply in whole tokens
        #[arg(long, default_value_t = 1_000_000_000)]
        supply: u64,
        /// Transfer fee in basis points; omit to skip the fee stage
        #[arg(long)]
        fee_basis_points: Option<u16>,
        /// Maximum fee per transfer in raw units; 0 = uncapped
        #[arg(long, default_value_t = 0)]
        max_fee: u64,
        /// Skip the metadata URI reachability check
        #[arg(long)]
        skip_uri_check: bool,
    },

    /// Fee-bearing transfer between holder accounts
    Transfer {
        /// Source holder name
        #[arg(long)]
        from: String,
        /// Destination holder name
        #[arg(long)]
        to: String,
        /// Amount in whole tokens
        #[arg(long)]
        amount: u64,
    },

    /// Irreversibly revoke the mint authority, fixing the supply forever
    RevokeMint {
        /// Answer the confirmation gate affirmatively (automation)
        #[arg(long)]
        yes: bool,
    },

    /// Irreversibly freeze the token metadata
    RevokeMetadata {
        /// Answer the confirmation gate affirmatively (automation)
        #[arg(long)]
        yes: bool,
    },

    /// Mark the lifecycle finalized
    Finalize,

    /// Mainnet deployment checklist
    Preflight,

    /// Request devnet airdrops for all configured wallets
    Fund {
        /// SOL per wallet
        #[arg(long, default_value_t = 1.0)]
        sol: f64,
        /// Seconds between consecutive faucet calls
        #[arg(long, default_value_t = 2)]
        cooldown_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mintforge=debug,info"
    } else {
        "mintforge=info,warn,error"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn run(args: Args) -> Result<()> {
    let store = LifecycleStateStore::new(&args.config);
    let record = store.load().context("Failed to load lifecycle record")?;
    info!(endpoint = %record.network.endpoint, "Connecting to ledger");
    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedgerClient::new(&record.network.endpoint));

    match args.command {
        Command::Balances => balances(ledger.as_ref(), &record).await,
        Command::Create {
            name,
            symbol,
            uri,
            decimals,
            supply,
            fee_basis_points,
            max_fee,
            skip_uri_check,
        } => {
            if !skip_uri_check {
                validate_metadata_uri(&uri).await?;
                println!("Metadata URI validated successfully");
            }
            create(
                ledger,
                store,
                record,
                TokenMetadataArgs { name, symbol, uri },
                decimals,
                supply,
                fee_basis_points,
                max_fee,
            )
            .await
        }
        Command::Transfer { from, to, amount } => {
            transfer(ledger, store, record, &from, &to, amount).await
        }
        Command::RevokeMint { yes } => revoke_mint(ledger, store, record, yes).await,
        Command::RevokeMetadata { yes } => revoke_metadata(ledger, store, record, yes).await,
        Command::Finalize => finalize(ledger, store, record),
        Command::Preflight => preflight(ledger.as_ref(), &record).await,
        Command::Fund { sol, cooldown_secs } => {
            fund(ledger.as_ref(), &record, sol, cooldown_secs).await
        }
    }
}

async fn balances(ledger: &dyn LedgerClient, record: &LifecycleRecord) -> Result<()> {
    println!("\n=== Wallet Balance Summary ===");

    let mut wallets = vec![("payer".to_string(), record.payer.clone())];
    for (role, entry) in &record.authorities {
        wallets.push((role.to_string(), entry.clone()));
    }
    for (name, entry) in &record.holders {
        wallets.push((name.clone(), entry.clone()));
    }

    for (label, entry) in wallets {
        let address = entry.pubkey()?;
        let lamports = ledger.balance(&address).await?;
        println!("{label}:");
        println!("  Address: {address}");
        println!("  Balance: {} SOL", lamports_to_sol(lamports));
    }

    if let Some(token) = &record.token {
        println!("\n=== Token Account Balances ===");
        println!("Mint: {} (decimals: {})", token.mint_address, token.decimals);
        for (holder, address) in &token.accounts {
            let raw = ledger
                .token_account_balance(&address.parse().context("invalid account address")?)
                .await?;
            println!("  {holder}: {}", format_token_amount(raw, token.decimals));
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn create(
    ledger: Arc<dyn LedgerClient>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
    metadata: TokenMetadataArgs,
    decimals: u8,
    supply: u64,
    fee_basis_points: Option<u16>,
    max_fee: u64,
) -> Result<()> {
    let raw_supply = supply
        .checked_mul(10u64.pow(decimals as u32))
        .context("supply overflows raw units at this precision")?;

    let mut lifecycle = build_lifecycle(ledger, store, record, Arc::new(PolicyGate::approving()))?;

    println!("Step 1: Creating token mint...");
    let mint = lifecycle.create_mint(decimals).await?;
    println!("Token mint created: {mint}");

    println!("\nStep 2: Attaching token metadata...");
    let metadata_account = lifecycle.attach_metadata(metadata).await?;
    println!("Metadata attached: {metadata_account}");

    println!("\nStep 3: Provisioning token accounts...");
    lifecycle.provision_accounts().await?;
    if let Some(token) = &lifecycle.record().token {
        for (holder, account) in &token.accounts {
            println!("  {holder}: {account}");
        }
    }

    println!("\nStep 4: Minting initial supply...");
    lifecycle.mint_supply("treasury", raw_supply).await?;
    println!("Minted {supply} tokens to treasury");

    if let Some(bps) = fee_basis_points {
        println!("\nStep 5: Configuring transfer fee...");
        lifecycle
            .configure_fee(TransferFeeParams::new(bps, max_fee)?)
            .await?;
        println!("Transfer fee configured: {bps} basis points (max fee: {max_fee})");
    }

    println!("\nToken creation completed successfully!");
    Ok(())
}

async fn transfer(
    ledger: Arc<dyn LedgerClient>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
    from: &str,
    to: &str,
    amount: u64,
) -> Result<()> {
    let decimals = record
        .token
        .as_ref()
        .context("no token has been created yet")?
        .decimals;
    let raw_amount = amount
        .checked_mul(10u64.pow(decimals as u32))
        .context("amount overflows raw units at this precision")?;
    let owner = record.holder(from)?.load_wallet()?;

    let mut lifecycle = build_lifecycle(ledger, store, record, Arc::new(PolicyGate::approving()))?;
    lifecycle.refresh_balances().await?;

    let signature = lifecycle.transfer(from, to, raw_amount, &owner).await?;
    println!("Tokens transferred successfully!");
    println!("Signature: {signature}");
    Ok(())
}

async fn revoke_mint(
    ledger: Arc<dyn LedgerClient>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
    yes: bool,
) -> Result<()> {
    let mut lifecycle = build_lifecycle(ledger, store, record, revocation_gate(yes))?;
    let signature = lifecycle.revoke_mint_authority().await?;
    println!("Mint authority has been permanently revoked.");
    println!("Signature: {signature}");
    println!("\nNo more tokens can ever be minted; the supply is now fixed.");
    Ok(())
}

async fn revoke_metadata(
    ledger: Arc<dyn LedgerClient>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
    yes: bool,
) -> Result<()> {
    let mut lifecycle = build_lifecycle(ledger, store, record, revocation_gate(yes))?;
    let signature = lifecycle.immutabilize_metadata().await?;
    println!("Metadata update authority has been permanently revoked.");
    println!("Signature: {signature}");
    println!("\nThe token metadata is now immutable and cannot be changed.");
    Ok(())
}

fn finalize(
    ledger: Arc<dyn LedgerClient>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
) -> Result<()> {
    let mut lifecycle = build_lifecycle(ledger, store, record, Arc::new(PolicyGate::approving()))?;
    lifecycle.finalize()?;
    println!("Lifecycle finalized.");
    Ok(())
}

async fn preflight(ledger: &dyn LedgerClient, record: &LifecycleRecord) -> Result<()> {
    println!("\nMainnet deployment checklist\n");

    println!("1. Network connection:");
    let height = ledger.current_height().await?;
    println!("   ok - {} (height {height})\n", record.network.endpoint);

    println!("2. Wallet files and balances:");
    let mut wallets = vec![("payer".to_string(), record.payer.clone())];
    for (role, entry) in &record.authorities {
        wallets.push((role.to_string(), entry.clone()));
    }
    for (label, entry) in wallets {
        let wallet = entry
            .load_wallet()
            .with_context(|| format!("missing or invalid keypair for {label}"))?;
        let lamports = ledger.balance(&wallet.pubkey()).await?;
        println!("   ok - {label}: {} SOL", lamports_to_sol(lamports));
    }
    println!();

    println!("3. Token configuration:");
    match &record.token {
        Some(token) => {
            println!("   Mint: {}", token.mint_address);
            println!("   Decimals: {}", token.decimals);
            println!(
                "   Supply: {}",
                format_token_amount(token.supply, token.decimals)
            );
            if let Some(metadata) = &token.metadata {
                println!("   Name: {} ({})", metadata.name, metadata.symbol);
                println!("   Metadata URI: {}", metadata.uri);
            }
        }
        None => println!("   Token not created yet; run the create command first"),
    }
    println!();

    println!("4. Metadata verification:");
    if let Some(uri) = record
        .token
        .as_ref()
        .and_then(|token| token.metadata.as_ref())
        .map(|metadata| metadata.uri.clone())
    {
        validate_metadata_uri(&uri).await?;
        println!("   ok - metadata JSON is reachable\n");
    } else {
        println!("   skipped - no metadata attached yet\n");
    }

    println!("5. Estimated costs:");
    println!("   Token creation: ~0.5 SOL");
    println!("   Metadata creation: ~0.5 SOL");
    println!("   Initial supply minting: ~0.01 SOL");
    println!("   Total estimated: ~1.01 SOL\n");

    println!("IMPORTANT: revocation stages are irreversible. Once the mint");
    println!("authority is revoked the supply is fixed forever, and once the");
    println!("metadata is frozen it can never be changed.\n");

    let gate = InteractiveGate::new("DEPLOY");
    if !gate.confirm("mainnet-deployment").await? {
        println!("\nDeployment cancelled by user");
        return Ok(());
    }

    println!("\nPreflight complete. Next steps:");
    println!("1. Run the create command against the mainnet record");
    println!("2. Run revoke-mint once the supply is final");
    println!("3. Run revoke-metadata to freeze the identity");
    Ok(())
}

async fn fund(
    ledger: &dyn LedgerClient,
    record: &LifecycleRecord,
    sol: f64,
    cooldown_secs: u64,
) -> Result<()> {
    let mut recipients = vec![("payer".to_string(), record.payer.pubkey()?)];
    for (role, entry) in &record.authorities {
        recipients.push((role.to_string(), entry.pubkey()?));
    }
    for (name, entry) in &record.holders {
        recipients.push((name.clone(), entry.pubkey()?));
    }

    let lamports = (sol * LAMPORTS_PER_SOL as f64) as u64;
    println!(
        "Requesting {sol} SOL for {} wallets ({cooldown_secs}s between requests)...",
        recipients.len()
    );
    fund_with_cooldown(
        ledger,
        &recipients,
        lamports,
        Duration::from_secs(cooldown_secs),
    )
    .await;
    println!("Funding pass complete; re-run balances to verify.");
    Ok(())
}

fn build_lifecycle(
    ledger: Arc<dyn LedgerClient>,
    store: LifecycleStateStore,
    record: LifecycleRecord,
    gate: Arc<dyn ConfirmationGate>,
) -> Result<TokenLifecycle> {
    let registry = Arc::new(record.build_registry()?);
    let payer = record.load_payer()?;
    Ok(TokenLifecycle::new(
        ledger, registry, payer, gate, store, record,
    )?)
}

fn revocation_gate(auto_approve: bool) -> Arc<dyn ConfirmationGate> {
    if auto_approve {
        Arc::new(PolicyGate::approving())
    } else {
        Arc::new(InteractiveGate::new("REVOKE"))
    }
}

async fn validate_metadata_uri(uri: &str) -> Result<()> {
    let response = reqwest::get(uri)
        .await
        .with_context(|| format!("Metadata URI is not reachable: {uri}"))?;
    if !response.status().is_success() {
        anyhow::bail!("Metadata URI returned status code: {}", response.status());
    }
    Ok(())
}

fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

fn format_token_amount(raw: u64, decimals: u8) -> String {
    let divisor = 10u64.pow(decimals as u32);
    let whole = raw / divisor;
    let fraction = raw % divisor;
    if fraction == 0 {
        format!("{whole}")
    } else {
        let padded = format!("{fraction:0width$}", width = decimals as usize);
        format!("{whole}.{}", padded.trim_end_matches('0'))
    }
}
