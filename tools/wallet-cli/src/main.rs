//! wallet-cli: derive addresses and send from Bitcoin-family HD wallets.
//!
//! The mnemonic is read from `--mnemonic` or `WALLET_MNEMONIC`; node
//! settings come from the `WALLET_RPC_*` environment variables.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use node_rpc::BitcoindClient;
use tracing::info;
use wallet_core::logging::init_logging;
use wallet_core::{
    generate_mnemonic, CoinRegistry, CoinType, Engine, EngineConfig, SendRequest, Wallet,
    ZeroizingMnemonic,
};

/// HD wallet tool for BTC, LTC and DOGE.
#[derive(Parser)]
#[command(name = "wallet-cli")]
#[command(version, about = "Bitcoin-family HD wallet")]
struct Cli {
    /// Log filter (e.g. info, debug, wallet_core=trace).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new mnemonic phrase.
    Generate {
        /// Number of words: 12, 15, 18, 21 or 24.
        #[arg(short, long, default_value_t = 12)]
        words: usize,
    },
    /// Print the address at a derivation index.
    Address(KeyArgs),
    /// Print the WIF private key at a derivation index.
    Wif(KeyArgs),
    /// Import the key at a derivation index into the node wallet.
    Import {
        #[command(flatten)]
        key: KeyArgs,

        /// Node-side label for the imported key.
        #[arg(short, long, default_value = "")]
        label: String,
    },
    /// Send coins from the address at a derivation index.
    Send(SendArgs),
}

#[derive(Args)]
struct KeyArgs {
    /// Mnemonic phrase (falls back to WALLET_MNEMONIC).
    #[arg(long)]
    mnemonic: Option<String>,

    /// Optional BIP-39 passphrase.
    #[arg(long, default_value = "")]
    passphrase: String,

    /// Coin: btc, btc-testnet, ltc or doge.
    #[arg(short, long, default_value = "btc-testnet")]
    coin: String,

    #[arg(long, default_value_t = 0)]
    account: u32,

    /// 0 for receive addresses, 1 for change.
    #[arg(long, default_value_t = 0)]
    change: u32,

    #[arg(short, long, default_value_t = 0)]
    index: u32,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    key: KeyArgs,

    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in satoshis.
    #[arg(short, long)]
    amount: u64,

    /// Change address (default: the sending address).
    #[arg(long)]
    change_address: Option<String>,

    /// Build and sign but print the raw transaction instead of broadcasting.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Generate { words } => generate(words),
        Commands::Address(args) => {
            let wallet = load_wallet(&CoinRegistry::with_defaults(), &args)?;
            println!("{}", wallet.address());
            Ok(())
        }
        Commands::Wif(args) => {
            let wallet = load_wallet(&CoinRegistry::with_defaults(), &args)?;
            println!("{}", wallet.private_key_wif());
            Ok(())
        }
        Commands::Import { key, label } => import(key, &label).await,
        Commands::Send(args) => send(args).await,
    }
}

fn generate(words: usize) -> Result<()> {
    let phrase = generate_mnemonic(words).context("Failed to generate mnemonic")?;
    let mnemonic = ZeroizingMnemonic::new(phrase)?;
    println!("{}", mnemonic.as_str());
    Ok(())
}

async fn import(args: KeyArgs, label: &str) -> Result<()> {
    let engine = connect()?;
    let wallet = load_wallet(engine.registry(), &args)?;
    engine
        .import_into_node(&wallet, label)
        .await
        .with_context(|| format!("Failed to import key for {}", wallet.address()))?;
    println!("imported {}", wallet.address());
    Ok(())
}

async fn send(args: SendArgs) -> Result<()> {
    let engine = connect()?;
    let wallet = load_wallet(engine.registry(), &args.key)?;

    let request = SendRequest {
        destination: args.to,
        amount_sat: args.amount,
        change_address: args.change_address,
    };

    if args.dry_run {
        let prepared = engine.prepare(&wallet, &request).await?;
        info!(
            txid = %prepared.transaction.txid,
            fee = prepared.fee,
            change = prepared.change,
            "prepared transaction"
        );
        println!("{}", prepared.transaction.to_hex());
        return Ok(());
    }

    let receipt = engine.send(&wallet, &request).await?;
    println!("txid:   {}", receipt.txid);
    println!("fee:    {} sat", receipt.fee);
    println!("change: {} sat", receipt.change);
    Ok(())
}

fn connect() -> Result<Engine> {
    let config = EngineConfig::from_env().context("Invalid node configuration")?;
    let client = BitcoindClient::new(config.bitcoind()).context("Failed to create RPC client")?;
    info!(endpoint = client.endpoint(), "using node");
    Ok(Engine::new(
        CoinRegistry::with_defaults(),
        Arc::new(client),
        config,
    ))
}

fn load_wallet(registry: &CoinRegistry, args: &KeyArgs) -> Result<Wallet> {
    let coin: CoinType = args.coin.parse()?;
    if !registry.is_supported(coin) {
        bail!("{coin} wallets are not supported here");
    }

    let phrase = match &args.mnemonic {
        Some(phrase) => phrase.clone(),
        None => std::env::var("WALLET_MNEMONIC")
            .context("No mnemonic: pass --mnemonic or set WALLET_MNEMONIC")?,
    };
    let mnemonic = ZeroizingMnemonic::new(phrase)?;
    let seed = mnemonic.to_seed(&args.passphrase)?;

    let wallet = registry
        .wallet_for(coin, &seed, args.account, args.change, args.index)
        .with_context(|| {
            format!(
                "Failed to derive {coin} wallet at account {} index {}",
                args.account, args.index
            )
        })?;
    info!(
        address = wallet.address(),
        path = wallet.derivation_path(),
        "derived wallet"
    );
    Ok(wallet)
}
