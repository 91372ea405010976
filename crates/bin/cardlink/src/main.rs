//! # cardlink — card reader operator CLI
//!
//! Composition root that wires the card reader core to a transport and runs
//! one operation.
//!
//! ## Responsibilities
//! - Parse configuration (CLI args, env vars, config file)
//! - Install the tracing subscriber
//! - Pick the transport: BLE hardware, or the simulated reader (`--virtual`)
//! - Construct the connection manager and card services
//! - Connect, run the requested operation, disconnect
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer. No domain logic belongs here.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use cardlink_adapter_ble::BleTransport;
use cardlink_adapter_virtual::{InMemoryLedger, VirtualCardReader};
use cardlink_app::event_bus::InProcessEventBus;
use cardlink_app::lifecycle::ConnectionManager;
use cardlink_app::ports::{Discovery, Ledger, Transport};
use cardlink_app::protocol::ProtocolEngine;
use cardlink_app::services::card_service::CardService;
use cardlink_app::services::history::TransactionLog;
use cardlink_app::services::wallet_service::{WalletOutcome, WalletService};
use cardlink_domain::amount::Balance;
use cardlink_domain::error::CardError;
use cardlink_domain::peer::{Peer, PeerId};
use cardlink_domain::time::format_receipt;
use cardlink_domain::transaction::TransactionKind;

use crate::config::Config;

/// Machine number of the simulated reader.
const VIRTUAL_MACHINE_NO: &str = "1001";

#[derive(Parser)]
#[command(name = "cardlink")]
#[command(about = "Read, initialize and recharge wallet cards through a BLE card reader", long_about = None)]
#[command(version)]
struct Cli {
    /// Use a simulated reader and an in-memory ledger
    #[arg(long = "virtual", global = true)]
    virtual_reader: bool,
    /// Peer id of the reader (defaults to the first reader found)
    #[arg(short, long, global = true)]
    device: Option<String>,
    /// Configuration file
    #[arg(short, long, global = true, default_value = "cardlink.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List nearby readers
    Scan,
    /// Read the balance of the card on the reader
    Balance,
    /// Initialize a blank card with an opening balance
    Init {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
    /// Recharge the card on the reader
    Recharge {
        #[arg(allow_negative_numbers = true)]
        amount: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.filter)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.virtual_reader {
        let reader =
            VirtualCardReader::new(VIRTUAL_MACHINE_NO).with_prefix(&config.ble.name_prefix);
        let ledger = InMemoryLedger::new().with_machine(VIRTUAL_MACHINE_NO, 0);
        run(&cli, &config, Arc::new(reader), Some(ledger)).await
    } else {
        let transport = BleTransport::open(config.ble.clone())
            .await
            .context("failed to open the BLE adapter")?;
        run(&cli, &config, Arc::new(transport), None::<InMemoryLedger>).await
    }
}

async fn run<T, L>(
    cli: &Cli,
    config: &Config,
    transport: Arc<T>,
    ledger: Option<L>,
) -> anyhow::Result<()>
where
    T: Transport + Discovery,
    L: Ledger,
{
    let scan_duration = Duration::from_secs(u64::from(config.ble.scan_duration_secs));
    if matches!(cli.command, Commands::Scan) {
        return scan(&*transport, config, scan_duration).await;
    }

    let peer = match &cli.device {
        Some(id) => Peer::new(PeerId::new(id.as_str()), None),
        None => {
            let found = transport
                .scan_all(scan_duration)
                .await
                .context("scan failed")?;
            let Some(peer) = found.into_iter().next() else {
                bail!("no reader found, is it powered and in range?");
            };
            peer
        }
    };
    let machine_no = peer
        .machine_no(&config.ble.name_prefix)
        .map_or_else(|| peer.id.to_string(), str::to_owned);

    let events = InProcessEventBus::new(16);
    let manager = Arc::new(ConnectionManager::new(Arc::clone(&transport), events));
    manager
        .connect(&peer.id)
        .await
        .with_context(|| format!("failed to connect to {}", peer.id))?;
    tracing::info!(peer = %peer.id, %machine_no, "connected to reader");
    manager.monitor(|peer| eprintln!("connection to {peer} lost"));

    let cards = Arc::new(CardService::new(
        Arc::clone(&manager),
        ProtocolEngine::new(config.engine_config()),
        config.card_limits(),
    ));
    let wallet = ledger.map(|ledger| {
        WalletService::new(Arc::clone(&cards), ledger, Arc::new(TransactionLog::new()))
    });

    let outcome = match &cli.command {
        Commands::Scan => Ok(()),
        Commands::Balance => cards
            .read_balance()
            .await
            .map(|balance| println!("balance: {balance}")),
        Commands::Init { amount } => match &wallet {
            Some(wallet) => wallet
                .initialize(&machine_no, *amount)
                .await
                .map(|outcome| print_outcome(&outcome)),
            None => cards.initialize_card(*amount).await.map(|update| {
                println!("initialized with {}", update.amount);
                print_balance(update.balance);
            }),
        },
        Commands::Recharge { amount } => match &wallet {
            Some(wallet) => wallet
                .recharge(&machine_no, *amount)
                .await
                .map(|outcome| print_outcome(&outcome)),
            None => cards.recharge_card(*amount).await.map(|update| {
                println!("recharged {}", update.amount);
                print_balance(update.balance);
            }),
        },
    };

    manager.unmonitor();
    manager.disconnect().await;
    if let Err(err) = &outcome {
        tracing::debug!(code = err.code(), %err, "card operation failed");
    }
    outcome.map_err(describe)
}

async fn scan<D: Discovery>(
    discovery: &D,
    config: &Config,
    duration: Duration,
) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<Peer>(16);
    let print = async {
        let mut count = 0_usize;
        while let Some(peer) = rx.recv().await {
            count += 1;
            let machine_no = peer.machine_no(&config.ble.name_prefix).unwrap_or("?");
            let rssi = peer.rssi.map_or_else(|| "-".to_owned(), |rssi| rssi.to_string());
            println!("{}\tmachine {machine_no}\trssi {rssi}", peer.id);
        }
        count
    };
    let (scanned, count) = tokio::join!(discovery.scan(duration, tx), print);
    scanned.context("scan failed")?;
    if count == 0 {
        eprintln!("no reader found");
    }
    Ok(())
}

fn print_outcome(outcome: &WalletOutcome) {
    let transaction = outcome.transaction();
    println!(
        "{} {} on machine {} at {}",
        match transaction.kind {
            TransactionKind::Initialize => "initialized",
            TransactionKind::Recharge => "recharged",
        },
        transaction.amount,
        transaction.machine_no,
        format_receipt(transaction.at),
    );
    print_balance(outcome.update().balance);
    if let WalletOutcome::LedgerSyncFailed { error, .. } = outcome {
        eprintln!("warning: card updated but the ledger was not: {error}");
    }
}

fn print_balance(balance: Option<Balance>) {
    match balance {
        Some(balance) => println!("card balance: {balance}"),
        None => println!("card balance: unknown"),
    }
}

fn describe(err: CardError) -> anyhow::Error {
    match &err {
        CardError::CardAlreadyInitialized {
            balance: Some(balance),
        } => anyhow::anyhow!("{}: {err} (balance {balance})", err.code()),
        _ => anyhow::anyhow!("{}: {err}", err.code()),
    }
}
