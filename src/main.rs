use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use bip39::Language;
use bip39::Mnemonic;
use bip39::MnemonicType;
use clap::Parser;
use hd_wallet_core::application::config::cli_args;
use hd_wallet_core::application::config::data_directory::DataDirectory;
use hd_wallet_core::application::config::wallet_configuration::WalletConfiguration;
use hd_wallet_core::models::account::pending_debit::BroadcastStatus;
use hd_wallet_core::models::blockchain::regtest::RegtestChain;
use hd_wallet_core::models::primitives::outer_entity::OuterEntity;
use hd_wallet_core::models::primitives::satoshi::Satoshi;
use hd_wallet_core::models::state::wallet::file_key_repository::FileKeyRepository;
use hd_wallet_core::models::state::wallet::hd_node::HdNode;
use hd_wallet_core::Account;
use hd_wallet_core::AccountService;
use hd_wallet_core::Attached;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

const FUNDING: Satoshi = Satoshi::new(100_000);
const PAYMENT: Satoshi = Satoshi::new(25_000);

pub fn main() -> Result<()> {
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .context("Could not create tokio runtime")?;

    let result = tokio_runtime.block_on(async {
        // Fetch the CLI arguments
        let args: cli_args::Args = cli_args::Args::parse();
        set_up_logger()?;
        run(args).await
    });

    tokio_runtime.shutdown_timeout(Duration::from_secs(10));
    result
}

/// Configure logger to use ISO-8601, of which rfc3339 is a subset.
/// Filtered by the `RUST_LOG` env var, accepted values are `trace`, `debug`,
/// `info`, `warn` and `error`.
fn set_up_logger() -> Result<()> {
    let info_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(info_env_filter)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Unable to set global default subscriber")
}

/// Two accounts from one mnemonic on an in-process chain: fund the first,
/// let it pay the second, print every event on the way.
async fn run(args: cli_args::Args) -> Result<()> {
    let data_directory = DataDirectory::get(args.data_dir.clone(), args.network)?;
    DataDirectory::create_dir_if_not_exists(&data_directory.root_dir_path()).await?;
    info!("data directory is {}", data_directory);

    let phrase = match &args.mnemonic {
        Some(phrase) => phrase.clone(),
        None => {
            let mnemonic = Mnemonic::new(MnemonicType::Words24, Language::English);
            println!("generated mnemonic: {}", mnemonic.phrase());
            mnemonic.phrase().to_owned()
        }
    };
    let master = HdNode::from_mnemonic(&phrase, "")?;

    let key_repository =
        FileKeyRepository::open(data_directory.key_repository_dir_path(), args.network).await?;
    let chain = RegtestChain::new();
    let config = WalletConfiguration::from(&args);
    let service = AccountService::new(Arc::new(key_repository), config)?
        .attach(Arc::new(chain.clone()), Arc::new(chain.clone()));

    let mut events = service.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{}] {}", event.account_id.short(), event.event);
        }
    });

    let payer = service.create_from_hd(&master, 0).await?;
    let payee = service.create_from_hd(&master, 1).await?;

    let (payer, funding_address, _) = service.get_address_for_account(&payer, None).await?;
    chain.fund(&funding_address, FUNDING).await;
    let payer = service.get_sync_account_task(&payer).await?;
    print_balance("payer", &payer);

    let (payee, payee_address, _) = service.get_address_for_account(&payee, None).await?;
    let destination = OuterEntity::other_user("payee", payee_address);
    let payer = service.pay(&payer, PAYMENT, &[destination]).await?;
    print_balance("payer (pending)", &payer);

    wait_for_broadcast(&service, &payer).await?;
    chain.mine().await;

    let payer = service.get_sync_account_task(&payer).await?;
    let payee = service.get_sync_account_task(&payee).await?;
    print_balance("payer", &payer);
    print_balance("payee", &payee);

    // let the printer drain what is already queued
    tokio::time::sleep(Duration::from_millis(100)).await;
    printer.abort();
    Ok(())
}

async fn wait_for_broadcast(service: &AccountService<Attached>, account: &Account) -> Result<()> {
    let timeout = service.config().broadcast_timeout + Duration::from_secs(1);
    tokio::time::timeout(timeout, async {
        loop {
            let account = service.refresh(account).await;
            let pending = account.pending_debits();
            if let Some(failed) = pending.iter().find(|d| d.status.is_failed()) {
                anyhow::bail!("payment {} failed: {}", failed.txid, failed.status);
            }
            if pending.iter().all(|d| d.status != BroadcastStatus::InFlight) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("payment was not broadcast in time")?
}

fn print_balance(label: &str, account: &Account) {
    println!(
        "{:<16} {}  balance {}  confirmed {}  pending {}",
        label,
        account.id().short(),
        account.balance(),
        account.confirmed_balance(),
        account.pending_debits().len()
    );
}
