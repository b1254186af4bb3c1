mod common;

use std::sync::Arc;

use common::logging;
use common::wallet_node::WalletNode;
use common::wallet_node::TEST_MNEMONIC;
use hd_wallet_core::application::config::network::Network;
use hd_wallet_core::application::config::wallet_configuration::WalletConfiguration;
use hd_wallet_core::models::account::SyncStatus;
use hd_wallet_core::models::blockchain::regtest::RegtestChain;
use hd_wallet_core::models::primitives::satoshi::Satoshi;
use hd_wallet_core::models::state::wallet::address_path::AddressPath;
use hd_wallet_core::models::state::wallet::hd_node::HdNode;
use hd_wallet_core::models::state::wallet::in_memory_key_repository::InMemoryKeyRepository;
use hd_wallet_core::AccountServiceHandle;
use hd_wallet_core::ErrorCode;

/// test: account keys survive a restart and synchronization recovers the
/// issued addresses and their coins.
#[tokio::test(flavor = "multi_thread")]
pub async fn account_is_recovered_after_restart() -> anyhow::Result<()> {
    logging::tracing_logger();

    let node = WalletNode::start_default_node().await?;
    let account = node.account(0).await?;
    let id = account.id();

    let mut account = account;
    let mut last_receive = None;
    for _ in 0..3 {
        let (next, receive, _) = node.service.get_address_for_account(&account, None).await?;
        account = next;
        last_receive = Some(receive);
    }
    let last_receive = last_receive.ok_or_else(|| anyhow::anyhow!("no address issued"))?;
    node.chain.fund(&last_receive, Satoshi::new(5_000)).await;

    let key_file = node
        .data_directory
        .key_repository_dir_path()
        .join(format!("{}.json", id));
    assert!(key_file.exists());
    drop(account);

    let node = node.restart().await?;
    assert!(node.service.key_repository().contains(&id).await);
    assert_eq!(
        node.service
            .key_repository()
            .get_address(&id, &AddressPath::receive(2))
            .await?,
        last_receive
    );

    let account = node.account(0).await?;
    assert_eq!(account.id(), id);
    assert_eq!(account.next_address_index(), 0);

    let account = node.service.get_sync_account_task(&account).await?;
    assert_eq!(account.sync_status(), SyncStatus::Synced);
    assert_eq!(account.next_address_index(), 3);
    assert_eq!(account.watching_addresses().len(), 6);
    assert_eq!(account.confirmed_balance(), Satoshi::new(5_000));
    Ok(())
}

/// test: a handle refuses account work until a blockchain is attached.
#[tokio::test(flavor = "multi_thread")]
pub async fn handle_requires_attachment() -> anyhow::Result<()> {
    logging::tracing_logger();

    let repository = Arc::new(InMemoryKeyRepository::new(Network::RegTest));
    let config = WalletNode::default_config();
    let mut handle = AccountServiceHandle::new(repository, config)?;
    let master = HdNode::from_mnemonic(TEST_MNEMONIC, "")?;

    let err = handle.create_from_hd(&master, 0).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::BlockchainNotAttached);

    let chain = RegtestChain::new();
    handle.attach(Arc::new(chain.clone()), Arc::new(chain.clone()))?;
    let account = handle.create_from_hd(&master, 0).await?;
    let (_, receive, change) = handle.get_address_for_account(&account, None).await?;
    assert_ne!(receive, change);

    let again = handle.attach(Arc::new(chain.clone()), Arc::new(chain));
    assert!(again.is_err());
    Ok(())
}

/// test: with recovery on creation, a funded account shows its balance
/// without an explicit synchronization.
#[tokio::test(flavor = "multi_thread")]
pub async fn creation_recovers_in_background() -> anyhow::Result<()> {
    logging::tracing_logger();

    let chain = RegtestChain::new();
    let data_directory = WalletNode::integration_test_data_directory(Network::RegTest)?;
    let config = WalletConfiguration::regtest().with_recover_on_create(true);
    let node = WalletNode::start_node(chain, data_directory, config).await?;

    let receive = node
        .master
        .derive_hardened(4)?
        .derive_path(&AddressPath::receive(1))?
        .address(Network::RegTest)?;
    node.chain.fund(&receive, Satoshi::new(777)).await;

    let account = node.account(4).await?;
    let account = node
        .wait_until(&account, |a| a.sync_status() == SyncStatus::Synced)
        .await?;
    assert_eq!(account.confirmed_balance(), Satoshi::new(777));
    assert_eq!(account.next_address_index(), 2);
    Ok(())
}
