use std::future::Future;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hd_wallet_core::application::config::data_directory::DataDirectory;
use hd_wallet_core::application::config::network::Network;
use hd_wallet_core::application::config::wallet_configuration::WalletConfiguration;
use hd_wallet_core::coin_manager::fee_policy::FeePolicy;
use hd_wallet_core::models::blockchain::regtest::RegtestChain;
use hd_wallet_core::models::primitives::satoshi::Satoshi;
use hd_wallet_core::models::state::wallet::file_key_repository::FileKeyRepository;
use hd_wallet_core::models::state::wallet::hd_node::HdNode;
use hd_wallet_core::Account;
use hd_wallet_core::AccountService;
use hd_wallet_core::Attached;
use rand::distr::Alphanumeric;
use rand::distr::SampleString;

pub const TEST_MNEMONIC: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const TEST_FEE: Satoshi = Satoshi::new(10);

/// An account service over a file key repository, attached to a regtest
/// chain that may be shared with other nodes.
pub struct WalletNode {
    pub service: AccountService<Attached>,
    pub chain: RegtestChain,
    pub master: HdNode,
    pub data_directory: DataDirectory,
}

// has methods that may be useful for future tests
#[allow(dead_code)]
impl WalletNode {
    /// Create a randomly named `DataDirectory` so filesystem-bound tests can run
    /// in parallel.
    pub fn integration_test_data_directory(network: Network) -> anyhow::Result<DataDirectory> {
        let mut rng = rand::rng();
        let user = std::env::var("USER").unwrap_or_else(|_| "default".to_string());
        let tmp_root: PathBuf = std::env::temp_dir()
            .join(format!("hd-wallet-core-integration-tests-{}", user))
            .join(Path::new(&Alphanumeric.sample_string(&mut rng, 16)));

        DataDirectory::get(Some(tmp_root), network)
    }

    /// regtest configuration with a small fixed fee and no background
    /// recovery, so tests decide when to synchronize.
    pub fn default_config() -> WalletConfiguration {
        WalletConfiguration::regtest()
            .with_fee_policy(FeePolicy::Fixed(TEST_FEE))
            .with_recover_on_create(false)
    }

    pub async fn start_default_node() -> anyhow::Result<Self> {
        let data_directory = Self::integration_test_data_directory(Network::RegTest)?;
        Self::start_node(RegtestChain::new(), data_directory, Self::default_config()).await
    }

    pub async fn start_node(
        chain: RegtestChain,
        data_directory: DataDirectory,
        config: WalletConfiguration,
    ) -> anyhow::Result<Self> {
        let key_repository =
            FileKeyRepository::open(data_directory.key_repository_dir_path(), config.network)
                .await?;
        let service = AccountService::new(Arc::new(key_repository), config)?
            .attach(Arc::new(chain.clone()), Arc::new(chain.clone()));

        Ok(Self {
            service,
            chain,
            master: HdNode::from_mnemonic(TEST_MNEMONIC, "")?,
            data_directory,
        })
    }

    /// Drops the service and opens a new one on the same data directory
    /// and chain.
    pub async fn restart(self) -> anyhow::Result<Self> {
        let config = self.service.config().clone();
        let Self {
            service,
            chain,
            data_directory,
            ..
        } = self;
        drop(service);
        Self::start_node(chain, data_directory, config).await
    }

    pub async fn account(&self, index: u32) -> anyhow::Result<Account> {
        Ok(self.service.create_from_hd(&self.master, index).await?)
    }

    /// Account at `index` with one confirmed coin of `value` on its first
    /// receive address, synchronized.
    pub async fn funded_account(&self, index: u32, value: Satoshi) -> anyhow::Result<Account> {
        let account = self.account(index).await?;
        let (account, receive, _) = self.service.get_address_for_account(&account, None).await?;
        self.chain.fund(&receive, value).await;
        Ok(self.service.get_sync_account_task(&account).await?)
    }

    /// Polls `condition` on fresh snapshots of `account` until it holds.
    pub async fn wait_until<F>(&self, account: &Account, condition: F) -> anyhow::Result<Account>
    where
        F: Fn(&Account) -> bool,
    {
        let (service, condition) = (&self.service, &condition);
        wait_for(move || async move {
            let account = service.refresh(account).await;
            condition(&account).then_some(account)
        })
        .await
    }
}

async fn wait_for<T, F, Fut>(mut poll: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let outcome = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(value) = poll().await {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(outcome)
}
