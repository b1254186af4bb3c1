use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::cli_args;
use super::network::Network;
use crate::api::account_service::error::ConfigError;
use crate::coin_manager::fee_policy::FeePolicy;
use crate::coin_manager::input_selector::InputSelectionPolicy;

pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_GAP_LIMIT: u32 = 20;
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration options for the account service and the coin managers it
/// creates.
///
/// These configurations are usually downstream from CLI arguments, see
/// [`From<&cli_args::Args>`](#impl-From<%26Args>-for-WalletConfiguration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfiguration {
    /// Which network addresses are encoded for
    pub network: Network,

    /// Upper bound on how long a single transaction submission may take
    /// before it is reported as timed out.
    pub broadcast_timeout: Duration,

    /// Number of consecutive unused addresses after which an account
    /// synchronization stops scanning a chain.
    pub gap_limit: u32,

    pub fee_policy: FeePolicy,

    pub selection_policy: InputSelectionPolicy,

    /// Buffer size of each account's event channel. Slow subscribers that
    /// fall further behind than this observe a lag error.
    pub event_channel_capacity: usize,

    /// Whether `create_from_hd` starts a background recovery of the
    /// account's history.
    pub recover_on_create: bool,
}

impl Default for WalletConfiguration {
    fn default() -> Self {
        Self {
            network: Network::default(),
            broadcast_timeout: DEFAULT_BROADCAST_TIMEOUT,
            gap_limit: DEFAULT_GAP_LIMIT,
            fee_policy: FeePolicy::default(),
            selection_policy: InputSelectionPolicy::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            recover_on_create: true,
        }
    }
}

impl WalletConfiguration {
    /// defaults for the regtest network
    pub fn regtest() -> Self {
        Self {
            network: Network::RegTest,
            ..Default::default()
        }
    }

    pub fn with_fee_policy(mut self, fee_policy: FeePolicy) -> Self {
        self.fee_policy = fee_policy;
        self
    }

    pub fn with_broadcast_timeout(mut self, timeout: Duration) -> Self {
        self.broadcast_timeout = timeout;
        self
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit;
        self
    }

    pub fn with_recover_on_create(mut self, recover_on_create: bool) -> Self {
        self.recover_on_create = recover_on_create;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gap_limit == 0 {
            return Err(ConfigError::Invalid("gap limit must be at least 1".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event channel capacity must be at least 1".into(),
            ));
        }
        if self.broadcast_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "broadcast timeout must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl From<&cli_args::Args> for WalletConfiguration {
    fn from(args: &cli_args::Args) -> Self {
        Self {
            network: args.network,
            broadcast_timeout: args.broadcast_timeout,
            gap_limit: args.gap_limit,
            fee_policy: args.fee_policy(),
            selection_policy: args.selection_policy,
            event_channel_capacity: args.event_channel_capacity,
            recover_on_create: !args.no_recover_on_create,
        }
    }
}
