use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use super::network::Network;
use crate::coin_manager::fee_policy::FeePolicy;
use crate::coin_manager::input_selector::InputSelectionPolicy;
use crate::models::primitives::satoshi::Satoshi;

/// The `hd-wallet-core` command-line program runs the account engine against
/// an in-process regtest chain.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// The data directory that holds the key repository.
    ///
    /// The default varies by operating system, and includes the network, e.g.
    ///
    /// Linux:   /home/alice/.local/share/hd-wallet-core/regtest
    #[clap(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Determines which network addresses are encoded for.
    #[clap(long, default_value = "regtest")]
    pub network: Network,

    /// BIP39 phrase for the master key. A fresh 24-word phrase is generated
    /// and printed when absent.
    #[clap(long)]
    pub mnemonic: Option<String>,

    /// Maximum time a transaction submission may take, e.g. `30s`, `2m`.
    #[clap(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub broadcast_timeout: Duration,

    /// Number of consecutive unused addresses scanned before account
    /// synchronization stops.
    #[clap(long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..))]
    pub gap_limit: u32,

    /// Flat fee paid by every transaction, in satoshi.
    #[clap(long, default_value = "1000")]
    pub fee: u64,

    /// Additional fee per transaction input, in satoshi.
    #[clap(long, default_value = "0")]
    pub fee_per_input: u64,

    /// Order in which spendable coins are considered when paying.
    #[clap(long, default_value = "largest-first")]
    pub selection_policy: InputSelectionPolicy,

    /// Buffer size of each account's event channel.
    #[clap(long, default_value = "256", value_parser = clap::value_parser!(usize))]
    pub event_channel_capacity: usize,

    /// Do not recover account history in the background when an account is
    /// created.
    #[clap(long)]
    pub no_recover_on_create: bool,
}

impl Args {
    pub fn fee_policy(&self) -> FeePolicy {
        if self.fee_per_input == 0 {
            FeePolicy::Fixed(Satoshi::new(self.fee))
        } else {
            FeePolicy::Linear {
                base: Satoshi::new(self.fee),
                per_input: Satoshi::new(self.fee_per_input),
                per_output: Satoshi::ZERO,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::wallet_configuration::WalletConfiguration;

    #[test]
    fn defaults_parse() {
        let args = Args::parse_from(["hd-wallet-core"]);
        assert_eq!(args.network, Network::RegTest);
        assert_eq!(args.broadcast_timeout, Duration::from_secs(30));
        assert_eq!(args.fee_policy(), FeePolicy::Fixed(Satoshi::new(1000)));

        let config = WalletConfiguration::from(&args);
        assert!(config.recover_on_create);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn per_input_fee_selects_linear_policy() {
        let args = Args::parse_from([
            "hd-wallet-core",
            "--fee",
            "500",
            "--fee-per-input",
            "100",
            "--broadcast-timeout",
            "2m",
            "--selection-policy",
            "smallest-first",
        ]);
        assert_eq!(args.broadcast_timeout, Duration::from_secs(120));
        assert_eq!(args.selection_policy, InputSelectionPolicy::SmallestFirst);
        assert_eq!(
            args.fee_policy(),
            FeePolicy::Linear {
                base: Satoshi::new(500),
                per_input: Satoshi::new(100),
                per_output: Satoshi::ZERO,
            }
        );
    }

    #[test]
    fn zero_gap_limit_is_refused_by_parser() {
        assert!(Args::try_parse_from(["hd-wallet-core", "--gap-limit", "0"]).is_err());
    }
}
