use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use strum::EnumIter;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default, EnumIter)]
pub enum Network {
    /// Main net.
    #[default]
    Main,

    /// Public test network. Coins have no value.
    Testnet,

    /// Network for individual unit and integration tests, backed by an
    /// in-process chain.
    RegTest,
}

impl Network {
    /// human-readable part used when encoding segwit addresses for this
    /// network.
    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            Network::Main => "bc",
            Network::Testnet => "tb",
            Network::RegTest => "bcrt",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::RegTest => "regtest",
        };
        write!(f, "{}", string)
    }
}

impl FromStr for Network {
    type Err = String;
    fn from_str(input: &str) -> Result<Network, Self::Err> {
        match input {
            "main" => Ok(Network::Main),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::RegTest),
            _ => Err(format!("Failed to parse {} as network", input)),
        }
    }
}
