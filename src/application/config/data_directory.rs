use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use directories::ProjectDirs;
use serde::Deserialize;
use serde::Serialize;

use super::network::Network;

const KEY_REPOSITORY_DIRECTORY_NAME: &str = "keys";

/// Location of all persisted wallet data for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDirectory {
    root: PathBuf,
}

impl DataDirectory {
    /// Resolve the data directory for `network`.
    ///
    /// An explicit `root_dir` is used as-is (with the network appended);
    /// otherwise the platform's data directory is used.
    pub fn get(root_dir: Option<PathBuf>, network: Network) -> Result<Self> {
        let root = match root_dir {
            Some(explicit_root) => explicit_root,
            None => ProjectDirs::from("org", "hd-wallet", "hd-wallet-core")
                .context("Could not determine a data directory for this platform")?
                .data_dir()
                .to_path_buf(),
        };

        Ok(Self {
            root: root.join(network.to_string()),
        })
    }

    /// Create directory if it does not exist
    pub async fn create_dir_if_not_exists(dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", dir.to_string_lossy()))
    }

    pub fn root_dir_path(&self) -> PathBuf {
        self.root.clone()
    }

    /// The directory where account key files are stored
    pub fn key_repository_dir_path(&self) -> PathBuf {
        self.root.join(Path::new(KEY_REPOSITORY_DIRECTORY_NAME))
    }
}

impl std::fmt::Display for DataDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root.display())
    }
}
