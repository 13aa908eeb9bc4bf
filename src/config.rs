/// Runtime configuration (§6 EXTERNAL INTERFACES "Environment")
///
/// Mirrors the teacher's `cli::config::CliConfig` shape, narrowed to this
/// client's mainnet-only scope: a `$HOME/.bitlab/` data directory with
/// `logs/` and `history/` subdirectories, plus a small persisted discovery
/// configuration so the operator's last-used discovery mode survives a
/// restart.
use crate::discovery::DiscoveryConfig;
use crate::error::{BitlabError, BitlabResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Paths the core ensures exist; creating the directories is the only
/// filesystem side effect `Config::load` performs.
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub history_dir: PathBuf,
    pub verbose: bool,
    pub user: String,
}

const CONFIG_FILE_NAME: &str = "config.json";

impl Config {
    /// Read `$HOME` and `$USER`, derive the `.bitlab` paths. Does not touch
    /// the filesystem; call [`Config::ensure_directories`] for that.
    pub fn load(verbose: bool) -> BitlabResult<Self> {
        let home = std::env::var("HOME")
            .map_err(|_| BitlabError::Config("$HOME is not set".to_string()))?;
        let home = PathBuf::from(home);
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        let data_dir = home.join(".bitlab");
        Ok(Self {
            logs_dir: data_dir.join("logs"),
            history_dir: data_dir.join("history"),
            data_dir,
            home,
            verbose,
            user,
        })
    }

    pub fn ensure_directories(&self) -> BitlabResult<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.logs_dir)?;
        std::fs::create_dir_all(&self.history_dir)?;
        Ok(())
    }

    pub fn headers_path(&self) -> PathBuf {
        self.data_dir.join("headers.dat")
    }

    pub fn blocks_scratch_path(&self) -> PathBuf {
        self.data_dir.join("blocks.dat")
    }

    pub fn data_scratch_path(&self) -> PathBuf {
        self.data_dir.join("data.dat")
    }

    fn config_file_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE_NAME)
    }

    /// Load the operator's last-used discovery configuration, if any was
    /// ever persisted. Absence is not an error: discovery simply starts
    /// from its all-`false` default.
    pub async fn load_discovery_config(&self) -> DiscoveryConfig {
        match tokio::fs::read(self.config_file_path()).await {
            Ok(bytes) => serde_json::from_slice::<PersistedConfig>(&bytes)
                .map(|p| p.discovery)
                .unwrap_or_default(),
            Err(_) => DiscoveryConfig::default(),
        }
    }

    pub async fn save_discovery_config(&self, discovery: &DiscoveryConfig) -> BitlabResult<()> {
        let persisted = PersistedConfig {
            discovery: discovery.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| BitlabError::Config(e.to_string()))?;
        tokio::fs::write(self.config_file_path(), bytes).await?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedConfig {
    discovery: DiscoveryConfig,
}

/// Warn if the configured home directory resolves to root's, matching the
/// spec's "warn when root" requirement for `whoami`.
pub fn is_root_user(user: &str) -> bool {
    user == "root"
}
