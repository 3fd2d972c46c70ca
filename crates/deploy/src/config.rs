//! Project configuration: networks and the deployment manifest.
//!
//! The file is TOML (`Chainsteps.toml` by default). Any field can be
//! overridden from the environment with the `CHAINSTEPS_` prefix, using `__`
//! as the nesting separator, e.g. `CHAINSTEPS_NETWORKS__LOCALHOST__RPC_URL`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_core::primitives::{Address, address};
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    accounts::{AccountRef, NamedAccounts},
    rpc_deployer::DEFAULT_CONFIRMATION_TIMEOUT,
    sequencer::AddressSource,
    step::{ConstructorArg, DEFAULT_FROM_ACCOUNT, DeploymentStep},
};

/// The default name for the project configuration file.
pub const CONFIG_FILENAME: &str = "Chainsteps.toml";

/// Prefix of environment variables overriding the configuration file.
pub const ENV_PREFIX: &str = "CHAINSTEPS_";

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT.as_secs()
}

/// Settings for one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,
    /// Expected chain id. Checked against the node and the registry when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Mine a block right after each creation transaction (local dev nodes).
    #[serde(default)]
    pub auto_mine: bool,
    /// How long to wait for a creation transaction to be mined.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Named accounts steps deploy from.
    #[serde(default)]
    pub named_accounts: NamedAccounts,
    /// Fixed addresses used in place of registry lookups for these step names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub address_overrides: BTreeMap<String, Address>,
}

impl NetworkConfig {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id: None,
            auto_mine: false,
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            named_accounts: NamedAccounts::default()
                .with(DEFAULT_FROM_ACCOUNT, AccountRef::Index(0)),
            address_overrides: BTreeMap::new(),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn address_source(&self) -> AddressSource {
        if self.address_overrides.is_empty() {
            AddressSource::registry()
        } else {
            AddressSource::with_overrides(self.address_overrides.clone())
        }
    }
}

/// The whole project: where artifacts and records live, networks, and steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Directory holding compiled contract artifacts.
    pub artifacts: PathBuf,
    /// Directory holding one registry per network.
    pub deployments: PathBuf,
    /// Network used when none is requested.
    pub default_network: String,
    /// Known networks, by name.
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Deployment steps, in execution order.
    #[serde(default)]
    pub steps: Vec<DeploymentStep>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let mut localhost = NetworkConfig::new("http://127.0.0.1:8545");
        localhost.auto_mine = true;

        // Public endpoints cannot sign; a local signing proxy (e.g. Frame) holds the deployer key.
        let mut sepolia = NetworkConfig::new("http://127.0.0.1:1248");
        sepolia.chain_id = Some(11155111);
        // Implementations already live on Sepolia; the factory points at these.
        sepolia.address_overrides = BTreeMap::from([
            (
                "DAOImplementation".to_string(),
                address!("B6b899b2343Dd703CD70d719bccf1c82E0979f0C"),
            ),
            (
                "BusinessProposalImplementation".to_string(),
                address!("c25FA8c40Ef178a62502dB2C7153b24a64F6250b"),
            ),
        ]);

        Self {
            artifacts: PathBuf::from("artifacts"),
            deployments: PathBuf::from("deployments"),
            default_network: "localhost".to_string(),
            networks: BTreeMap::from([
                ("localhost".to_string(), localhost),
                ("sepolia".to_string(), sepolia),
            ]),
            steps: default_steps(),
            base_dir: PathBuf::new(),
        }
    }
}

/// The deployment manifest of the Satwas DAO contracts.
pub fn default_steps() -> Vec<DeploymentStep> {
    vec![
        DeploymentStep::new("TheSatwasBandDev", "TheSatwasBandDev").args([
            ConstructorArg::literal("The Satwas Band Dev"),
            ConstructorArg::literal("TSBD"),
            ConstructorArg::literal(
                "https://ipfs.io/ipfs/QmZHdPSMqhFfVmCQtGv18zUNMGVY4faZhkgoi9eTNj2i4X/",
            ),
            ConstructorArg::literal(
                "https://ipfs.io/ipfs/QmbSLKQgzitE1aKkHvQEMrMch7xGoo7mMjoqom5qni8qKP/hidden.json",
            ),
        ]),
        DeploymentStep::new("DAOImplementation", "DAOImplementation"),
        DeploymentStep::new(
            "BusinessProposalImplementation",
            "BusinessProposalImplementation",
        ),
        DeploymentStep::new("ProposalFactory", "ProposalFactory").args([
            ConstructorArg::address_of("DAOImplementation"),
            ConstructorArg::address_of("BusinessProposalImplementation"),
            ConstructorArg::literal("0x905181635f2FEB3c62f6eF216106eF06c01b449E"),
        ]),
    ]
}

impl ProjectConfig {
    /// Load the configuration from a TOML file, applying environment overrides.
    ///
    /// `path` may also be a directory containing [`CONFIG_FILENAME`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "Configuration file or directory not found: {}. Run `chainsteps init` to create one.",
                path.display()
            );
        }

        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let mut config: Self = Figment::new()
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context(format!(
                "Failed to load configuration from {}",
                config_path.display()
            ))?;

        config.base_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        tracing::info!(path = %config_path.display(), steps = config.steps.len(), "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// The settings of `name`, or an error listing the known networks.
    pub fn network(&self, name: &str) -> Result<&NetworkConfig> {
        self.networks.get(name).with_context(|| {
            format!(
                "Unknown network {}. Known networks: {}",
                name,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.base_dir.join(&self.artifacts)
    }

    /// Registry directory of a network.
    pub fn registry_dir(&self, network: &str) -> PathBuf {
        self.base_dir.join(&self.deployments).join(network)
    }
}
