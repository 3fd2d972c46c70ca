//! chainsteps-deploy - Ordered, dependency-aware smart contract deployments.
//!
//! A manifest lists [`DeploymentStep`]s. The [`Sequencer`] runs them in order
//! against a [`ContractDeployer`], resolving constructor arguments that refer to
//! earlier steps through the per-network [`Registry`].
//!
//! # Example
//!
//! ```no_run
//! use chainsteps_deploy::{ProjectConfig, Registry, RpcDeployer, Sequencer, TagFilter};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ProjectConfig::default();
//! let network = config.network("localhost")?;
//!
//! let deployer = RpcDeployer::new(&network.rpc_url, config.artifacts_dir())?;
//! let accounts = network
//!     .named_accounts
//!     .resolve_with_node(deployer.client(), deployer.rpc_url())
//!     .await?;
//! let mut registry = Registry::open(config.registry_dir("localhost"), None)?;
//!
//! let _report = Sequencer::new(deployer, accounts)
//!     .auto_mine(network.auto_mine)
//!     .run(&config.steps, &TagFilter::all(), &mut registry)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod accounts;
mod artifacts;
mod config;
mod deployer;
mod deployment_hash;
mod fs;
mod registry;
mod rpc;
mod rpc_deployer;
mod sequencer;
mod step;

pub use accounts::{AccountRef, NamedAccounts, ResolvedAccounts};
pub use artifacts::Artifact;
pub use config::{CONFIG_FILENAME, ENV_PREFIX, NetworkConfig, ProjectConfig, default_steps};
pub use deployer::{ContractDeployer, DeployOutcome, DeployRequest};
pub use deployment_hash::DeploymentFingerprint;
pub use registry::{DeploymentRecord, Registry, RegistryError};
pub use rpc_deployer::{DEFAULT_CONFIRMATION_TIMEOUT, RpcDeployer};
pub use sequencer::{AddressSource, RunReport, SequenceError, Sequencer, StepOutcome, StepStatus};
pub use step::{ConstructorArg, DEFAULT_FROM_ACCOUNT, DeploymentStep, ResolvedArg, TagFilter};
