//! Ordered, dependency-aware execution of deployment steps.
//!
//! Steps run one at a time in declaration order. A step whose constructor
//! arguments reference another step's address only runs once that step has a
//! record; otherwise the run stops with [`SequenceError::MissingDependency`]
//! before the deploy call is made. Deploy-call failures abort the run and are
//! returned as-is. Records written before a failure stay written.

use std::collections::{BTreeMap, BTreeSet};

use alloy_core::primitives::Address;
use anyhow::Result;
use derive_more::{Display, Error};

use crate::{
    accounts::ResolvedAccounts,
    deployer::{ContractDeployer, DeployRequest},
    registry::{DeploymentRecord, Registry},
    step::{ConstructorArg, DeploymentStep, ResolvedArg, TagFilter},
};

/// Errors raised by the sequencer itself.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum SequenceError {
    /// A referenced step has no record yet.
    #[display("{dependency} not found. Run with --tags {tag} first.")]
    MissingDependency {
        step: String,
        dependency: String,
        tag: String,
    },
    /// The step deploys from a named account the network does not define.
    #[display("{step} deploys from unknown named account {account}")]
    UnknownAccount { step: String, account: String },
    /// A pinned dependency was deployed earlier in the same run.
    #[display(
        "{dependency} was deployed during this run, but {step} is configured to use its pinned address {pinned}. Run with --tags {tag} to deploy {step} on its own."
    )]
    OverrideConflict {
        step: String,
        dependency: String,
        pinned: Address,
        tag: String,
    },
    /// Two steps share a name, so they would share a registry key.
    #[display("step {name} is declared more than once")]
    DuplicateStep { name: String },
}

/// Where referenced addresses come from.
///
/// By default every reference is read from the registry. Overrides pin a
/// fixed address for a step name instead, for networks where the dependency
/// was deployed outside this manifest. A pinned dependency must still have a
/// record, and must not have been deployed in the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSource {
    overrides: BTreeMap<String, Address>,
}

impl AddressSource {
    /// Read every reference from the registry.
    pub fn registry() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: BTreeMap<String, Address>) -> Self {
        Self { overrides }
    }

    fn pinned(&self, name: &str) -> Option<Address> {
        self.overrides.get(name).copied()
    }
}

/// Whether a step produced a new deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StepStatus {
    Deployed,
    Reused,
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub name: String,
    pub contract: String,
    pub address: Address,
    pub args: Vec<ResolvedArg>,
    pub status: StepStatus,
}

/// Summary of a run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<StepOutcome>,
}

impl RunReport {
    pub fn deployed(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Deployed)
    }
}

/// Runs deployment steps against a [`ContractDeployer`].
#[derive(Debug)]
pub struct Sequencer<D> {
    deployer: D,
    accounts: ResolvedAccounts,
    addresses: AddressSource,
    auto_mine: bool,
    log: bool,
}

impl<D: ContractDeployer> Sequencer<D> {
    pub fn new(deployer: D, accounts: ResolvedAccounts) -> Self {
        Self {
            deployer,
            accounts,
            addresses: AddressSource::registry(),
            auto_mine: false,
            log: true,
        }
    }

    pub fn address_source(mut self, addresses: AddressSource) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn auto_mine(mut self, auto_mine: bool) -> Self {
        self.auto_mine = auto_mine;
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn deployer(&self) -> &D {
        &self.deployer
    }

    /// Resolve a step's constructor arguments.
    ///
    /// `manifest` is only used to name the tag an operator should run when a
    /// dependency is missing.
    pub fn resolve_args(
        &self,
        step: &DeploymentStep,
        manifest: &[DeploymentStep],
        registry: &Registry,
    ) -> Result<Vec<ResolvedArg>, SequenceError> {
        let mut resolved = Vec::with_capacity(step.args.len());
        for arg in &step.args {
            let dependency = match arg {
                ConstructorArg::Literal(value) => {
                    resolved.push(ResolvedArg::Literal(value.clone()));
                    continue;
                }
                ConstructorArg::AddressOf { address_of } => address_of,
            };

            let Some(record) = registry.get_or_null(dependency) else {
                return Err(SequenceError::MissingDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                    tag: Self::tag_of(dependency, manifest),
                });
            };

            let address = match self.addresses.pinned(dependency) {
                None => record.address,
                Some(pinned) if registry.recorded_this_run(dependency) => {
                    return Err(SequenceError::OverrideConflict {
                        step: step.name.clone(),
                        dependency: dependency.clone(),
                        pinned,
                        tag: step.primary_tag().to_string(),
                    });
                }
                Some(pinned) => {
                    tracing::warn!(
                        step = %step.name,
                        dependency = %dependency,
                        recorded = %record.address,
                        pinned = %pinned,
                        "Using pinned address instead of the recorded one"
                    );
                    pinned
                }
            };
            resolved.push(ResolvedArg::Address(address));
        }
        Ok(resolved)
    }

    /// The tag an operator should run to deploy `name`.
    fn tag_of(name: &str, manifest: &[DeploymentStep]) -> String {
        manifest
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.primary_tag().to_string())
            .unwrap_or_else(|| name.to_string())
    }

    fn check_unique_names(steps: &[DeploymentStep]) -> Result<(), SequenceError> {
        let mut seen = BTreeSet::new();
        for step in steps {
            if !seen.insert(step.name.as_str()) {
                return Err(SequenceError::DuplicateStep {
                    name: step.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Execute every step selected by `filter`, in declaration order.
    pub async fn run(
        &self,
        steps: &[DeploymentStep],
        filter: &TagFilter,
        registry: &mut Registry,
    ) -> Result<RunReport> {
        Self::check_unique_names(steps)?;

        let selected = filter.select(steps);
        if selected.is_empty() && !filter.is_empty() {
            tracing::warn!(
                tags = ?filter.tags().collect::<Vec<_>>(),
                "No deployment step matches the requested tags"
            );
        }

        tracing::info!(
            selected = selected.len(),
            total = steps.len(),
            "Running deployment steps..."
        );

        let mut report = RunReport::default();
        for step in selected {
            let outcome = self.run_step(step, steps, registry).await?;
            report.outcomes.push(outcome);
        }

        tracing::info!(steps = report.outcomes.len(), "✓ Deployment run complete");
        Ok(report)
    }

    async fn run_step(
        &self,
        step: &DeploymentStep,
        manifest: &[DeploymentStep],
        registry: &mut Registry,
    ) -> Result<StepOutcome> {
        let args = self.resolve_args(step, manifest, registry)?;

        let from = self
            .accounts
            .get(&step.from)
            .ok_or_else(|| SequenceError::UnknownAccount {
                step: step.name.clone(),
                account: step.from.clone(),
            })?;

        let previous = registry.get_or_null(&step.name).cloned();

        tracing::debug!(
            step = %step.name,
            contract = %step.contract,
            args = ?args.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Deploying step"
        );

        let outcome = self
            .deployer
            .deploy(DeployRequest {
                name: step.name.clone(),
                contract: step.contract.clone(),
                args: args.clone(),
                from,
                log: self.log,
                auto_mine: self.auto_mine,
                previous: previous.clone(),
            })
            .await?;

        let deployed_at = match (&previous, outcome.reused) {
            (Some(previous), true) => previous.deployed_at,
            _ => chrono::Utc::now().timestamp(),
        };

        registry.record(
            &step.name,
            DeploymentRecord {
                contract: step.contract.clone(),
                address: outcome.address,
                args: args.iter().map(ToString::to_string).collect(),
                transaction_hash: outcome
                    .transaction_hash
                    .clone()
                    .or_else(|| previous.and_then(|p| p.transaction_hash)),
                fingerprint: outcome.fingerprint.clone(),
                deployed_at,
            },
        )?;

        let status = if outcome.reused {
            tracing::info!(step = %step.name, address = %outcome.address, "👋 {} reused at: {}", step.name, outcome.address);
            StepStatus::Reused
        } else {
            tracing::info!(step = %step.name, address = %outcome.address, "👋 {} deployed at: {}", step.name, outcome.address);
            StepStatus::Deployed
        };

        Ok(StepOutcome {
            name: step.name.clone(),
            contract: step.contract.clone(),
            address: outcome.address,
            args,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    struct NeverDeploys;

    impl ContractDeployer for NeverDeploys {
        async fn deploy(&self, request: DeployRequest) -> Result<crate::deployer::DeployOutcome> {
            anyhow::bail!("unexpected deploy of {}", request.name)
        }
    }

    fn factory() -> DeploymentStep {
        DeploymentStep::new("ProposalFactory", "ProposalFactory")
            .arg(ConstructorArg::address_of("DAOImplementation"))
            .arg(ConstructorArg::literal("ERC721_ADDRESS_literal"))
    }

    #[test]
    fn test_literals_pass_through() {
        let sequencer = Sequencer::new(NeverDeploys, ResolvedAccounts::default());
        let step = DeploymentStep::new("Nft", "Nft")
            .arg(ConstructorArg::literal("The Satwas Band Dev"))
            .arg(ConstructorArg::literal("TSBD"));

        let args = sequencer
            .resolve_args(&step, &[], &Registry::in_memory())
            .unwrap();
        assert_eq!(
            args,
            vec![
                ResolvedArg::Literal("The Satwas Band Dev".into()),
                ResolvedArg::Literal("TSBD".into()),
            ]
        );
    }

    #[test]
    fn test_reference_resolves_to_recorded_address() {
        let sequencer = Sequencer::new(NeverDeploys, ResolvedAccounts::default());
        let mut registry = Registry::in_memory();
        let dao = Address::with_last_byte(0x0d);
        registry
            .record("DAOImplementation", DeploymentRecord::new("DAOImplementation", dao))
            .unwrap();

        let args = sequencer.resolve_args(&factory(), &[], &registry).unwrap();
        assert_eq!(
            args,
            vec![
                ResolvedArg::Address(dao),
                ResolvedArg::Literal("ERC721_ADDRESS_literal".into()),
            ]
        );
    }

    #[test]
    fn test_missing_reference_names_tag_from_manifest() {
        let sequencer = Sequencer::new(NeverDeploys, ResolvedAccounts::default());
        let mut dao = DeploymentStep::new("DAOImplementation", "DAOImplementation");
        dao.tags = BTreeSet::from(["implementations".to_string()]);

        let err = sequencer
            .resolve_args(&factory(), &[dao], &Registry::in_memory())
            .unwrap_err();
        assert_eq!(
            err,
            SequenceError::MissingDependency {
                step: "ProposalFactory".into(),
                dependency: "DAOImplementation".into(),
                tag: "implementations".into(),
            }
        );
        assert_eq!(
            err.to_string(),
            "DAOImplementation not found. Run with --tags implementations first."
        );
    }

    fn pinning(dao: Address) -> Sequencer<NeverDeploys> {
        Sequencer::new(NeverDeploys, ResolvedAccounts::default()).address_source(
            AddressSource::with_overrides(BTreeMap::from([("DAOImplementation".to_string(), dao)])),
        )
    }

    #[test]
    fn test_override_replaces_record_from_previous_run() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        let dir = temp_dir.path().join("sepolia");
        {
            let mut registry = Registry::open(&dir, None).unwrap();
            registry
                .record(
                    "DAOImplementation",
                    DeploymentRecord::new("DAOImplementation", Address::with_last_byte(1)),
                )
                .unwrap();
        }

        let pinned = Address::with_last_byte(0x99);
        let registry = Registry::open(&dir, None).unwrap();
        let args = pinning(pinned)
            .resolve_args(&factory(), &[], &registry)
            .unwrap();
        assert_eq!(args[0], ResolvedArg::Address(pinned));
    }

    #[test]
    fn test_override_still_requires_a_record() {
        let err = pinning(Address::with_last_byte(0x99))
            .resolve_args(&factory(), &[], &Registry::in_memory())
            .unwrap_err();
        assert!(matches!(err, SequenceError::MissingDependency { .. }));
    }

    #[test]
    fn test_override_refused_for_dependency_deployed_this_run() {
        let pinned = Address::with_last_byte(0x99);
        let mut registry = Registry::in_memory();
        registry
            .record(
                "DAOImplementation",
                DeploymentRecord::new("DAOImplementation", Address::with_last_byte(1)),
            )
            .unwrap();

        let err = pinning(pinned)
            .resolve_args(&factory(), &[], &registry)
            .unwrap_err();
        assert_eq!(
            err,
            SequenceError::OverrideConflict {
                step: "ProposalFactory".into(),
                dependency: "DAOImplementation".into(),
                pinned,
                tag: "ProposalFactory".into(),
            }
        );
        assert!(err.to_string().contains("Run with --tags ProposalFactory"));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_before_any_deploy() {
        let sequencer = Sequencer::new(NeverDeploys, ResolvedAccounts::default());
        let steps = vec![
            DeploymentStep::new("Token", "Token"),
            DeploymentStep::new("Token", "OtherToken"),
        ];

        let err = sequencer
            .run(&steps, &TagFilter::all(), &mut Registry::in_memory())
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<SequenceError>(),
            Some(&SequenceError::DuplicateStep {
                name: "Token".into()
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_account_fails_before_deploy() {
        let sequencer = Sequencer::new(NeverDeploys, ResolvedAccounts::default());
        let steps = vec![DeploymentStep::new("Token", "Token")];

        let err = sequencer
            .run(&steps, &TagFilter::all(), &mut Registry::in_memory())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SequenceError>(),
            Some(SequenceError::UnknownAccount { account, .. }) if account == "deployer"
        ));
    }

    #[tokio::test]
    async fn test_filter_matching_nothing_runs_nothing() {
        let sequencer = Sequencer::new(NeverDeploys, ResolvedAccounts::default());
        let steps = vec![DeploymentStep::new("Token", "Token")];
        let mut registry = Registry::in_memory();

        let report = sequencer
            .run(&steps, &TagFilter::new(["Nope"]), &mut registry)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(registry.is_empty());
    }
}
