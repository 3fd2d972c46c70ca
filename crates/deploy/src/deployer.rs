//! The deploy call: the seam between the sequencer and the chain.

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::Result;

use crate::{registry::DeploymentRecord, step::ResolvedArg};

/// Everything the deploy call needs to deploy one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// Step name, used as the registry key.
    pub name: String,
    /// Artifact name of the contract.
    pub contract: String,
    /// Constructor arguments, already resolved.
    pub args: Vec<ResolvedArg>,
    /// Account the deployment is sent from.
    pub from: Address,
    /// Whether the deployer should log its progress.
    pub log: bool,
    /// Whether to ask the node to mine a block right after sending.
    pub auto_mine: bool,
    /// Record left by a previous run of the same step.
    pub previous: Option<DeploymentRecord>,
}

/// What the deploy call produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub address: Address,
    /// Creation transaction hash; `None` when `reused`.
    pub transaction_hash: Option<String>,
    pub fingerprint: Option<String>,
    /// The previous deployment was identical and left in place.
    pub reused: bool,
}

/// Deploys a contract and returns where it lives.
///
/// Implementations own idempotence: asked to deploy something identical to
/// `request.previous`, they may return that deployment instead of sending a
/// new transaction.
pub trait ContractDeployer {
    fn deploy(&self, request: DeployRequest) -> impl Future<Output = Result<DeployOutcome>> + Send;
}
