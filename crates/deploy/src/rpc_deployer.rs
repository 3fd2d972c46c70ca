//! Deploy call over an EVM node's JSON-RPC interface.
//!
//! Transactions are sent with `eth_sendTransaction`, so the node must hold the
//! deployer's key (true for Anvil, Hardhat and Geth dev nodes, or a signing proxy).

use std::path::PathBuf;
use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    artifacts::Artifact,
    deployer::{ContractDeployer, DeployOutcome, DeployRequest},
    deployment_hash::DeploymentFingerprint,
    rpc,
};

/// Default time to wait for a creation transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    transaction_hash: String,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    status: Option<String>,
    contract_address: Option<Address>,
}

/// [`ContractDeployer`] backed by a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcDeployer {
    client: reqwest::Client,
    rpc_url: String,
    artifacts_dir: PathBuf,
    confirmation_timeout: Duration,
}

impl RpcDeployer {
    pub fn new(rpc_url: impl Into<String>, artifacts_dir: impl Into<PathBuf>) -> Result<Self> {
        let rpc_url = rpc_url.into();
        rpc::validate_url(&rpc_url)?;

        Ok(Self {
            client: rpc::create_client()?,
            rpc_url,
            artifacts_dir: artifacts_dir.into(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        })
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// The chain id reported by the node.
    pub async fn chain_id(&self) -> Result<u64> {
        let hex: String = rpc::json_rpc_call(&self.client, &self.rpc_url, "eth_chainId", vec![])
            .await
            .context("Failed to fetch chain id")?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .context(format!("Invalid chain id returned by node: {hex}"))
    }

    async fn has_code(&self, address: Address) -> Result<bool> {
        let code: String = rpc::json_rpc_call(
            &self.client,
            &self.rpc_url,
            "eth_getCode",
            vec![json!(address), json!("latest")],
        )
        .await?;
        Ok(!code.trim_start_matches("0x").is_empty())
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt> {
        let client = &self.client;
        let url = self.rpc_url.as_str();

        rpc::poll_until(
            &format!("receipt of {tx_hash}"),
            self.confirmation_timeout,
            move || async move {
                rpc::json_rpc_call::<Option<TransactionReceipt>>(
                    client,
                    url,
                    "eth_getTransactionReceipt",
                    vec![json!(tx_hash)],
                )
                .await
            },
        )
        .await
    }
}

impl ContractDeployer for RpcDeployer {
    async fn deploy(&self, request: DeployRequest) -> Result<DeployOutcome> {
        let artifact = Artifact::find(&self.artifacts_dir, &request.contract)?;
        tracing::debug!(
            step = %request.name,
            artifact = %artifact.path.display(),
            "Artifact found"
        );
        let encoded_args = artifact.encode_constructor_args(&request.args)?;
        let fingerprint =
            DeploymentFingerprint::new(&request.contract, &artifact.bytecode, &encoded_args)
                .compute_hash();

        if let Some(previous) = &request.previous {
            if previous.fingerprint.as_deref() == Some(fingerprint.as_str())
                && self.has_code(previous.address).await?
            {
                if request.log {
                    tracing::info!(
                        step = %request.name,
                        address = %previous.address,
                        "Identical deployment found, reusing"
                    );
                }
                return Ok(DeployOutcome {
                    address: previous.address,
                    transaction_hash: None,
                    fingerprint: Some(fingerprint),
                    reused: true,
                });
            }
        }

        let data = format!("0x{}", hex::encode(artifact.creation_code(&encoded_args)));

        let tx_hash: String = rpc::json_rpc_call(
            &self.client,
            &self.rpc_url,
            "eth_sendTransaction",
            vec![json!({ "from": request.from, "data": data })],
        )
        .await
        .context(format!("Failed to send creation transaction for {}", request.name))?;

        if request.log {
            tracing::info!(
                step = %request.name,
                contract = %request.contract,
                from = %request.from,
                tx_hash = %tx_hash,
                "Creation transaction sent"
            );
        }

        if request.auto_mine {
            let _: Value = rpc::json_rpc_call(&self.client, &self.rpc_url, "evm_mine", vec![])
                .await
                .context("Failed to auto-mine block")?;
        }

        let receipt = self.wait_for_receipt(&tx_hash).await?;

        if let Some(status) = receipt.status.as_deref() {
            if status != "0x1" {
                anyhow::bail!(
                    "Creation transaction {} for {} reverted",
                    receipt.transaction_hash,
                    request.name
                );
            }
        }

        let address = receipt.contract_address.context(format!(
            "Receipt of {} has no contract address",
            receipt.transaction_hash
        ))?;

        Ok(DeployOutcome {
            address,
            transaction_hash: Some(receipt.transaction_hash),
            fingerprint: Some(fingerprint),
            reused: false,
        })
    }
}
