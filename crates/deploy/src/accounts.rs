//! Named-account resolution.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::rpc;

/// How a named account is found on a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    /// Position in the node's `eth_accounts` list.
    Index(usize),
    /// A fixed address.
    Address(Address),
}

/// Named accounts configured for a network, e.g. `deployer = 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedAccounts(pub BTreeMap<String, AccountRef>);

impl NamedAccounts {
    pub fn with(mut self, name: impl Into<String>, account: AccountRef) -> Self {
        self.0.insert(name.into(), account);
        self
    }

    fn needs_node_accounts(&self) -> bool {
        self.0.values().any(|a| matches!(a, AccountRef::Index(_)))
    }

    /// Resolve every name against the node's account list.
    pub fn resolve(&self, available: &[Address]) -> Result<ResolvedAccounts> {
        let mut resolved = BTreeMap::new();
        for (name, account) in &self.0 {
            let address = match *account {
                AccountRef::Address(address) => address,
                AccountRef::Index(index) => *available.get(index).with_context(|| {
                    format!(
                        "Named account {name} refers to account #{index}, but the node only exposes {} accounts. Deployments are signed by the node, so the RPC URL must point at a node or signing proxy holding the key",
                        available.len()
                    )
                })?,
            };
            resolved.insert(name.clone(), address);
        }
        Ok(ResolvedAccounts(resolved))
    }

    /// Resolve through a node, fetching `eth_accounts` only when an index is used.
    pub async fn resolve_with_node(
        &self,
        client: &reqwest::Client,
        rpc_url: &str,
    ) -> Result<ResolvedAccounts> {
        let available: Vec<Address> = if self.needs_node_accounts() {
            rpc::json_rpc_call(client, rpc_url, "eth_accounts", vec![])
                .await
                .context("Failed to fetch node accounts")?
        } else {
            Vec::new()
        };

        tracing::debug!(accounts = available.len(), "Resolving named accounts");
        self.resolve(&available)
    }
}

/// Named accounts mapped to addresses for the current network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccounts(BTreeMap<String, Address>);

impl ResolvedAccounts {
    pub fn get(&self, name: &str) -> Option<Address> {
        self.0.get(name).copied()
    }
}

impl FromIterator<(String, Address)> for ResolvedAccounts {
    fn from_iter<T: IntoIterator<Item = (String, Address)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
