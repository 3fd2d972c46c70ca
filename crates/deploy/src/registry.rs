//! Per-network registry of deployment records.
//!
//! The registry maps a step name to the address its contract was deployed at.
//! Records loaded from disk persist across runs; within a single run each name
//! may be written at most once.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::fs::FsHandler;

/// File holding the chain id a registry directory belongs to.
pub const CHAIN_ID_FILENAME: &str = ".chainId";

/// Lock file held for the duration of a run.
pub const LOCK_FILENAME: &str = ".lock";

/// The result of executing a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Artifact name of the deployed contract.
    pub contract: String,
    /// Address the contract lives at.
    pub address: Address,
    /// Constructor arguments the contract was deployed with.
    #[serde(default)]
    pub args: Vec<String>,
    /// Hash of the creation transaction, absent when an existing deployment was reused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Fingerprint of creation code and encoded args.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Unix timestamp of the deployment.
    #[serde(default)]
    pub deployed_at: i64,
}

impl DeploymentRecord {
    pub fn new(contract: impl Into<String>, address: Address) -> Self {
        Self {
            contract: contract.into(),
            address,
            args: Vec::new(),
            transaction_hash: None,
            fingerprint: None,
            deployed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The deployment time as RFC 3339, or the raw timestamp if out of range.
    pub fn deployed_at_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp(self.deployed_at, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| self.deployed_at.to_string())
    }
}

/// Registry errors callers may want to match on.
#[derive(Debug, Display, Error)]
pub enum RegistryError {
    /// A name was written twice in the same run.
    #[display("{name} was already recorded during this run")]
    AlreadyRecorded { name: String },
    /// The directory was created for another chain.
    #[display("registry at {} belongs to chain {expected}, connected chain is {actual}", path.display())]
    ChainMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// Directory persistence plus the lock guarding it.
#[derive(Debug)]
struct Storage {
    dir: PathBuf,
    _lock: File,
}

/// Mapping from step name to [`DeploymentRecord`].
#[derive(Debug, Default)]
pub struct Registry {
    records: BTreeMap<String, DeploymentRecord>,
    written: BTreeSet<String>,
    storage: Option<Storage>,
}

impl Registry {
    /// An empty registry that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) the registry directory for a network.
    ///
    /// When `chain_id` is given it is checked against the directory's `.chainId`
    /// file, which is written on first use.
    pub fn open(dir: impl Into<PathBuf>, chain_id: Option<u64>) -> Result<Self> {
        let dir = dir.into();
        FsHandler::create_dir(&dir)?;
        let lock = FsHandler::lock_exclusive(&dir.join(LOCK_FILENAME))?;

        if let Some(actual) = chain_id {
            Self::check_chain_id(&dir, actual)?;
        }

        let records = Self::read_records(&dir)?;

        tracing::debug!(
            path = %dir.display(),
            records = records.len(),
            "Registry loaded"
        );

        Ok(Self {
            records,
            written: BTreeSet::new(),
            storage: Some(Storage { dir, _lock: lock }),
        })
    }

    /// Read the records persisted under `dir` without taking the lock.
    ///
    /// Nothing is created on disk; a missing directory yields no records.
    pub fn snapshot(dir: &Path) -> Result<BTreeMap<String, DeploymentRecord>> {
        if !dir.exists() {
            return Ok(BTreeMap::new());
        }
        Self::read_records(dir)
    }

    fn read_records(dir: &Path) -> Result<BTreeMap<String, DeploymentRecord>> {
        let mut records = BTreeMap::new();
        for entry in std::fs::read_dir(dir)
            .context(format!("Failed to read registry directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let record = Self::load_record(&path)?;
            records.insert(name.to_string(), record);
        }
        Ok(records)
    }

    fn check_chain_id(dir: &Path, actual: u64) -> Result<()> {
        let path = dir.join(CHAIN_ID_FILENAME);
        if !path.exists() {
            std::fs::write(&path, actual.to_string())
                .context(format!("Failed to write {}", path.display()))?;
            return Ok(());
        }

        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read {}", path.display()))?;
        let expected: u64 = content
            .trim()
            .parse()
            .context(format!("Invalid chain id in {}", path.display()))?;

        if expected != actual {
            return Err(RegistryError::ChainMismatch {
                path: dir.to_path_buf(),
                expected,
                actual,
            }
            .into());
        }

        Ok(())
    }

    fn load_record(path: &Path) -> Result<DeploymentRecord> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read deployment record {}", path.display()))?;
        serde_json::from_str(&content)
            .context(format!("Failed to parse deployment record {}", path.display()))
    }

    /// The record for `name`, if one exists.
    pub fn get_or_null(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.get(name)
    }

    /// Store the record for `name`, persisting it when the registry is backed by a directory.
    pub fn record(&mut self, name: &str, record: DeploymentRecord) -> Result<()> {
        if self.written.contains(name) {
            return Err(RegistryError::AlreadyRecorded {
                name: name.to_string(),
            }
            .into());
        }

        if let Some(storage) = &self.storage {
            let path = storage.dir.join(format!("{name}.json"));
            let json = serde_json::to_string_pretty(&record)
                .context("Failed to serialize deployment record")?;
            std::fs::write(&path, json)
                .context(format!("Failed to write deployment record to {}", path.display()))?;
        }

        self.written.insert(name.to_string());
        self.records.insert(name.to_string(), record);
        Ok(())
    }

    /// Whether `name` was written by the current run.
    pub fn recorded_this_run(&self, name: &str) -> bool {
        self.written.contains(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeploymentRecord)> {
        self.records.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// Directory the registry persists to, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.storage.as_ref().map(|s| s.dir.as_path())
    }
}
