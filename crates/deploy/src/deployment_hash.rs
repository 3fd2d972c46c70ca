use serde::Serialize;
use sha2::{Digest, Sha256};

/// The inputs that make two deployments of a step identical.
///
/// If none of these change between runs, the contract already on chain is
/// exactly what a new deployment would produce and can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentFingerprint {
    /// Artifact name of the contract.
    pub contract: String,
    /// Hex-encoded creation code, without constructor arguments.
    pub bytecode: String,
    /// Hex-encoded ABI-encoded constructor arguments.
    pub constructor_args: String,
}

impl DeploymentFingerprint {
    pub fn new(contract: &str, bytecode: &[u8], encoded_args: &[u8]) -> Self {
        Self {
            contract: contract.to_string(),
            bytecode: hex::encode(bytecode),
            constructor_args: hex::encode(encoded_args),
        }
    }

    /// Compute a SHA-256 hash of this fingerprint.
    ///
    /// The fields are serialized to JSON in declaration order before hashing,
    /// so the same inputs always produce the same hash.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        // Serializing plain strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        hasher.update(&json);
        hex::encode(hasher.finalize())
    }
}
