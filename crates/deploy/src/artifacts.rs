//! Compiled contract artifacts.
//!
//! Both Hardhat (`"bytecode": "0x.."`) and Foundry
//! (`"bytecode": { "object": "0x.." }`) artifact layouts are understood.

use std::path::{Path, PathBuf};

use alloy_core::dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_core::json_abi::{JsonAbi, Param};
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::step::ResolvedArg;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl RawBytecode {
    fn as_hex(&self) -> &str {
        match self {
            Self::Hex(hex) => hex,
            Self::Object { object } => object,
        }
    }
}

#[derive(Deserialize)]
struct RawArtifact {
    abi: JsonAbi,
    bytecode: RawBytecode,
}

/// ABI and creation code of one contract.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract: String,
    pub abi: JsonAbi,
    pub bytecode: Vec<u8>,
    /// File the artifact was read from.
    pub path: PathBuf,
}

impl Artifact {
    /// Find `<contract>.json` anywhere under `artifacts_dir` and load it.
    pub fn find(artifacts_dir: &Path, contract: &str) -> Result<Self> {
        let file_name = format!("{contract}.json");
        let mut matches = Vec::new();
        collect_matches(artifacts_dir, &file_name, &mut matches)?;
        matches.sort();

        match matches.as_slice() {
            [] => anyhow::bail!(
                "No artifact named {} found under {}. Compile the contracts first.",
                file_name,
                artifacts_dir.display()
            ),
            [path] => Self::load(path, contract),
            paths => anyhow::bail!(
                "Ambiguous artifact for {}: {}",
                contract,
                paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Load an artifact file.
    pub fn load(path: &Path, contract: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read artifact {}", path.display()))?;
        let raw: RawArtifact = serde_json::from_str(&content)
            .context(format!("Failed to parse artifact {}", path.display()))?;

        let hex = raw.bytecode.as_hex();
        let bytecode = hex::decode(hex.trim_start_matches("0x")).context(format!(
            "Invalid bytecode in {} (unlinked libraries are not supported)",
            path.display()
        ))?;

        if bytecode.is_empty() {
            anyhow::bail!(
                "{} has no creation code; abstract contracts and interfaces cannot be deployed",
                contract
            );
        }

        Ok(Self {
            contract: contract.to_string(),
            abi: raw.abi,
            bytecode,
            path: path.to_path_buf(),
        })
    }

    fn constructor_inputs(&self) -> &[Param] {
        self.abi
            .constructor()
            .map(|c| c.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// ABI-encode `args` against the constructor's inputs.
    pub fn encode_constructor_args(&self, args: &[ResolvedArg]) -> Result<Vec<u8>> {
        let inputs = self.constructor_inputs();
        if inputs.len() != args.len() {
            anyhow::bail!(
                "{} constructor takes {} arguments, {} given",
                self.contract,
                inputs.len(),
                args.len()
            );
        }

        let values = inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| -> Result<DynSolValue> {
                let ty: DynSolType = param
                    .resolve()
                    .with_context(|| format!("Unsupported constructor parameter type {}", param.ty))?;
                match (arg, &ty) {
                    (ResolvedArg::Address(address), DynSolType::Address) => {
                        Ok(DynSolValue::Address(*address))
                    }
                    (ResolvedArg::Literal(value), DynSolType::String) => {
                        Ok(DynSolValue::String(value.clone()))
                    }
                    (ResolvedArg::Literal(value), DynSolType::Bytes) => {
                        hex::decode(value.strip_prefix("0x").unwrap_or(value))
                            .map(DynSolValue::Bytes)
                            .with_context(|| {
                                format!(
                                    "Parameter {} of {} expects hex bytes, got {:?}",
                                    param.name, self.contract, value
                                )
                            })
                    }
                    (arg, ty) => ty.coerce_str(&arg.to_string()).with_context(|| {
                        format!(
                            "Cannot use {:?} as {} for parameter {} of {}",
                            arg.to_string(),
                            ty.sol_type_name(),
                            param.name,
                            self.contract
                        )
                    }),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if values.is_empty() {
            return Ok(Vec::new());
        }

        Ok(DynSolValue::Tuple(values).abi_encode_params())
    }

    /// Creation code followed by already encoded constructor arguments.
    pub fn creation_code(&self, encoded_args: &[u8]) -> Vec<u8> {
        let mut code = self.bytecode.clone();
        code.extend_from_slice(encoded_args);
        code
    }
}

fn collect_matches(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .context(format!("Failed to read artifacts directory {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            // Hardhat compiler inputs
            if path.file_name().is_some_and(|n| n == "build-info") {
                continue;
            }
            collect_matches(&path, file_name, out)?;
        } else if path.file_name().is_some_and(|n| n == file_name) {
            out.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::Address;
    use tempdir::TempDir;

    use super::*;

    const FACTORY_ABI: &str = r#"[
        {
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                { "name": "daoImpl", "type": "address", "internalType": "address" },
                { "name": "bpImpl", "type": "address", "internalType": "address" },
                { "name": "erc721", "type": "address", "internalType": "address" }
            ]
        }
    ]"#;

    const NFT_ABI: &str = r#"[
        {
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                { "name": "name", "type": "string", "internalType": "string" },
                { "name": "symbol", "type": "string", "internalType": "string" },
                { "name": "baseUri", "type": "string", "internalType": "string" },
                { "name": "hiddenUri", "type": "string", "internalType": "string" }
            ]
        }
    ]"#;

    fn write_artifact(dir: &Path, rel: &str, contract: &str, abi: &str, bytecode: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(
            path.join(format!("{contract}.json")),
            format!(r#"{{ "contractName": "{contract}", "abi": {abi}, "bytecode": {bytecode} }}"#),
        )
        .unwrap();
    }

    #[test]
    fn test_find_hardhat_artifact() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(
            temp_dir.path(),
            "contracts/ProposalFactory.sol",
            "ProposalFactory",
            FACTORY_ABI,
            r#""0x6080604052""#,
        );

        let artifact = Artifact::find(temp_dir.path(), "ProposalFactory").unwrap();
        assert_eq!(artifact.bytecode, vec![0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(artifact.constructor_inputs().len(), 3);
    }

    #[test]
    fn test_find_foundry_artifact() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(
            temp_dir.path(),
            "DAOImplementation.sol",
            "DAOImplementation",
            "[]",
            r#"{ "object": "0x6080" }"#,
        );

        let artifact = Artifact::find(temp_dir.path(), "DAOImplementation").unwrap();
        assert_eq!(artifact.bytecode, vec![0x60, 0x80]);
        assert!(artifact.encode_constructor_args(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_find_skips_build_info_and_reports_missing() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "build-info", "Ghost", "[]", r#""0x60""#);

        let err = Artifact::find(temp_dir.path(), "Ghost").unwrap_err();
        assert!(err.to_string().contains("No artifact named Ghost.json"));
    }

    #[test]
    fn test_find_rejects_ambiguous_names() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "a/Token.sol", "Token", "[]", r#""0x60""#);
        write_artifact(temp_dir.path(), "b/Token.sol", "Token", "[]", r#""0x60""#);

        let err = Artifact::find(temp_dir.path(), "Token").unwrap_err();
        assert!(err.to_string().contains("Ambiguous artifact"));
    }

    #[test]
    fn test_empty_bytecode_is_rejected() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "", "IProposal", "[]", r#""0x""#);

        assert!(Artifact::find(temp_dir.path(), "IProposal").is_err());
    }

    #[test]
    fn test_encode_addresses() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "", "ProposalFactory", FACTORY_ABI, r#""0x60""#);
        let artifact = Artifact::find(temp_dir.path(), "ProposalFactory").unwrap();

        let dao = Address::with_last_byte(1);
        let bp = Address::with_last_byte(2);
        let encoded = artifact
            .encode_constructor_args(&[
                ResolvedArg::Address(dao),
                ResolvedArg::Address(bp),
                ResolvedArg::Literal("0x905181635f2FEB3c62f6eF216106eF06c01b449E".into()),
            ])
            .unwrap();

        assert_eq!(encoded.len(), 96);
        assert_eq!(encoded[31], 1);
        assert_eq!(encoded[63], 2);
        assert_eq!(&encoded[76..96], &hex::decode("905181635f2feb3c62f6ef216106ef06c01b449e").unwrap()[..]);

        let creation = artifact.creation_code(&encoded);
        assert_eq!(creation.len(), 97);
        assert_eq!(creation[0], 0x60);
        assert_eq!(&creation[1..], &encoded[..]);
    }

    #[test]
    fn test_encode_strings_keeps_literals_exact() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "", "TheSatwasBandDev", NFT_ABI, r#""0x60""#);
        let artifact = Artifact::find(temp_dir.path(), "TheSatwasBandDev").unwrap();

        let literals = [
            "The Satwas Band Dev",
            "  padded  ",
            "\"quoted\"",
            "",
        ];
        let args: Vec<_> = literals
            .iter()
            .map(|s| ResolvedArg::Literal(s.to_string()))
            .collect();
        let encoded = artifact.encode_constructor_args(&args).unwrap();

        let decoded = DynSolType::Tuple(vec![DynSolType::String; 4])
            .abi_decode_params(&encoded)
            .unwrap();
        let DynSolValue::Tuple(values) = decoded else {
            panic!("expected a tuple");
        };
        let strings: Vec<_> = values.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(strings, literals);
    }

    #[test]
    fn test_encode_bytes_from_hex() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        let abi = r#"[{ "type": "constructor", "stateMutability": "nonpayable",
            "inputs": [{ "name": "data", "type": "bytes", "internalType": "bytes" }] }]"#;
        write_artifact(temp_dir.path(), "", "Blob", abi, r#""0x60""#);
        let artifact = Artifact::find(temp_dir.path(), "Blob").unwrap();

        let encoded = artifact
            .encode_constructor_args(&[ResolvedArg::Literal("0xdeadbeef".into())])
            .unwrap();
        let decoded = DynSolType::Tuple(vec![DynSolType::Bytes])
            .abi_decode_params(&encoded)
            .unwrap();
        assert_eq!(
            decoded,
            DynSolValue::Tuple(vec![DynSolValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])])
        );

        assert!(
            artifact
                .encode_constructor_args(&[ResolvedArg::Literal("not hex".into())])
                .is_err()
        );
    }

    #[test]
    fn test_encode_rejects_arity_mismatch() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "", "ProposalFactory", FACTORY_ABI, r#""0x60""#);
        let artifact = Artifact::find(temp_dir.path(), "ProposalFactory").unwrap();

        let err = artifact
            .encode_constructor_args(&[ResolvedArg::Address(Address::ZERO)])
            .unwrap_err();
        assert!(err.to_string().contains("takes 3 arguments, 1 given"));
    }

    #[test]
    fn test_encode_rejects_bad_literal() {
        let temp_dir = TempDir::new("chainsteps-test").expect("Failed to create temp dir");
        write_artifact(temp_dir.path(), "", "ProposalFactory", FACTORY_ABI, r#""0x60""#);
        let artifact = Artifact::find(temp_dir.path(), "ProposalFactory").unwrap();

        let result = artifact.encode_constructor_args(&[
            ResolvedArg::Literal("not-an-address".into()),
            ResolvedArg::Address(Address::ZERO),
            ResolvedArg::Address(Address::ZERO),
        ]);
        assert!(result.is_err());
    }
}
