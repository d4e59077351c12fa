// Deployment artifact readers
//
// Pure readers over the JSON files a deployment run leaves on disk: the
// broadcast record written by the deploy script and the compiled-artifact
// metadata produced by the build toolchain. Both are read-only inputs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::PipelineError;

/// Kind of transaction recorded in a deployment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Create,
    Call,
    /// Any transaction type this pipeline does not act on
    #[serde(other)]
    Other,
}

/// One transaction entry from the deployment record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedTransaction {
    pub contract_name: Option<String>,
    pub transaction_type: TransactionKind,
    pub contract_address: Option<String>,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// The append-only log of on-chain operations performed by a deployment run
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentRecord {
    pub transactions: Vec<RecordedTransaction>,
}

/// A deployed contract instance, reduced from the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedContract {
    pub address: String,
    pub constructor_args: Vec<String>,
    pub block_number: Option<u64>,
}

/// Compiled-artifact metadata for one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub compiler_version: String,
    pub optimizer_runs: Option<u64>,
    pub constructor_param_types: Vec<String>,
}

/// Conventional location of a deployment record for a script run
///
/// A block number selects that run's `run-<blockNumber>.json` file;
/// without one the `run-latest.json` record is used.
pub fn record_path(
    broadcast_dir: &Path,
    script: &str,
    chain_id: &str,
    block: Option<u64>,
) -> PathBuf {
    let filename = match block {
        Some(block) => format!("run-{}.json", block),
        None => "run-latest.json".to_string(),
    };
    broadcast_dir.join(script).join(chain_id).join(filename)
}

/// Read and parse a deployment record from disk
pub fn read_deployment_record<P: AsRef<Path>>(
    path: P,
) -> Result<DeploymentRecord, PipelineError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::ArtifactNotFound(path.to_path_buf()));
    }
    let raw = fs::read_to_string(path).map_err(|e| PipelineError::ArtifactMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| PipelineError::ArtifactMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read compiled-artifact metadata for a named contract
///
/// The artifact lives at `<out_dir>/<Name>.sol/<Name>.json`. A contract
/// without a constructor entry in its ABI has an empty parameter list.
pub fn read_contract_artifact(
    out_dir: &Path,
    contract_name: &str,
) -> Result<ContractArtifact, PipelineError> {
    let path = out_dir
        .join(format!("{}.sol", contract_name))
        .join(format!("{}.json", contract_name));
    if !path.exists() {
        return Err(PipelineError::ArtifactNotFound(path));
    }
    let raw = fs::read_to_string(&path).map_err(|e| PipelineError::ArtifactMalformed {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| PipelineError::ArtifactMalformed {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let compiler_version = value
        .pointer("/metadata/compiler/version")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::ArtifactMalformed {
            path: path.clone(),
            reason: "missing metadata.compiler.version".to_string(),
        })?
        .to_string();

    let optimizer_runs = value
        .pointer("/metadata/settings/optimizer/runs")
        .and_then(Value::as_u64);

    let abi = value
        .get("abi")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::ArtifactMalformed {
            path: path.clone(),
            reason: "missing abi array".to_string(),
        })?;
    let constructor_param_types = abi
        .iter()
        .find(|entry| entry.get("type").and_then(Value::as_str) == Some("constructor"))
        .and_then(|ctor| ctor.get("inputs").and_then(Value::as_array))
        .map(|inputs| {
            inputs
                .iter()
                .filter_map(|input| input.get("type").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ContractArtifact {
        compiler_version,
        optimizer_runs,
        constructor_param_types,
    })
}

/// Reduce a deployment record to its latest created contracts
///
/// Iterates in record order; a later CREATE for the same contract name
/// overwrites an earlier one. Re-deployments within a single record are
/// legal, and the mapping must reflect the most recent instance.
pub fn reduce_to_latest_creations(
    record: &DeploymentRecord,
) -> BTreeMap<String, CreatedContract> {
    let mut created = BTreeMap::new();
    for tx in &record.transactions {
        if tx.transaction_type != TransactionKind::Create {
            continue;
        }
        if let (Some(name), Some(address)) = (&tx.contract_name, &tx.contract_address) {
            created.insert(
                name.clone(),
                CreatedContract {
                    address: address.clone(),
                    constructor_args: tx.arguments.clone().unwrap_or_default(),
                    block_number: tx.block_number,
                },
            );
        }
    }
    created
}
