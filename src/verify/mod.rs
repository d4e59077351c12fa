// Verification orchestrator
//
// Walks the contracts created by a deployment run and submits each one to
// the block-explorer verifier through `forge verify-contract`, spacing
// submissions by a fixed delay to respect the verifier's rate limit.
// Per-target failures are collected into a summary instead of aborting
// the remaining batch.

pub mod forge;

use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};

use crate::artifacts::{
    read_contract_artifact, reduce_to_latest_creations, CreatedContract, DeploymentRecord,
};
use crate::error::PipelineError;

/// Delay enforced before every verifier submission
pub const SUBMISSION_DELAY: Duration = Duration::from_secs(3);

/// The unit of work submitted to the external verifier
#[derive(Debug, Clone)]
pub struct VerificationTarget {
    pub contract_name: String,
    pub address: String,
    pub constructor_args: Vec<String>,
    pub constructor_param_types: Vec<String>,
    pub compiler_version: String,
    pub optimizer_runs: Option<u64>,
}

/// Outcome of one verification attempt
#[derive(Debug)]
pub struct VerificationOutcome {
    pub contract_name: String,
    /// Verifier status text on success, collected failure otherwise
    pub result: Result<String, PipelineError>,
}

/// Results of a verification batch
#[derive(Debug, Default)]
pub struct VerificationSummary {
    pub outcomes: Vec<VerificationOutcome>,
}

impl VerificationSummary {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Source-verification orchestrator for one deployment run
pub struct Verifier {
    pub chain_id: String,
    pub rpc_url: String,
    pub etherscan_api_key: String,
    pub out_dir: PathBuf,
    pub delay: Duration,
}

impl Verifier {
    /// Verify every selected contract of a deployment record
    ///
    /// An explicit selector must only name contracts present in the
    /// record's creation mapping; validation happens before any
    /// submission. Without a selector, all created contracts are
    /// targeted. Submissions run strictly sequentially with the
    /// configured delay awaited before each one.
    pub async fn verify_all(
        &self,
        record: &DeploymentRecord,
        selector: Option<&[String]>,
    ) -> Result<VerificationSummary, PipelineError> {
        let created = reduce_to_latest_creations(record);
        let targets: Vec<String> = match selector {
            Some(names) => {
                for name in names {
                    if !created.contains_key(name) {
                        return Err(PipelineError::UnknownContract {
                            name: name.clone(),
                            known: created.keys().cloned().collect(),
                        });
                    }
                }
                names.to_vec()
            }
            None => created.keys().cloned().collect(),
        };

        let mut summary = VerificationSummary::default();
        for name in targets {
            let contract = &created[&name];
            tokio::time::sleep(self.delay).await;
            info!("verifying {} at {}", name, contract.address);
            let result = self.verify_one(&name, contract).await;
            match &result {
                Ok(status) => info!("{}: {}", name, status),
                Err(e) => warn!("verification of {} failed: {}", name, e),
            }
            summary.outcomes.push(VerificationOutcome {
                contract_name: name,
                result,
            });
        }
        Ok(summary)
    }

    async fn verify_one(
        &self,
        name: &str,
        contract: &CreatedContract,
    ) -> Result<String, PipelineError> {
        let artifact = read_contract_artifact(&self.out_dir, name)?;
        let target = VerificationTarget {
            contract_name: name.to_string(),
            address: contract.address.clone(),
            constructor_args: contract.constructor_args.clone(),
            constructor_param_types: artifact.constructor_param_types,
            compiler_version: artifact.compiler_version,
            optimizer_runs: artifact.optimizer_runs,
        };
        let encoded = if target.constructor_param_types.is_empty() {
            None
        } else {
            Some(
                forge::run_cast_abi_encode(
                    name,
                    &target.constructor_param_types,
                    &target.constructor_args,
                )
                .await?,
            )
        };
        let args = forge::forge_verify_args(
            &target,
            &self.chain_id,
            &self.rpc_url,
            &self.etherscan_api_key,
            encoded.as_deref(),
        );
        forge::run_forge_verify(name, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verifier() -> Verifier {
        Verifier {
            chain_id: "11155111".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            etherscan_api_key: "KEY".to_string(),
            out_dir: PathBuf::from("out"),
            delay: Duration::from_millis(0),
        }
    }

    fn record(value: serde_json::Value) -> DeploymentRecord {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn empty_record_does_no_work() {
        let record = record(json!({"transactions": []}));
        let summary = verifier().verify_all(&record, None).await.unwrap();
        assert!(summary.outcomes.is_empty());
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn unknown_selector_fails_before_any_submission() {
        let record = record(json!({
            "transactions": [{
                "contractName": "UngovernableGovernor",
                "transactionType": "CREATE",
                "contractAddress": "0xG000000000000000000000000000000000000002",
                "arguments": [],
                "blockNumber": 100
            }]
        }));
        let selector = vec!["NoSuchContract".to_string()];
        let err = verifier()
            .verify_all(&record, Some(&selector))
            .await
            .unwrap_err();
        match err {
            PipelineError::UnknownContract { name, known } => {
                assert_eq!(name, "NoSuchContract");
                assert_eq!(known, vec!["UngovernableGovernor"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn missing_artifact_is_collected_not_fatal() {
        let record = record(json!({
            "transactions": [{
                "contractName": "UngovernableGovernor",
                "transactionType": "CREATE",
                "contractAddress": "0xG000000000000000000000000000000000000002",
                "arguments": [],
                "blockNumber": 100
            }]
        }));
        let dir = tempfile::tempdir().unwrap();
        let mut verifier = verifier();
        verifier.out_dir = dir.path().to_path_buf();
        let summary = verifier.verify_all(&record, None).await.unwrap();
        assert_eq!(summary.outcomes.len(), 1);
        assert_eq!(summary.failed_count(), 1);
        assert!(matches!(
            summary.outcomes[0].result,
            Err(PipelineError::ArtifactNotFound(_))
        ));
    }
}
