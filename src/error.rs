// Pipeline errors
//
// Error kinds surfaced by the publication pipeline. Per-target verifier
// failures are collected by the orchestrator rather than aborting the batch;
// everything else propagates to the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the deployment publication pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An expected on-disk artifact does not exist
    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// An on-disk artifact exists but does not have the expected shape
    #[error("artifact {} is malformed: {reason}", .path.display())]
    ArtifactMalformed { path: PathBuf, reason: String },

    /// A caller-selected contract is absent from the deployment record
    #[error("unknown contract {name}; deployed contracts are: {}", .known.join(", "))]
    UnknownContract { name: String, known: Vec<String> },

    /// No signing key is configured for the registry login exchange
    #[error("no signing key configured for registry authentication")]
    AuthConfigMissing,

    /// The SIWE nonce challenge could not be obtained
    #[error("failed to fetch sign-in nonce: {0}")]
    NonceFetchFailed(String),

    /// The SIWE login exchange was rejected
    #[error("registry login failed: {0}")]
    LoginFailed(String),

    /// A single verifier submission failed; collected per target, not fatal
    #[error("verifier invocation failed for {contract}: {reason}")]
    VerifierInvocationFailed { contract: String, reason: String },

    /// The authoritative registry create mutation was rejected
    #[error("publish failed: {message}")]
    PublishFailed {
        message: String,
        /// Raw error payload returned by the registry, kept for diagnosis
        payload: serde_json::Value,
    },

    /// Neither the DAO metadata file nor the deploy configuration exists
    #[error("neither DAO metadata nor deploy configuration file is present")]
    ConfigurationMissing,

    /// Transport-level failure talking to the registry
    #[error("registry transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
