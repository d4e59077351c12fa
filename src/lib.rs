// dao-publish
//
// Post-deployment publication pipeline for an on-chain governance
// deployment: reads the deployment record left by the deploy script,
// verifies each contract's source on a public block explorer, and
// idempotently registers the governance instance with an external
// governance registry.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod registry;
pub mod verify;

pub use error::PipelineError;
