// Runtime configuration
//
// Settings consumed by the pipeline binary, plus the resolver for DAO
// descriptive metadata. The metadata may come from either of two files;
// a dedicated DAO metadata file always wins over the deploy configuration.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::error::PipelineError;
use crate::registry::DEFAULT_ENDPOINT;

/// Default contract names produced by the deploy script
pub const DEFAULT_GOVERNOR_CONTRACT: &str = "UngovernableGovernor";
pub const DEFAULT_TOKEN_CONTRACT: &str = "UngovernableERC20";

/// DAO name used when neither the governor nor the token carries one
pub const DEFAULT_DAO_NAME: &str = "Unnamed DAO";

/// Settings for one pipeline run
///
/// Populated from the environment by the binary; core modules only ever
/// see explicit values.
#[derive(Debug, Clone)]
pub struct Settings {
    pub chain_id: String,
    pub rpc_url: String,
    pub etherscan_api_key: String,
    pub registry_api_key: String,
    pub registry_endpoint: String,
    /// Hex-encoded private key for the SIWE exchange, when configured
    pub signing_key: Option<String>,
    /// Pre-supplied registry bearer token; skips the SIWE exchange entirely
    pub registry_token: Option<String>,
    pub broadcast_dir: PathBuf,
    pub out_dir: PathBuf,
    pub deploy_script: String,
    pub dao_metadata_path: PathBuf,
    pub deploy_config_path: PathBuf,
    pub governor_contract: String,
    pub token_contract: String,
}

impl Settings {
    /// Read settings from the environment
    ///
    /// This is the single env reader in the crate; only the binary calls
    /// it. Required variables that are absent surface as descriptive
    /// errors, path-like variables fall back to their conventions.
    pub fn from_env() -> anyhow::Result<Self> {
        let required = |key: &str| {
            env::var(key).with_context(|| format!("{} environment variable not set", key))
        };
        let path_or = |key: &str, default: &str| {
            env::var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };
        Ok(Settings {
            chain_id: required("CHAIN_ID")?,
            rpc_url: required("RPC_URL")?,
            etherscan_api_key: env::var("ETHERSCAN_API_KEY").unwrap_or_default(),
            registry_api_key: required("TALLY_API_KEY")?,
            registry_endpoint: env::var("TALLY_API_URL")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            signing_key: env::var("PRIVATE_KEY").ok(),
            registry_token: env::var("TALLY_API_TOKEN").ok(),
            broadcast_dir: path_or("BROADCAST_DIR", "broadcast"),
            out_dir: path_or("OUT_DIR", "out"),
            deploy_script: env::var("DEPLOY_SCRIPT")
                .unwrap_or_else(|_| "Deploy.s.sol".to_string()),
            dao_metadata_path: path_or("DAO_METADATA_PATH", "dao-metadata.json"),
            deploy_config_path: path_or("DEPLOY_CONFIG_PATH", "deploy-config.json"),
            governor_contract: env::var("GOVERNOR_CONTRACT")
                .unwrap_or_else(|_| DEFAULT_GOVERNOR_CONTRACT.to_string()),
            token_contract: env::var("TOKEN_CONTRACT")
                .unwrap_or_else(|_| DEFAULT_TOKEN_CONTRACT.to_string()),
        })
    }
}

/// Resolved DAO descriptive metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoConfig {
    pub name: String,
    pub description: String,
}

/// Which file the DAO metadata was resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaoConfigSource {
    MetadataFile,
    DeployConfig,
}

/// Dedicated DAO metadata file shape
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DaoMetadataFile {
    dao_name: String,
    description: String,
}

/// Deploy configuration file shape; only the naming fields matter here
#[derive(Debug, Default, Deserialize)]
struct DeployConfigFile {
    #[serde(default)]
    governor: ContractParams,
    #[serde(default)]
    token: ContractParams,
}

#[derive(Debug, Default, Deserialize)]
struct ContractParams {
    #[serde(rename = "_name")]
    name: Option<String>,
    #[serde(rename = "_symbol")]
    symbol: Option<String>,
}

/// Resolve DAO metadata with defined precedence
///
/// The dedicated metadata file wins when present. Otherwise the deploy
/// configuration is used: the governor's configured name, else
/// `"<token name> DAO"`, else a fixed default; the description is a
/// templated string over the token name and symbol. When neither file
/// exists the resolution fails rather than inventing metadata.
pub fn resolve_dao_config(
    metadata_path: &Path,
    deploy_config_path: &Path,
) -> Result<(DaoConfig, DaoConfigSource), PipelineError> {
    if metadata_path.exists() {
        let metadata: DaoMetadataFile = read_json(metadata_path)?;
        return Ok((
            DaoConfig {
                name: metadata.dao_name,
                description: metadata.description,
            },
            DaoConfigSource::MetadataFile,
        ));
    }

    if deploy_config_path.exists() {
        let deploy: DeployConfigFile = read_json(deploy_config_path)?;
        let name = deploy
            .governor
            .name
            .clone()
            .or_else(|| deploy.token.name.as_ref().map(|n| format!("{} DAO", n)))
            .unwrap_or_else(|| DEFAULT_DAO_NAME.to_string());
        let description =
            templated_description(deploy.token.name.as_deref(), deploy.token.symbol.as_deref());
        return Ok((DaoConfig { name, description }, DaoConfigSource::DeployConfig));
    }

    Err(PipelineError::ConfigurationMissing)
}

fn templated_description(token_name: Option<&str>, token_symbol: Option<&str>) -> String {
    match (token_name, token_symbol) {
        (Some(name), Some(symbol)) => {
            format!("On-chain governance for the {} token ({})", name, symbol)
        }
        (Some(name), None) => format!("On-chain governance for the {} token", name),
        _ => "On-chain governance".to_string(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PipelineError> {
    let raw = fs::read_to_string(path).map_err(|e| PipelineError::ArtifactMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| PipelineError::ArtifactMalformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, value: serde_json::Value) {
        fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    #[test]
    fn metadata_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_path = dir.path().join("dao-metadata.json");
        let deploy_path = dir.path().join("deploy-config.json");
        write(
            &metadata_path,
            json!({"daoName": "Handcrafted DAO", "description": "Curated description"}),
        );
        write(&deploy_path, json!({"token": {"_name": "Foo", "_symbol": "FOO"}}));

        let (config, source) = resolve_dao_config(&metadata_path, &deploy_path).unwrap();
        assert_eq!(source, DaoConfigSource::MetadataFile);
        assert_eq!(config.name, "Handcrafted DAO");
        assert_eq!(config.description, "Curated description");
    }

    #[test]
    fn deploy_config_falls_back_to_token_name() {
        let dir = tempfile::tempdir().unwrap();
        let metadata_path = dir.path().join("dao-metadata.json");
        let deploy_path = dir.path().join("deploy-config.json");
        write(
            &deploy_path,
            json!({"governor": {}, "token": {"_name": "Foo", "_symbol": "FOO"}}),
        );

        let (config, source) = resolve_dao_config(&metadata_path, &deploy_path).unwrap();
        assert_eq!(source, DaoConfigSource::DeployConfig);
        assert_eq!(config.name, "Foo DAO");
        assert_eq!(
            config.description,
            "On-chain governance for the Foo token (FOO)"
        );
    }

    #[test]
    fn governor_name_wins_over_token_name() {
        let dir = tempfile::tempdir().unwrap();
        let deploy_path = dir.path().join("deploy-config.json");
        write(
            &deploy_path,
            json!({"governor": {"_name": "Foo Governor"}, "token": {"_name": "Foo"}}),
        );

        let (config, _) =
            resolve_dao_config(&dir.path().join("absent.json"), &deploy_path).unwrap();
        assert_eq!(config.name, "Foo Governor");
        assert_eq!(config.description, "On-chain governance for the Foo token");
    }

    #[test]
    fn empty_deploy_config_uses_fixed_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let deploy_path = dir.path().join("deploy-config.json");
        write(&deploy_path, json!({}));

        let (config, _) =
            resolve_dao_config(&dir.path().join("absent.json"), &deploy_path).unwrap();
        assert_eq!(config.name, DEFAULT_DAO_NAME);
        assert_eq!(config.description, "On-chain governance");
    }

    // The only test that touches process environment; nothing else reads it
    #[test]
    fn settings_come_from_env_with_conventional_defaults() {
        env::set_var("CHAIN_ID", "11155111");
        env::set_var("RPC_URL", "http://localhost:8545");
        env::set_var("TALLY_API_KEY", "registry-key");
        env::remove_var("PRIVATE_KEY");
        env::remove_var("TALLY_API_TOKEN");
        env::remove_var("TALLY_API_URL");
        env::remove_var("BROADCAST_DIR");
        env::remove_var("GOVERNOR_CONTRACT");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.chain_id, "11155111");
        assert_eq!(settings.rpc_url, "http://localhost:8545");
        assert_eq!(settings.registry_api_key, "registry-key");
        assert_eq!(settings.registry_endpoint, DEFAULT_ENDPOINT);
        assert!(settings.signing_key.is_none());
        assert!(settings.registry_token.is_none());
        assert_eq!(settings.broadcast_dir, PathBuf::from("broadcast"));
        assert_eq!(settings.deploy_script, "Deploy.s.sol");
        assert_eq!(settings.governor_contract, DEFAULT_GOVERNOR_CONTRACT);
        assert_eq!(settings.token_contract, DEFAULT_TOKEN_CONTRACT);
    }

    #[test]
    fn missing_both_files_is_configuration_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_dao_config(
            &dir.path().join("absent-metadata.json"),
            &dir.path().join("absent-deploy.json"),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ConfigurationMissing));
    }
}
