// Idempotent publish workflow
//
// Registers a deployed governance instance with the registry without
// creating duplicates. The registry offers no reliable read-side existence
// query, so existence is probed with a minimal create mutation whose
// error text is classified. On the absent path the probe's own create can
// go through, leaving a placeholder registration behind; the authoritative
// create then tolerates the resulting already-exists error.

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::artifacts::{reduce_to_latest_creations, CreatedContract, DeploymentRecord};
use crate::config::DaoConfig;
use crate::error::PipelineError;

use super::auth::AuthClient;
use super::{RegistryClient, RegistryResponse};

/// Governor type tag expected by the registry
pub const GOVERNOR_TYPE: &str = "openzeppelingovernor";

/// Start block used when the deployment record carries none
pub const FALLBACK_START_BLOCK: u64 = 0;

/// Placeholder name and description carried by the existence probe
const PROBE_PLACEHOLDER: &str = "tmp";

/// Error-text fragment that signals an already-registered governor
const ALREADY_EXISTS_FRAGMENT: &str = "governor already exists";

const CREATE_DAO_MUTATION: &str = r#"
mutation CreateDao($name: String!, $description: String!, $governors: [CreateGovernorInput!]!) {
  createDao(input: { name: $name, description: $description, governors: $governors }) {
    id
    name
  }
}
"#;

const GOVERNOR_QUERY: &str = r#"
query Governor($input: GovernorInput!) {
  governor(input: $input) {
    id
    organization {
      id
      name
    }
  }
}
"#;

const ORGANIZATIONS_QUERY: &str = r#"
query Organizations($input: OrganizationsInput!) {
  organizations(input: $input) {
    nodes {
      id
      name
    }
  }
}
"#;

/// Chain-scoped namespace prefix for registry identifiers
pub fn namespace(chain_id: &str) -> String {
    format!("eip155:{}", chain_id)
}

/// Composite governor identifier the registry matches on
pub fn governor_id(chain_id: &str, address: &str) -> String {
    format!("{}:{}", namespace(chain_id), address)
}

/// Composite token identifier the registry matches on
pub fn token_id(chain_id: &str, address: &str) -> String {
    format!("{}/erc20:{}", namespace(chain_id), address)
}

/// What the existence probe established about the governor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceState {
    /// Probe errors neither confirmed nor denied the registration; the
    /// create path resolves this, since it tolerates the exists race
    Unknown,
    ConfirmedExists,
    ConfirmedAbsent,
}

/// Human-readable detail fetched for an existing registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaoDetail {
    pub id: String,
    pub name: String,
}

/// Result of the publish workflow
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub existing: bool,
    pub governor_id: String,
    pub dao_id: Option<String>,
    pub dao_name: Option<String>,
}

/// True when a serialized registry error payload signals that the
/// governor is already registered
pub fn is_already_registered(errors_text: &str) -> bool {
    errors_text.contains(ALREADY_EXISTS_FRAGMENT)
}

/// Classify an existence-probe response
///
/// A clean response means the minimal create went through, which both
/// confirms absence and leaves a placeholder registration behind. Errors
/// carrying the exists fragment confirm presence; any other error leaves
/// the question open.
pub fn classify_probe(response: &RegistryResponse) -> ExistenceState {
    if !response.has_errors() {
        return ExistenceState::ConfirmedAbsent;
    }
    if is_already_registered(&response.errors_text()) {
        ExistenceState::ConfirmedExists
    } else {
        ExistenceState::Unknown
    }
}

/// Variables for the minimal existence-probe mutation
pub fn probe_variables(governor_id: &str) -> Value {
    json!({
        "name": PROBE_PLACEHOLDER,
        "description": PROBE_PLACEHOLDER,
        "governors": [{ "id": governor_id }],
    })
}

/// Variables for the authoritative create mutation
pub fn create_variables(
    governor_id: &str,
    governor_start_block: u64,
    token_id: &str,
    token_start_block: u64,
    dao: &DaoConfig,
) -> Value {
    json!({
        "name": dao.name,
        "description": dao.description,
        "governors": [{
            "id": governor_id,
            "type": GOVERNOR_TYPE,
            "startBlock": governor_start_block,
            "token": {
                "id": token_id,
                "startBlock": token_start_block,
            },
        }],
    })
}

/// Publish workflow over an authenticated registry client
pub struct Publisher<'a> {
    registry: &'a RegistryClient,
    auth: &'a mut AuthClient,
}

impl<'a> Publisher<'a> {
    pub fn new(registry: &'a RegistryClient, auth: &'a mut AuthClient) -> Self {
        Self { registry, auth }
    }

    /// Register the governance instance, or report the existing one
    ///
    /// Never mutates an existing registration. An "already exists" error
    /// from the authoritative create is treated as a lost race against a
    /// concurrent publisher, not as a failure.
    pub async fn publish(
        &mut self,
        record: &DeploymentRecord,
        chain_id: &str,
        governor_contract: &str,
        token_contract: &str,
        dao: &DaoConfig,
    ) -> Result<PublishOutcome, PipelineError> {
        let created = reduce_to_latest_creations(record);
        let governor = locate(&created, governor_contract)?;
        let token = locate(&created, token_contract)?;

        let gid = governor_id(chain_id, &governor.address);
        let tid = token_id(chain_id, &token.address);
        let governor_block = start_block(governor, governor_contract);
        let token_block = start_block(token, token_contract);

        let bearer = self.auth.authenticate(self.registry).await?;

        let state = self.probe(&gid, &bearer).await?;
        if state == ExistenceState::ConfirmedExists {
            info!("governor {} is already registered", gid);
            return Ok(self.existing_outcome(&gid, &governor.address, &bearer).await);
        }

        let variables = create_variables(&gid, governor_block, &tid, token_block, dao);
        let response = self
            .registry
            .execute(CREATE_DAO_MUTATION, variables, Some(&bearer), None)
            .await?;
        if response.has_errors() {
            let text = response.errors_text();
            if is_already_registered(&text) {
                // Lost the race since the probe; same as the existing path
                info!("governor {} was registered concurrently", gid);
                return Ok(self.existing_outcome(&gid, &governor.address, &bearer).await);
            }
            return Err(PipelineError::PublishFailed {
                message: format!("registry rejected DAO creation for {}", gid),
                payload: Value::Array(response.errors.unwrap_or_default()),
            });
        }

        let created_dao = response
            .data
            .as_ref()
            .and_then(|d| d.get("createDao"))
            .cloned()
            .unwrap_or(Value::Null);
        let dao_id = created_dao
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let dao_name = created_dao
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string);
        info!(
            "registered {} as {}",
            gid,
            dao_name.as_deref().unwrap_or(&dao.name)
        );
        Ok(PublishOutcome {
            existing: false,
            governor_id: gid,
            dao_id,
            dao_name,
        })
    }

    /// Run the existence probe for a governor identifier
    pub async fn probe(
        &mut self,
        governor_id: &str,
        bearer: &str,
    ) -> Result<ExistenceState, PipelineError> {
        let response = self
            .registry
            .execute(CREATE_DAO_MUTATION, probe_variables(governor_id), Some(bearer), None)
            .await?;
        let state = classify_probe(&response);
        match state {
            ExistenceState::ConfirmedAbsent => {
                // The probe's own create went through
                warn!(
                    "existence probe left a placeholder registration for {}",
                    governor_id
                );
            }
            ExistenceState::Unknown => {
                debug!(
                    "existence probe for {} returned unrelated errors: {}",
                    governor_id,
                    response.errors_text()
                );
            }
            ExistenceState::ConfirmedExists => {}
        }
        Ok(state)
    }

    /// Authenticate and probe, for the standalone existence check
    pub async fn check(
        &mut self,
        governor_id: &str,
    ) -> Result<ExistenceState, PipelineError> {
        let bearer = self.auth.authenticate(self.registry).await?;
        self.probe(governor_id, &bearer).await
    }

    async fn existing_outcome(
        &self,
        governor_id: &str,
        governor_address: &str,
        bearer: &str,
    ) -> PublishOutcome {
        let detail = self.lookup_detail(governor_id, governor_address, bearer).await;
        PublishOutcome {
            existing: true,
            governor_id: governor_id.to_string(),
            dao_id: detail.as_ref().map(|d| d.id.clone()),
            dao_name: detail.map(|d| d.name),
        }
    }

    /// Best-effort detail lookup for an existing registration
    ///
    /// Tries the direct governor lookup first, then the organization
    /// search by address. A failure of one probe only moves on to the
    /// next; yielding no detail is not an error.
    async fn lookup_detail(
        &self,
        governor_id: &str,
        governor_address: &str,
        bearer: &str,
    ) -> Option<DaoDetail> {
        match self.lookup_by_governor(governor_id, bearer).await {
            Ok(Some(detail)) => return Some(detail),
            Ok(None) => {}
            Err(e) => warn!("governor lookup for {} failed: {}", governor_id, e),
        }
        match self.lookup_by_address(governor_address, bearer).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!("organization search for {} failed: {}", governor_address, e);
                None
            }
        }
    }

    async fn lookup_by_governor(
        &self,
        governor_id: &str,
        bearer: &str,
    ) -> Result<Option<DaoDetail>, PipelineError> {
        let variables = json!({ "input": { "id": governor_id } });
        let response = self
            .registry
            .execute(GOVERNOR_QUERY, variables, Some(bearer), None)
            .await?;
        if response.not_found() || response.has_errors() {
            return Ok(None);
        }
        Ok(response
            .data
            .as_ref()
            .and_then(|d| d.pointer("/governor/organization"))
            .and_then(parse_detail))
    }

    async fn lookup_by_address(
        &self,
        governor_address: &str,
        bearer: &str,
    ) -> Result<Option<DaoDetail>, PipelineError> {
        let variables = json!({
            "input": { "filters": { "address": governor_address } }
        });
        let response = self
            .registry
            .execute(ORGANIZATIONS_QUERY, variables, Some(bearer), None)
            .await?;
        if response.not_found() || response.has_errors() {
            return Ok(None);
        }
        Ok(response
            .data
            .as_ref()
            .and_then(|d| d.pointer("/organizations/nodes/0"))
            .and_then(parse_detail))
    }
}

fn parse_detail(value: &Value) -> Option<DaoDetail> {
    Some(DaoDetail {
        id: value.get("id")?.as_str()?.to_string(),
        name: value.get("name")?.as_str()?.to_string(),
    })
}

fn locate<'c>(
    created: &'c std::collections::BTreeMap<String, CreatedContract>,
    name: &str,
) -> Result<&'c CreatedContract, PipelineError> {
    created.get(name).ok_or_else(|| PipelineError::UnknownContract {
        name: name.to_string(),
        known: created.keys().cloned().collect(),
    })
}

fn start_block(contract: &CreatedContract, name: &str) -> u64 {
    match contract.block_number {
        Some(block) => block,
        None => {
            warn!(
                "no block number recorded for {}; falling back to {}",
                name, FALLBACK_START_BLOCK
            );
            FALLBACK_START_BLOCK
        }
    }
}
