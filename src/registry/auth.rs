// SIWE authentication
//
// Obtains a bearer token from the registry through a Sign-In-With-Ethereum
// challenge/response exchange and caches it for the rest of the process.
// A pre-supplied token short-circuits the whole exchange.

use ethers::signers::{LocalWallet, Signer};
use ethers::utils::to_checksum;
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PipelineError;

use super::RegistryClient;

const SIWE_DOMAIN: &str = "www.tally.xyz";
const SIWE_URI: &str = "https://www.tally.xyz";
const SIWE_STATEMENT: &str = "Sign in with Ethereum to Tally";
// The registry authenticates on its own identity chain, independent of the
// deployment's target chain.
const SIWE_CHAIN_ID: u64 = 1;

const CREATE_NONCE_MUTATION: &str = r#"
mutation CreateNonce {
  createNonce {
    nonce
    nonceToken
    issuedAt
    expirationTime
  }
}
"#;

const LOGIN_MUTATION: &str = r#"
mutation Login($message: String!, $signature: String!, $signInType: SignInType!) {
  login(message: $message, signature: $signature, signInType: $signInType)
}
"#;

/// Nonce challenge issued by the registry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceChallenge {
    pub nonce: String,
    pub nonce_token: String,
    pub issued_at: String,
    pub expiration_time: String,
}

/// Authentication context for registry operations
///
/// Holds the signing configuration and the token cache; the token is
/// written once per process and reused by every subsequent operation.
pub struct AuthClient {
    signing_key: Option<String>,
    supplied_token: Option<String>,
    cached_token: Option<String>,
}

impl AuthClient {
    pub fn new(signing_key: Option<String>, supplied_token: Option<String>) -> Self {
        Self {
            signing_key,
            supplied_token,
            cached_token: None,
        }
    }

    /// Return a bearer token, performing the SIWE exchange at most once
    ///
    /// A pre-supplied token is used as-is without validation. Otherwise the
    /// exchange runs: fetch a nonce challenge, sign the canonical message
    /// with the configured key, and trade the signature for a token.
    pub async fn authenticate(
        &mut self,
        registry: &RegistryClient,
    ) -> Result<String, PipelineError> {
        if let Some(token) = &self.supplied_token {
            return Ok(token.clone());
        }
        if let Some(token) = &self.cached_token {
            return Ok(token.clone());
        }

        let key = self
            .signing_key
            .as_ref()
            .ok_or(PipelineError::AuthConfigMissing)?;
        let wallet: LocalWallet = key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| PipelineError::LoginFailed(format!("invalid signing key: {}", e)))?;

        let challenge = fetch_nonce(registry).await?;
        let address = to_checksum(&wallet.address(), None);
        let message = siwe_message(&address, &challenge);
        let signature = wallet
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| PipelineError::LoginFailed(format!("signing failed: {}", e)))?;

        let variables = json!({
            "message": message,
            "signature": format!("0x{}", hex::encode(signature.to_vec())),
            "signInType": "evm",
        });
        let response = registry
            .execute(LOGIN_MUTATION, variables, None, Some(&challenge.nonce_token))
            .await
            .map_err(|e| PipelineError::LoginFailed(e.to_string()))?;
        if response.has_errors() {
            return Err(PipelineError::LoginFailed(response.errors_text()));
        }
        let token = response
            .data
            .as_ref()
            .and_then(|d| d.get("login"))
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::LoginFailed("login response carried no token".to_string()))?
            .to_string();

        info!("authenticated with registry as {}", address);
        self.cached_token = Some(token.clone());
        Ok(token)
    }
}

async fn fetch_nonce(registry: &RegistryClient) -> Result<NonceChallenge, PipelineError> {
    let response = registry
        .execute(CREATE_NONCE_MUTATION, Value::Null, None, None)
        .await
        .map_err(|e| PipelineError::NonceFetchFailed(e.to_string()))?;
    if response.has_errors() {
        return Err(PipelineError::NonceFetchFailed(response.errors_text()));
    }
    let raw = response
        .data
        .and_then(|d| d.get("createNonce").cloned())
        .ok_or_else(|| {
            PipelineError::NonceFetchFailed("nonce response carried no challenge".to_string())
        })?;
    serde_json::from_value(raw).map_err(|e| PipelineError::NonceFetchFailed(e.to_string()))
}

/// Canonical EIP-4361 message for the registry login exchange
pub fn siwe_message(address: &str, challenge: &NonceChallenge) -> String {
    format!(
        "{} wants you to sign in with your Ethereum account:\n{}\n\n{}\n\nURI: {}\nVersion: 1\nChain ID: {}\nNonce: {}\nIssued At: {}\nExpiration Time: {}",
        SIWE_DOMAIN,
        address,
        SIWE_STATEMENT,
        SIWE_URI,
        SIWE_CHAIN_ID,
        challenge.nonce,
        challenge.issued_at,
        challenge.expiration_time,
    )
}
