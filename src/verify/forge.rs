// Forge and cast invocations
//
// Builds and runs the external toolchain commands behind source
// verification. Argument construction is kept separate from process
// spawning so the argv shape stays testable without a toolchain installed.

use tokio::process::Command;

use crate::error::PipelineError;

use super::VerificationTarget;

/// Argument vector for one `cast abi-encode` run
///
/// Constructor arguments are passed through in record order as their
/// canonical string forms; encoding against the declared parameter types
/// is delegated entirely to `cast`.
pub fn cast_encode_args(param_types: &[String], raw_args: &[String]) -> Vec<String> {
    let mut args = vec![
        "abi-encode".to_string(),
        format!("constructor({})", param_types.join(",")),
    ];
    args.extend(raw_args.iter().cloned());
    args
}

/// Argument vector for one `forge verify-contract` run
pub fn forge_verify_args(
    target: &VerificationTarget,
    chain_id: &str,
    rpc_url: &str,
    etherscan_api_key: &str,
    encoded_constructor_args: Option<&str>,
) -> Vec<String> {
    let mut args = vec![
        "verify-contract".to_string(),
        target.address.clone(),
        target.contract_name.clone(),
        "--compiler-version".to_string(),
        target.compiler_version.clone(),
        "--verifier".to_string(),
        "etherscan".to_string(),
        "--etherscan-api-key".to_string(),
        etherscan_api_key.to_string(),
        "--chain-id".to_string(),
        chain_id.to_string(),
        "--rpc-url".to_string(),
        rpc_url.to_string(),
    ];
    if let Some(runs) = target.optimizer_runs {
        args.push("--num-of-optimizations".to_string());
        args.push(runs.to_string());
    }
    if let Some(encoded) = encoded_constructor_args {
        args.push("--constructor-args".to_string());
        args.push(encoded.to_string());
    }
    // Let forge poll the verifier until it reports a final status
    args.push("--watch".to_string());
    args
}

/// ABI-encode constructor arguments through `cast abi-encode`
pub async fn run_cast_abi_encode(
    contract: &str,
    param_types: &[String],
    raw_args: &[String],
) -> Result<String, PipelineError> {
    let args = cast_encode_args(param_types, raw_args);
    run_tool("cast", &args, contract).await
}

/// Submit one verification through `forge verify-contract` and wait for
/// the verifier's final status text
pub async fn run_forge_verify(contract: &str, args: &[String]) -> Result<String, PipelineError> {
    run_tool("forge", args, contract).await
}

async fn run_tool(
    program: &str,
    args: &[String],
    contract: &str,
) -> Result<String, PipelineError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| PipelineError::VerifierInvocationFailed {
            contract: contract.to_string(),
            reason: format!("failed to run {}: {}", program, e),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::VerifierInvocationFailed {
            contract: contract.to_string(),
            reason: format!("{} exited with {}: {}", program, output.status, stderr.trim()),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
