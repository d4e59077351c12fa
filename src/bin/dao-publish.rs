// DAO publication CLI
//
// Command-line interface over the deployment publication pipeline.
// Environment validation happens at this boundary via Settings::from_env;
// the library modules only ever see explicit values.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use dao_publish::artifacts::{read_deployment_record, record_path, reduce_to_latest_creations};
use dao_publish::config::{resolve_dao_config, Settings};
use dao_publish::registry::auth::AuthClient;
use dao_publish::registry::publish::{governor_id, ExistenceState, Publisher};
use dao_publish::registry::RegistryClient;
use dao_publish::verify::{Verifier, SUBMISSION_DELAY};

/// Post-deployment verification and registry publication for governance contracts
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Block number of the record to read (default: the run-latest record)
    #[clap(long, global = true)]
    record_block: Option<u64>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify deployed contract source on the block explorer
    Verify {
        /// Contract names to verify (default: all created contracts)
        #[clap(long, value_delimiter = ',')]
        contracts: Option<Vec<String>>,

        /// Seconds to wait before each verifier submission (default: 3)
        #[clap(long)]
        delay_secs: Option<u64>,
    },

    /// Register the governance instance with the registry
    Publish,

    /// Check whether the governor is already registered
    Check,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    let path = record_path(
        &settings.broadcast_dir,
        &settings.deploy_script,
        &settings.chain_id,
        cli.record_block,
    );
    let record = read_deployment_record(&path)
        .with_context(|| format!("reading deployment record {}", path.display()))?;

    match cli.command {
        Commands::Verify {
            contracts,
            delay_secs,
        } => {
            let verifier = Verifier {
                chain_id: settings.chain_id.clone(),
                rpc_url: settings.rpc_url.clone(),
                etherscan_api_key: settings.etherscan_api_key.clone(),
                out_dir: settings.out_dir.clone(),
                delay: delay_secs
                    .map(Duration::from_secs)
                    .unwrap_or(SUBMISSION_DELAY),
            };
            let summary = verifier.verify_all(&record, contracts.as_deref()).await?;
            for outcome in &summary.outcomes {
                match &outcome.result {
                    Ok(status) => println!("{}: {}", outcome.contract_name, status),
                    Err(e) => println!("{}: FAILED ({})", outcome.contract_name, e),
                }
            }
            if !summary.is_clean() {
                anyhow::bail!(
                    "{} of {} verifications failed",
                    summary.failed_count(),
                    summary.outcomes.len()
                );
            }
            println!("All {} verifications succeeded", summary.outcomes.len());
        }

        Commands::Publish => {
            let (dao, source) =
                resolve_dao_config(&settings.dao_metadata_path, &settings.deploy_config_path)?;
            info!("resolved DAO metadata from {:?}: {}", source, dao.name);
            let registry = RegistryClient::new(&settings.registry_endpoint, &settings.registry_api_key);
            let mut auth = AuthClient::new(
                settings.signing_key.clone(),
                settings.registry_token.clone(),
            );
            let mut publisher = Publisher::new(&registry, &mut auth);
            let outcome = publisher
                .publish(
                    &record,
                    &settings.chain_id,
                    &settings.governor_contract,
                    &settings.token_contract,
                    &dao,
                )
                .await?;
            if outcome.existing {
                println!("Governor {} is already registered", outcome.governor_id);
                if let Some(name) = &outcome.dao_name {
                    println!("DAO: {}", name);
                }
                if let Some(id) = &outcome.dao_id {
                    println!("Registry id: {}", id);
                }
            } else {
                println!(
                    "Registered {} as {}",
                    outcome.governor_id,
                    outcome.dao_name.as_deref().unwrap_or(&dao.name)
                );
            }
        }

        Commands::Check => {
            let created = reduce_to_latest_creations(&record);
            let governor = created
                .get(&settings.governor_contract)
                .with_context(|| {
                    format!(
                        "{} was not created in this deployment record",
                        settings.governor_contract
                    )
                })?;
            let gid = governor_id(&settings.chain_id, &governor.address);
            let registry = RegistryClient::new(&settings.registry_endpoint, &settings.registry_api_key);
            let mut auth = AuthClient::new(
                settings.signing_key.clone(),
                settings.registry_token.clone(),
            );
            let mut publisher = Publisher::new(&registry, &mut auth);
            match publisher.check(&gid).await? {
                ExistenceState::ConfirmedExists => println!("{}: registered", gid),
                ExistenceState::ConfirmedAbsent => println!("{}: not registered", gid),
                ExistenceState::Unknown => println!("{}: could not be determined", gid),
            }
        }
    }

    Ok(())
}
