use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;
use serde::Serialize;
use tracing::info;

use serp_rank_tracker::audit::AuditLog;
use serp_rank_tracker::cli::{Cli, Command};
use serp_rank_tracker::model::LandingDocument;
use serp_rank_tracker::preflight::PreflightInputs;
use serp_rank_tracker::report::{write_report, REPORT_FILE};
use serp_rank_tracker::secrets::{SecretVault, VAULT_SERVICE_NAME};
use serp_rank_tracker::store::{load_document, Artifact};
use serp_rank_tracker::{init_tracing, AppConfig, AppError, FileStore, Governor, HttpSerpClient};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.input_dir {
        config.input_dir = dir;
    }

    match cli.command {
        Command::Preflight => {
            let inputs = load_inputs(&config.input_dir)?;
            print_json(&build_governor(&config, false)?.preflight(&inputs)?)?;
        }
        Command::Takeoff => {
            print_json(&build_governor(&config, true)?.takeoff().await?)?;
        }
        Command::Landing => {
            print_json(&build_governor(&config, true)?.landing().await?)?;
        }
        Command::Run => {
            let inputs = load_inputs(&config.input_dir)?;
            print_json(&build_governor(&config, true)?.run_all(&inputs).await?)?;
        }
        Command::Report { output } => {
            let store = FileStore::new(&config.data_dir)?;
            let document: LandingDocument = load_document(&store, Artifact::Landing)?.ok_or(
                AppError::MissingArtifact {
                    phase: "report",
                    artifact: "landing",
                },
            )?;
            let path = output.unwrap_or_else(|| config.data_dir.join(REPORT_FILE));
            let rows = write_report(&document, &path)
                .with_context(|| format!("writing report to {}", path.display()))?;
            println!("{rows} rows written to {}", path.display());
        }
        Command::Credentials { login, password } => {
            SecretVault::new(VAULT_SERVICE_NAME)
                .store_credentials(&login, &SecretString::from(password))?;
            info!("credentials stored in the OS keychain");
        }
        Command::Config => print_json(&config.public_profile())?,
    }
    Ok(())
}

fn load_inputs(dir: &Path) -> Result<PreflightInputs> {
    PreflightInputs::load(dir).with_context(|| format!("loading input tables from {}", dir.display()))
}

fn build_governor(config: &AppConfig, with_provider: bool) -> Result<Governor> {
    let store = Arc::new(FileStore::new(&config.data_dir)?);
    let governor = Governor::new(store, config.pipeline_settings()?);
    if !with_provider {
        return Ok(governor);
    }

    let credentials = SecretVault::new(VAULT_SERVICE_NAME).resolve_credentials(config)?;
    let serp = HttpSerpClient::new(
        &config.serp_api_base,
        credentials,
        Duration::from_secs(config.http_timeout_secs),
    )?;
    let audit = AuditLog::new(&config.data_dir, config.audit_log_max_bytes)?;
    Ok(governor.with_provider(Arc::new(serp), audit))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
