use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use policy_defaults_kernel::adapters::http::HttpPolicyCatalog;
use policy_defaults_kernel::catalog::AccountId;
use policy_defaults_kernel::config::ProviderConfig;
use policy_defaults_kernel::readback::{read_back, verify, Verification};
use policy_defaults_kernel::reconcile::{
    reconcile, release, AppliedMutation, ReconcileError, ReconcileReport,
};
use policy_defaults_kernel::simulate::simulate;
use policy_defaults_kernel::state::{AccountView, DesiredAssociation};

/// Default security policy association CLI
#[derive(Parser, Debug)]
#[command(name = "policy-defaults")]
#[command(about = "Keep an account's default security policies in sync", long_about = None)]
struct Cli {
    /// Path to provider config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the policy service base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Converge the account to a desired association
    Apply {
        /// Path to desired association JSON
        #[arg(long)]
        desired: PathBuf,

        /// Plan only, do not write to the policy service
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the association currently in place
    Read {
        #[arg(long)]
        account: AccountId,
    },

    /// Remove the account's non-mandatory defaults
    Release {
        #[arg(long)]
        account: AccountId,
    },
}

#[derive(Debug, Serialize)]
struct ApplyOutput {
    report: ReconcileReport,
    verification: Verification,
}

#[derive(Debug, Serialize)]
struct ReadOutput {
    association: DesiredAssociation,
    view: AccountView,
}

/// Printed when a run fails after some changes went out.
#[derive(Debug, Serialize)]
struct PartialOutput<'a> {
    account_id: AccountId,
    applied: &'a [AppliedMutation],
    error: String,
}

#[derive(Debug, Serialize)]
struct ReleaseOutput {
    report: ReconcileReport,
    view: AccountView,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ----------------------------
    // Logging (stderr; stdout is JSON)
    // ----------------------------
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .with_writer(std::io::stderr)
        .init();

    // ----------------------------
    // Load provider config
    // ----------------------------
    let mut config = match &cli.config {
        Some(path) => read_json::<ProviderConfig>(path)?,
        None => ProviderConfig::default_config(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    let catalog = HttpPolicyCatalog::new(&config).context("failed to build policy service client")?;
    let options = &config.reconcile;

    // ----------------------------
    // Run command
    // ----------------------------
    match cli.command {
        Command::Apply { desired, dry_run } => {
            let desired: DesiredAssociation = read_json(&desired)?;
            info!(account_id = %desired.account_id, dry_run, "applying default association");

            if dry_run {
                let result = simulate(&catalog, &desired, options)
                    .map_err(|e| report_failure(desired.account_id, e))?;
                print_json(&result)?;
                return Ok(());
            }

            let report = reconcile(&catalog, &desired, options)
                .map_err(|e| report_failure(desired.account_id, e))?;
            let verification = verify(&catalog, &desired)?;
            let converged = verification.drift.is_converged();

            print_json(&ApplyOutput {
                report,
                verification,
            })?;

            if !converged {
                bail!(
                    "defaults for account {} did not converge",
                    desired.account_id
                );
            }
        }

        Command::Read { account } => {
            let view = read_back(&catalog, account)?;
            print_json(&ReadOutput {
                association: view.to_association(),
                view,
            })?;
        }

        Command::Release { account } => {
            let report =
                release(&catalog, account, options).map_err(|e| report_failure(account, e))?;
            let view = read_back(&catalog, account)?;
            print_json(&ReleaseOutput { report, view })?;
        }
    }

    Ok(())
}

/// Print what a failed run already changed, then hand the error back.
fn report_failure(account_id: AccountId, error: ReconcileError) -> anyhow::Error {
    if !error.applied().is_empty() {
        let partial = PartialOutput {
            account_id,
            applied: error.applied(),
            error: error.to_string(),
        };
        if let Err(print_error) = print_json(&partial) {
            error!(%print_error, "failed to print partial report");
        }
    }
    error.into()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
