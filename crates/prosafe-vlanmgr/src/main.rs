//! prosafe-vlan - VLAN configuration tool for NETGEAR ProSAFE switches
//!
//! Entry point for the `prosafe-vlan` command.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use prosafe_vlanmgr::{
    ApplyOptions, Config, HttpDriverFactory, Orchestrator, RestoreOutcome, SwitchStatus,
};

/// Reconcile VLAN membership and PVIDs of ProSAFE switches
#[derive(Parser, Debug)]
#[command(name = "prosafe-vlan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging (debug level); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a configuration file to every switch it lists
    Apply {
        /// Path to the configuration file
        #[arg(long)]
        config: PathBuf,

        /// Skip configuration restore on failure
        #[arg(long)]
        no_restore: bool,

        /// Directory receiving a `<switch>.cfg` backup of each switch
        #[arg(long, required_unless_present_any = ["no_restore", "dry_run"])]
        backup_dir: Option<PathBuf>,

        /// Keep going with the next switch after a failure
        #[arg(long)]
        continue_on_error: bool,

        /// Print the plan of each switch without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print device information
    Info {
        /// Path to the configuration file
        #[arg(long)]
        config: PathBuf,

        /// Only this switch
        #[arg(long)]
        switch: Option<String>,
    },
}

/// Initializes tracing/logging subsystem
fn init_logging(verbose: u8) {
    let default_level = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

async fn apply(config_path: PathBuf, options: ApplyOptions) -> anyhow::Result<bool> {
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    info!(
        "Loaded {} switch(es) from {}",
        config.switches.len(),
        config_path.display()
    );

    let dry_run = options.dry_run;
    let summary = Orchestrator::new(HttpDriverFactory, options)
        .apply(&config)
        .await;

    for outcome in &summary.outcomes {
        match &outcome.status {
            SwitchStatus::Applied(report) => {
                println!("{}: {} operation(s) applied", outcome.name, report.applied)
            }
            SwitchStatus::Planned(plan) => print!("{}:\n{}", outcome.name, plan),
            SwitchStatus::Failed { error, restore } => {
                println!("{}: FAILED: {}", outcome.name, error);
                match restore {
                    RestoreOutcome::Restored => println!("{}: configuration restored", outcome.name),
                    RestoreOutcome::Failed(e) => println!("{}: restore FAILED: {}", outcome.name, e),
                    RestoreOutcome::Skipped => {}
                }
            }
            SwitchStatus::Skipped => println!("{}: skipped", outcome.name),
        }
    }

    if dry_run {
        info!("Dry run, no switch was changed");
    }
    Ok(summary.all_succeeded())
}

async fn show_info(config_path: PathBuf, only: Option<String>) -> anyhow::Result<bool> {
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let switches: Vec<_> = match &only {
        Some(name) => match config.switch(name) {
            Some(sw) => vec![sw],
            None => bail!("no switch named '{}' in {}", name, config_path.display()),
        },
        None => config.switches.values().collect(),
    };

    let orch = Orchestrator::new(HttpDriverFactory, ApplyOptions::default());
    let mut ok = true;
    for switch in switches {
        match orch.switch_info(switch, config.options.timeout()).await {
            Ok(props) => {
                println!("[{}] {} ({})", switch.name, switch.address, switch.model);
                for (key, value) in props {
                    println!("  {}: {}", key, value);
                }
            }
            Err(e) => {
                error!("{}: {}", switch.name, e);
                ok = false;
            }
        }
    }
    Ok(ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Apply {
            config,
            no_restore,
            backup_dir,
            continue_on_error,
            dry_run,
        } => {
            let options = ApplyOptions {
                backup_dir,
                restore_on_failure: !no_restore,
                continue_on_error,
                dry_run,
            };
            apply(config, options).await
        }
        Command::Info { config, switch } => show_info(config, switch).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
