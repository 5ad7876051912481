use anyhow::{Context, Result, anyhow};
use bpcore::migration::{RunKind, UpgradeStatus};
use bpcore::{
    FileOptionStore, FileSchema, Sequencer, UpgradeConfig, UpgradeContext, UpgradeOutcome,
    lifecycle,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "bp-upgrade")]
#[command(about = "Inspect and run community core schema upgrades")]
struct Cli {
    /// JSON file holding the site option table
    #[arg(long, global = true, default_value = "options.json")]
    options: PathBuf,

    /// JSON snapshot of the table catalog
    #[arg(long, global = true, default_value = "schema.json")]
    schema: PathBuf,

    /// Optional JSON upgrade configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the target schema version
    #[arg(long, global = true)]
    target: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the stored and target versions
    Status,
    /// List the migration steps the next upgrade would run
    Plan,
    /// Bring the schema up to the target version
    Upgrade,
    /// Seed default options, upgrade and flag the activation redirect
    Activate,
    /// Clear transient activation state
    Deactivate,
    /// Delete every option owned by the plugin
    Uninstall,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("BPCORE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.target)?;
    let mut ctx = open_context(&cli.options, &cli.schema, config)?;
    let sequencer = Sequencer::with_default_plan().context("Failed to build migration plan")?;

    match cli.command {
        Command::Status => {
            let status = sequencer.status(&ctx)?;
            print_status(&status);
            Ok(())
        }
        Command::Plan => {
            let status = sequencer.status(&ctx)?;
            print_plan(&status);
            Ok(())
        }
        Command::Upgrade => {
            let outcome = sequencer.run_upgrade(&mut ctx)?;
            print_outcome(&outcome);
            Ok(())
        }
        Command::Activate => {
            let outcome = lifecycle::activate(&mut ctx, &sequencer)?;
            print_outcome(&outcome);
            println!("Activated");
            Ok(())
        }
        Command::Deactivate => {
            lifecycle::deactivate(&mut ctx)?;
            println!("Deactivated");
            Ok(())
        }
        Command::Uninstall => {
            let deleted = lifecycle::uninstall(&mut ctx)?;
            println!("Uninstalled, {} option(s) removed", deleted);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, target: Option<u32>) -> Result<UpgradeConfig> {
    let mut config = match path {
        Some(path) => UpgradeConfig::from_json_file(path).map_err(|err| anyhow!(err))?,
        None => UpgradeConfig::new(),
    };
    if let Some(target) = target {
        config = config.target_version(target);
        config
            .validate()
            .map_err(|err| anyhow!("Invalid --target {}: {}", target, err))?;
    }
    Ok(config)
}

fn open_context(options: &Path, schema: &Path, config: UpgradeConfig) -> Result<UpgradeContext> {
    let options = FileOptionStore::open(options)
        .with_context(|| format!("Failed to open option store '{}'", options.display()))?;
    let schema = FileSchema::open(schema)
        .with_context(|| format!("Failed to open schema snapshot '{}'", schema.display()))?;
    Ok(UpgradeContext::new(Box::new(options), Box::new(schema), config))
}

fn print_status(status: &UpgradeStatus) {
    let stored = status
        .stored
        .map_or_else(|| "none".to_string(), |v| v.to_string());
    println!("Stored version: {}", stored);
    println!("Target version: {}", status.target);
    let summary = match status.kind {
        RunKind::FreshInstall => "fresh install pending".to_string(),
        RunKind::Upgrade => format!("{} migration step(s) pending", status.pending.len()),
        RunKind::UpToDate => "up to date".to_string(),
        RunKind::AheadOfTarget => "stored version is newer than this build".to_string(),
    };
    println!("Status: {}", summary);
}

fn print_plan(status: &UpgradeStatus) {
    match status.kind {
        RunKind::FreshInstall => println!("Fresh install: schema install only, no migration steps"),
        RunKind::UpToDate | RunKind::AheadOfTarget => println!("Nothing to do"),
        RunKind::Upgrade => {
            for (threshold, name) in &status.pending {
                println!("{:>6}  {}", threshold, name);
            }
        }
    }
}

fn print_outcome(outcome: &UpgradeOutcome) {
    match outcome {
        UpgradeOutcome::UpToDate { version } => println!("Already at version {}", version),
        UpgradeOutcome::Installed { version, report } => println!(
            "Installed version {} ({} table(s) created)",
            version,
            report.created_tables.len()
        ),
        UpgradeOutcome::Upgraded {
            from, to, applied, ..
        } => println!(
            "Upgraded {} -> {} ({} step(s) applied)",
            from,
            to,
            applied.len()
        ),
        UpgradeOutcome::AheadOfTarget { stored, target } => println!(
            "Stored version {} is ahead of target {}, left untouched",
            stored, target
        ),
    }
}
