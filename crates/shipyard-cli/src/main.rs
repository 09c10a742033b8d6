//! Shipyard - versioned instance deploys for one project root
//!
//! Usage:
//!   shipyard staging deploy             # deploy local HEAD
//!   shipyard live deploy --branch main
//!   shipyard live rollback
//!   shipyard live status --format json

mod confirm;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard_core::config::ConfigStore;
use shipyard_core::context::AppContext;
use shipyard_core::lock::DeployLock;
use shipyard_core::pipeline::InstanceState;
use shipyard_core::status::{DEFAULT_LOG_LINES, StatusReport};

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(about = "Deploy, activate and roll back versioned instances", long_about = None)]
struct Cli {
    /// Project configuration file (default: ./shipyard.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Environment from the configuration, e.g. staging or live
    environment: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a revision and make it the current instance
    Deploy {
        /// Deploy the tip of this branch
        #[arg(long, short, conflicts_with = "commit")]
        branch: Option<String>,

        /// Deploy this commit
        #[arg(long, short = 'C')]
        commit: Option<String>,

        /// Replace a never-activated instance directory for the same revision
        #[arg(long)]
        force: bool,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,

        /// Number of recent instances kept when pruning
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Restore the previous instance and its database
    Rollback,

    /// Show instances, pointers and the latest log lines
    Status {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Number of log lines to show
        #[arg(long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },

    /// Remove obsolete instances
    Prune {
        /// Number of recent instances kept
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Download a database dump
    #[command(name = "dump-db")]
    DumpDb {
        /// Local directory for the dump
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },

    /// Download the shared media folder as a tarball
    Media {
        /// Local directory for the archive
        #[arg(long, short, default_value = ".")]
        output: PathBuf,
    },

    /// Remove a deploy lock left behind by an interrupted run
    Unlock,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipyard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let settings = ConfigStore::discover(cli.config.as_deref())?.load_settings(&cli.environment)?;
    tracing::debug!(
        environment = %settings.environment,
        host = %settings.host,
        root = %settings.project_root().display(),
        "loaded settings"
    );
    let ctx = AppContext::from_settings(settings);

    run_cli(&ctx, cli.command)
}

fn run_cli(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Deploy {
            branch,
            commit,
            force,
            yes,
            keep,
        } => run_deploy(ctx, branch.or(commit), force, yes, keep),
        Commands::Rollback => run_rollback(ctx),
        Commands::Status { format, lines } => run_status(ctx, format, lines),
        Commands::Prune { keep } => run_prune(ctx, keep),
        Commands::DumpDb { output } => {
            let path = ctx.backup_manager().dump_database(&output)?;
            println!("{} {}", style("Saved database dump to").green(), path.display());
            Ok(())
        }
        Commands::Media { output } => {
            let path = ctx.backup_manager().archive_media(&output)?;
            println!("{} {}", style("Saved media tarball to").green(), path.display());
            Ok(())
        }
        Commands::Unlock => {
            if DeployLock::break_stale(ctx.executor().as_ref(), ctx.layout())? {
                println!("Removed deploy lock in {}", ctx.layout().root().display());
            } else {
                println!("No deploy lock held.");
            }
            Ok(())
        }
    }
}

fn run_deploy(
    ctx: &AppContext,
    reference: Option<String>,
    force: bool,
    yes: bool,
    keep: Option<usize>,
) -> Result<()> {
    let deployer = ctx.deployer();
    let mut options = ctx.deploy_options();
    options.force = force;
    if let Some(keep) = keep {
        options.retain_recent = keep;
    }

    let stamp = deployer.resolver().resolve(reference.as_deref())?;
    if reference.is_none() && !yes {
        let branch = ctx.collaborators().vcs.current_branch()?;
        if !confirm::confirm_head_deploy(branch.as_deref(), &stamp)? {
            println!("Deploy cancelled.");
            return Ok(());
        }
    }

    let report = deployer.deploy_stamp(&stamp, &options)?;

    println!(
        "{} {} is now the current instance in {}",
        style("Deployed").green().bold(),
        style(&report.stamp).cyan(),
        ctx.settings().environment
    );
    if let Some(previous) = &report.previous {
        println!("Previous instance: {}", previous);
    }
    if !report.pruned.is_empty() {
        println!("Removed obsolete instances:");
        for stamp in &report.pruned {
            println!("  {}", stamp);
        }
    }
    Ok(())
}

fn run_rollback(ctx: &AppContext) -> Result<()> {
    let report = ctx.rollback_manager().rollback()?;
    println!(
        "{} to {}, removed {}",
        style("Rolled back").green().bold(),
        style(&report.restored).cyan(),
        report.removed
    );
    Ok(())
}

fn run_prune(ctx: &AppContext, keep: Option<usize>) -> Result<()> {
    let keep = keep.unwrap_or(ctx.settings().keep_instances);
    let _lock = DeployLock::acquire(ctx.executor().clone(), ctx.layout())?;
    let removed = ctx.store().prune(keep)?;
    if removed.is_empty() {
        println!("No obsolete instances.");
    } else {
        println!("Removed obsolete instances:");
        for stamp in &removed {
            println!("  {}", stamp);
        }
    }
    Ok(())
}

fn run_status(ctx: &AppContext, format: OutputFormat, lines: usize) -> Result<()> {
    let report = ctx.status(lines)?;
    match format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_table(status: &StatusReport) {
    println!("Project: {}", status.project_root.display());
    if let Some(ref size) = status.size {
        println!("Size: {}", size);
    }
    println!("Current: {}", pointer_label(status.current.as_ref()));
    println!("Previous: {}", pointer_label(status.previous.as_ref()));
    if status.locked {
        println!(
            "{}",
            style("Deploy lock held (run 'shipyard <env> unlock' if no deploy is running)").yellow()
        );
    }
    println!();

    if status.instances.is_empty() {
        println!("No instances deployed.");
    } else {
        println!("Instances ({}):", status.instances.len());
        println!("  {:<42} {:<18} State", "Stamp", "Created");
        println!("  {}", "-".repeat(70));
        for instance in &status.instances {
            let state = match instance.state {
                InstanceState::Active => style("active").green(),
                InstanceState::Previous => style("previous").cyan(),
                _ => style("obsolete").dim(),
            };
            println!(
                "  {:<42} {:<18} {}",
                instance.stamp.as_str(),
                instance.created.format("%Y-%m-%d %H:%M").to_string(),
                state
            );
        }
    }
    println!();

    println!("Log:");
    if status.log.is_empty() {
        println!("  {}", style("[empty]").dim());
    }
    for line in &status.log {
        println!("  {}", line);
    }
}

fn pointer_label(stamp: Option<&shipyard_core::stamp::Stamp>) -> String {
    match stamp {
        Some(stamp) => stamp.to_string(),
        None => style("[none]").red().to_string(),
    }
}
