mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, cosmos::CosmosSubcommand, deploy::DeployArgs, health::HealthArgs,
    package::PackageArgs, provision::ProvisionArgs, rule::RuleSubcommand,
    settings::SettingsSubcommand,
};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "secagent",
    about = "Provision, package and deploy the Security Agent service on Azure",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .secagent/ or .git/)
    #[arg(long, global = true, env = "SECAGENT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter .secagent/config.yaml
    Init {
        /// Project name (default: root directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show or validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Deploy the resource template and capture its outputs
    Provision(ProvisionArgs),

    /// Create the Cosmos DB database and containers
    Cosmos {
        #[command(subcommand)]
        subcommand: CosmosSubcommand,
    },

    /// Build the Function App deployment archive
    Package(PackageArgs),

    /// Generate Function App settings from deployment outputs
    Settings {
        #[command(subcommand)]
        subcommand: SettingsSubcommand,
    },

    /// Build and zip-deploy the package to the Function App
    Deploy(DeployArgs),

    /// Run the post-provision step sequence, stopping at the first failure
    Postprovision,

    /// Probe the deployed Function App's health endpoint
    Health(HealthArgs),

    /// Manage Sentinel automation rules
    Rule {
        #[command(subcommand)]
        subcommand: RuleSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name } => cmd::init::run(&root, name.as_deref()),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Provision(args) => cmd::provision::run(&root, args, cli.json),
        Commands::Cosmos { subcommand } => cmd::cosmos::run(&root, subcommand, cli.json),
        Commands::Package(args) => cmd::package::run(&root, args, cli.json),
        Commands::Settings { subcommand } => cmd::settings::run(&root, subcommand, cli.json),
        Commands::Deploy(args) => cmd::deploy::run(&root, args, cli.json),
        Commands::Postprovision => cmd::postprovision::run(&root, cli.json),
        Commands::Health(args) => cmd::health::run(&root, args, cli.json),
        Commands::Rule { subcommand } => cmd::rule::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
