//! imbalancer: drive the `imbalancer` load balancing policy from the
//! command line
//!
//! Loads a YAML config naming backend addresses and an LB config, feeds
//! them to a policy host and prints the picks the resulting policy makes.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use imbalancer::{
    config::AppConfig,
    policy::{LoadBalancingConfig, PickArgs, PickResult},
    registry, ImbalancerConfig, PolicyHost,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Parser)]
#[command(name = "imbalancer")]
#[command(version = "0.1.0")]
#[command(about = "Delegating load balancing policy with a swappable child")]
#[command(long_about = "
imbalancer runs a top-level load balancing policy over a fixed address list:
  - The `imbalancer` policy delegates to a child chosen by name
  - The child can be switched by changing `childPolicy` in the config
  - Built-in children: round_robin (default), pick_first

Example usage:
  imbalancer run --config config.yaml --picks 10
  imbalancer list-policies --verbose
  imbalancer run --log-format json --log-level debug
")]
struct Cli {
    /// Path to config file (default: config.yaml, config.yml, ./config/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the config to a policy host and print picks
    Run {
        /// Override the number of picks
        #[arg(short, long)]
        picks: Option<usize>,
    },

    /// List all registered load balancing policies
    ListPolicies {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate configuration file
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    let env_filter = tracing_subscriber::EnvFilter::new(&level_filter);
    match cli.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(env_filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init(),
    }

    registry::init_global(registry::create_default_registry())
        .context("failed to install policy registry")?;

    match cli.command {
        Commands::Run { picks } => {
            run(cli.config.as_deref(), picks).await?;
        }
        Commands::ListPolicies { verbose } => {
            list_policies(verbose);
        }
        Commands::CheckConfig => {
            check_config(cli.config.as_deref());
        }
    }

    Ok(())
}

/// Feed the configured addresses through a policy host and print picks
async fn run(config_path: Option<&Path>, picks_override: Option<usize>) -> anyhow::Result<()> {
    let config = load_config_or_exit(config_path);
    let addresses = config.server_addresses()?;
    let picks = picks_override.unwrap_or(config.picks);

    let host = PolicyHost::new(
        registry::global(),
        &config.channel.authority,
        config.channel.channel_args(),
    );

    let result = host
        .update(&config.load_balancing_config, addresses)
        .await;
    let state = host.state();
    match &result {
        Ok(()) => tracing::info!(state = %state.connectivity, "Policy configured"),
        Err(e) => tracing::warn!(state = %state.connectivity, error = %e, "Policy update failed"),
    }

    for i in 0..picks {
        let args = PickArgs::new(format!("/pick/{i}"));
        match host.pick(&args) {
            PickResult::Complete { address } => println!("{i:>4}  {address}"),
            PickResult::Queue => println!("{i:>4}  (queued)"),
            PickResult::Fail(status) => println!("{i:>4}  failed: {status}"),
            PickResult::Drop(status) => println!("{i:>4}  dropped: {status}"),
        }
    }

    host.shutdown().await?;
    result.context("policy update failed")?;
    Ok(())
}

/// List all registered policies
fn list_policies(verbose: bool) {
    let registry = registry::global();

    println!("Registered load balancing policies:\n");

    for factory in registry.list_factories() {
        if verbose {
            println!("  {}:", factory.name());
            println!("    {}", factory.description());
            println!();
        } else {
            println!("  {:20} - {}", factory.name(), factory.description());
        }
    }

    if verbose {
        println!("\nTo choose the child policy, edit your config.yaml:");
        println!("\nload_balancing_config:");
        println!("  - imbalancer:");
        println!("      childPolicy: pick_first");
        println!("      childPolicyConfig:");
        println!("        shuffleAddressList: true");
    }
}

/// Validate configuration file and its LB config
fn check_config(config_path: Option<&Path>) {
    let config = load_config_or_exit(config_path);
    let registry = registry::global();

    match registry.parse_load_balancing_config(&config.load_balancing_config) {
        Ok(lb_config) => {
            println!("✓ Configuration file is valid\n");
            println!("Channel:");
            println!("  Authority: {}", config.channel.authority);
            for (key, value) in &config.channel.args {
                println!("  {} = {}", key, value);
            }
            println!("\nLoad balancing:");
            println!("  Policy: {}", lb_config.name());
            if let Some(imbalancer) = lb_config.downcast_ref::<ImbalancerConfig>() {
                println!("  Child policy: {}", imbalancer.child_policy_name());
            }
            println!("\nAddresses: {}", config.addresses.len());
            for address in &config.addresses {
                println!("  {}", address.trim());
            }
            println!("\nPicks: {}", config.picks);
        }
        Err(e) => {
            eprintln!("✗ Load balancing config error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: Option<&Path>) -> AppConfig {
    match AppConfig::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nMake sure you have a config.yaml file.");
            eprintln!("You can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
