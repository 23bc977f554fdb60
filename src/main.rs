use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use canopy_gateway::{Config, Daemon};

/// Canopy - device-tree gateway for IoT middleware
#[derive(Parser)]
#[command(name = "canopy", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CANOPY_CONFIG")]
    config: Option<PathBuf>,

    /// Federation namespace of this instance
    #[arg(short, long, env = "CANOPY_NAMESPACE")]
    namespace: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Run,
    /// Run the gateway with a simulated provider attached
    Simulate,
    /// Print the effective configuration and exit
    DescribeConfig,
}

fn init_tracing(verbose: u8, config_filter: Option<&str>) {
    let default = match verbose {
        0 => "canopy_gateway=info,canopy=info",
        1 => "canopy_gateway=debug,canopy=debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config_filter.unwrap_or(default)))
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> canopy_gateway::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config = config.with_env_overrides();
    if let Some(namespace) = &cli.namespace {
        config.namespace.clone_from(namespace);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.verbose, config.log_filter.as_deref());

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => Daemon::new(config).run(false).await,
        Command::Simulate => Daemon::new(config).run(true).await,
        Command::DescribeConfig => {
            match toml::to_string_pretty(&config) {
                Ok(rendered) => {
                    println!("{rendered}");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("failed to render configuration: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway terminated");
            ExitCode::FAILURE
        }
    }
}
