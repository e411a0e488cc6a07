//! reqmon CLI
//!
//! Command-line interface for the reqmon request monitor.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

use reqmon::api::HttpServer;
use reqmon::collector::MonitoringRegistry;

/// reqmon - Request monitoring for web applications
#[derive(Parser)]
#[command(name = "reqmon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "REQMON_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitored HTTP server
    Serve {
        /// Host to bind to (overrides the configuration)
        #[arg(long, env = "REQMON_HOST")]
        host: Option<String>,

        /// HTTP port (overrides the configuration)
        #[arg(long, env = "REQMON_HTTP_PORT")]
        http_port: Option<u16>,
    },

    /// Print the effective configuration
    Config,
}

fn init_logging(config: &reqmon::config::LoggingConfig, verbose: bool) {
    let log_level = if verbose { "debug" } else { config.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if config.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Pick up a local .env before clap reads its env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match reqmon::Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging, cli.verbose);

    let result = match cli.command {
        Commands::Serve { host, http_port } => run_serve(config, host, http_port).await,
        Commands::Config => print_config(&config, cli.format),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_serve(
    config: reqmon::Config,
    host: Option<String>,
    http_port: Option<u16>,
) -> anyhow::Result<()> {
    let host = host.unwrap_or(config.server.host);
    let http_port = http_port.unwrap_or(config.server.http_port);
    let addr = format!("{host}:{http_port}");

    let registry = Arc::new(MonitoringRegistry::new(config.monitoring));
    let server = HttpServer::new(registry, &config.server.monitoring_path);

    info!(
        addr = %addr,
        monitoring_path = %config.server.monitoring_path,
        "Starting reqmon"
    );

    tokio::select! {
        result = server.serve(&addr) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}

fn print_config(config: &reqmon::Config, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => println!("{config:#?}"),
    }
    Ok(())
}
