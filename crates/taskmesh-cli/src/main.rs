mod config;

use clap::{Parser, Subcommand};
use config::{LogFormat, LoggingConfig, TaskmeshConfig};
use std::path::PathBuf;
use taskmesh_gateway::GatewayServer;
use taskmesh_orchestrator::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskmesh", about = "taskmesh: in-process multi-agent task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, env = "TASKMESH_CONFIG", default_value = "taskmesh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the runtime and its HTTP API
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect worker types
    Workers {
        #[command(subcommand)]
        action: WorkersAction,
    },
}

#[derive(Subcommand)]
enum WorkersAction {
    /// List the worker types this binary can instantiate
    List,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = TaskmeshConfig::load(&cli.config)?;
    config.apply_env()?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let runtime = Runtime::start(config.runtime_config(), taskmesh_workers::default_registry()).await?;
            let app = GatewayServer::build(runtime.clone(), config.gateway_config());

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("taskmesh listening on {}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            runtime.shutdown(config.shutdown_grace()).await;
        }
        Commands::Workers { action } => match action {
            WorkersAction::List => {
                let registry = taskmesh_workers::default_registry();
                println!("Worker types:");
                for name in registry.types() {
                    println!("  {name}");
                }
                if !config.agents.bootstrap.is_empty() {
                    println!("\nBootstrap agents from {}:", cli.config.display());
                    for spec in &config.agents.bootstrap {
                        println!("  {} ({})", spec.id, spec.agent_type);
                    }
                }
            }
        },
    }

    Ok(())
}
