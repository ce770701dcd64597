//! waf-gate: inspecting reverse proxy.
//!
//! ```text
//!     client ──▶ TraceLayer ──▶ TimeoutLayer ──▶ waf::inspect ──▶ proxy_handler ──▶ upstream
//!                                                    │
//!                                          BasicEngine + PathPolicyStore
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use waf_gate::config::{load_config, GatewayConfig};
use waf_gate::lifecycle::{signals, Shutdown};
use waf_gate::observability::{logging, metrics};
use waf_gate::{BasicEngine, HttpServer, PathPolicyStore};

#[derive(Parser)]
#[command(name = "waf-gate")]
#[command(about = "Reverse proxy that inspects traffic with a rule engine", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if cli.check_config {
        BasicEngine::from_config(&config.engine)?;
        println!("configuration OK");
        return Ok(());
    }

    logging::init(&config.observability.log_level)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "waf-gate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        rule_engine = ?config.engine.rule_engine,
        rules = config.engine.rules.len(),
        paths = config.paths.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let engine = Arc::new(BasicEngine::from_config(&config.engine)?);
    let policies = Arc::new(PathPolicyStore::from_config(&config.paths));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(signals::trigger_on_ctrl_c(Arc::clone(&shutdown)));

    HttpServer::new(config, engine, policies)
        .run(listener, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
