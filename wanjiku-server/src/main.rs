use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use wanjiku_core::{WanjikuConfig, WanjikuError};

use wanjiku_server::app::AppState;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "wanjiku.toml")]
    config: String,

    /// Check storage connectivity and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience, production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match WanjikuConfig::load(&args.config).map_err(WanjikuError::from) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let state = match AppState::from_config(config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to initialise storage: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match state.storage.sessions.ping().await {
            Ok(v) => println!("✅ Storage ({}) reachable: {}", state.config.database.backend, v),
            Err(e) => {
                println!("❌ Storage check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Wanjiku health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Background expiry sweep
    let sweep_sessions = state.storage.sessions.clone();
    let sweep_interval = state.config.session.sweep_interval_seconds;
    let sweep_shutdown = tx.subscribe();
    tokio::spawn(async move {
        wanjiku_server::subsystems::sweep::run_sweep_loop(
            sweep_sessions,
            sweep_interval,
            sweep_shutdown,
        )
        .await;
    });

    tracing::info!("{} starting", state.config.service.name);
    wanjiku_server::http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
