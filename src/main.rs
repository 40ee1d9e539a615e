use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use magnet_stream_engine::config::ServerConfig;
use magnet_stream_engine::engine::registry::SessionRegistry;
use magnet_stream_engine::logging::init_tracing;
use magnet_stream_engine::server::handler::{ApiServer, AppState};
use magnet_stream_engine::source::rqbit::RqbitEngine;

#[derive(Parser, Debug)]
#[command(name = "magnet-stream", about = "Stream magnet links over HTTP with Range support")]
struct Cli {
    /// Address to bind the HTTP API to
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    bind_addr: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Base URL of the rqbit HTTP API
    #[arg(long, env = "RQBIT_URL", default_value = "http://127.0.0.1:3030")]
    rqbit_url: String,

    /// Maximum number of active torrent sessions
    #[arg(long, env = "MAX_SESSIONS", default_value_t = magnet_stream_engine::config::MAX_SESSIONS)]
    max_sessions: usize,

    /// Seconds to wait for torrent metadata
    #[arg(long, env = "METADATA_TIMEOUT_SECS", default_value_t = magnet_stream_engine::config::METADATA_TIMEOUT_SECS)]
    metadata_timeout_secs: u64,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            bind_addr: cli.bind_addr,
            port: cli.port,
            rqbit_url: cli.rqbit_url,
            max_sessions: cli.max_sessions,
            metadata_timeout_secs: cli.metadata_timeout_secs,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ServerConfig::from(Cli::parse());
    info!("starting with {:?}", config);

    let engine = Arc::new(RqbitEngine::new(config.rqbit_url.clone()));
    let registry = Arc::new(SessionRegistry::new(
        engine,
        config.max_sessions,
        config.metadata_timeout(),
    ));

    let state = Arc::new(AppState::new(Arc::clone(&registry)));
    let mut server = ApiServer::start(state, &format!("{}:{}", config.bind_addr, config.port)).await?;
    info!(
        "magnet stream server running on http://localhost:{}/api/",
        server.port()
    );

    shutdown_signal().await;
    info!("shutting down gracefully...");

    // Engine handles go before the drain so open bodies end instead of holding it.
    server.begin_shutdown();
    registry.evict_all().await;
    server.shutdown().await;
    Ok(())
}
