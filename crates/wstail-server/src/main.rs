//! wstail-server: streams the tail of a log file over WebSocket.
//!
//! Every client connecting on the configured route gets its own tailer and
//! receives the last N lines of the file, re-sent whenever the file grows.

mod config;
mod server;
mod session;
mod stream;
mod tail;
#[cfg(test)]
mod testing;
mod transport;

use clap::Parser;
use config::{Overrides, ServerConfig};
use server::TailServer;
use std::path::PathBuf;
use tail::NotifierKind;
use tracing::{error, info, warn};

/// wstail-server: live log tail over WebSocket
#[derive(Parser, Debug)]
#[command(name = "wstail-server", version, about = "Live log tail over WebSocket")]
struct Cli {
    /// Listen address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// WebSocket route
    #[arg(long)]
    route: Option<String>,

    /// Log file to tail
    #[arg(short, long)]
    file: Option<String>,

    /// Number of trailing lines kept per client
    #[arg(short = 'n', long)]
    window: Option<usize>,

    /// Change notification backend
    #[arg(long, value_enum)]
    notifier: Option<NotifierKind>,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Config file path
    #[arg(long, default_value = "~/.wstail/config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting wstail-server");

    let config_path = PathBuf::from(&cli.config);
    let overrides = Overrides {
        listen: cli.listen,
        route: cli.route,
        file: cli.file,
        window: cli.window,
        notifier: cli.notifier,
        max_sessions: cli.max_sessions,
    };
    let server_config = match ServerConfig::load(Some(&config_path), overrides) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    info!(
        listen = %server_config.listen,
        route = %server_config.route,
        file = %server_config.tail.path.display(),
        "configuration loaded"
    );

    if let Err(e) = TailServer::new(server_config).run(shutdown_signal()).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }

    info!("wstail-server stopped");
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("received shutdown signal");
}
