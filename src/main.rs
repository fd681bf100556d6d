use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use message_gateway::{Cli, Command, ServeArgs, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    init_tracing(&args.log_level);

    let config = args.validate()?;
    info!(
        upstream = %config.upstream_url,
        timeout = ?config.upstream_timeout,
        "forwarding to message API"
    );

    let handle = Server::from_config(config)?.start().await?;

    // wait here until a termination signal arrives
    shutdown_signal().await;

    handle.shutdown().await?;
    Ok(())
}

// RUST_LOG wins unless --log-level names a valid filter
fn init_tracing(level: &str) {
    let default_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let mut rejected = None;
    let filter = if level.is_empty() {
        default_filter()
    } else {
        match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(e) => {
                rejected = Some(e);
                default_filter()
            }
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match rejected {
        Some(e) => warn!(level, error = %e, "error parsing log level, keeping default"),
        None if !level.is_empty() => info!(level, "log level set"),
        None => {}
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}
