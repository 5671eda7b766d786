//! Chat relay - Entry Point
//!
//! Loads configuration, starts the Hub actor and the TCP accept loop, and
//! tears both down on Ctrl-C / SIGTERM.

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::{Cli, Hub, Listener};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("chat_relay={}", config.log_level))),
        )
        .init();

    info!(
        listen_address = %config.listen_address,
        transport = ?config.transport,
        max_message_bytes = config.max_message_bytes,
        write_timeout = ?config.write_timeout,
        read_timeout = ?config.read_timeout,
        "configuration loaded"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    // Create Hub actor channel and start
    let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity);
    let hub_task = tokio::spawn(Hub::new(event_rx).run(shutdown.clone()));

    let listener = Listener::bind(
        config.bind_address(),
        event_tx,
        config.connection_settings(),
    )
    .await?;
    listener.run(shutdown.clone()).await;

    hub_task.await?;
    info!("server stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(err) = result {
                            // SIGTERM still works
                            warn!(error = ?err, "failed to listen for ctrl-c");
                            term.recv().await;
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!(error = ?err, "failed to install SIGTERM handler");
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = ?err, "failed to listen for ctrl-c");
                    return;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = ?err, "failed to listen for ctrl-c");
            return;
        }
    }

    info!("shutdown signal received");
    shutdown.cancel();
}
