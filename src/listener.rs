//! TCP accept loop
//!
//! Accepts connections and hands each one to `handle_connection`, which
//! registers it with the Hub before reading anything.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;
use crate::handler::{handle_connection, ConnectionSettings};
use crate::hub::HubEvent;

/// Bound listener plus what each accepted connection needs
pub struct Listener {
    listener: TcpListener,
    events: mpsc::Sender<HubEvent>,
    settings: ConnectionSettings,
}

impl Listener {
    /// Bind to `addr`
    pub async fn bind(
        addr: impl ToSocketAddrs,
        events: mpsc::Sender<HubEvent>,
        settings: ConnectionSettings,
    ) -> Result<Self, AppError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            events,
            settings,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let Listener {
            listener,
            events,
            settings,
        } = self;

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "tcp listening");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("listener shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        spawn_connection(stream, peer, &events, settings, &shutdown);
                    }
                    Err(e) => warn!(error = %e, "accept error"),
                },
            }
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: &mpsc::Sender<HubEvent>,
    settings: ConnectionSettings,
    shutdown: &CancellationToken,
) {
    info!(%peer, "new connection");
    let events = events.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, peer, events, settings, shutdown).await {
            warn!(%peer, error = %e, "connection handler error");
        }
    });
}
