//! Per-connection tasks
//!
//! Registers the connection with the Hub, then runs one reader task
//! (transport -> `HubEvent::Inbound`) and one writer task
//! (outbound queue -> transport) until either side ends.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::{MessageReader, MessageWriter};
use crate::error::AppError;
use crate::hub::HubEvent;
use crate::message::WireMessage;
use crate::types::ClientId;

/// Per-connection limits taken from the configuration
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Outbound queue capacity per client
    pub outbound_capacity: usize,
    /// Longest accepted inbound line in bytes
    pub max_message_bytes: usize,
    /// Upper bound on writing one message
    pub write_timeout: Duration,
    /// Idle limit between inbound messages, if any
    pub read_timeout: Option<Duration>,
}

/// Handle a new TCP connection
///
/// Returns once both tasks have finished and the transport is released.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::Sender<HubEvent>,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let client_id = ClientId::new();
    let (read_half, write_half) = stream.into_split();

    // Create channel for hub -> client messages
    let (msg_tx, msg_rx) = mpsc::channel::<WireMessage>(settings.outbound_capacity);
    let conn_token = shutdown.child_token();

    // Register before any inbound event can reference this client
    if events
        .send(HubEvent::Connect {
            client_id,
            peer: Some(peer),
            sender: msg_tx,
            shutdown: conn_token.clone(),
        })
        .await
        .is_err()
    {
        error!(%client_id, "failed to register client - hub closed");
        return Err(AppError::ChannelSend);
    }
    info!(%client_id, %peer, "connection registered");

    let reader = MessageReader::new(read_half, settings.max_message_bytes);
    let writer = MessageWriter::new(write_half);

    let read_task = tokio::spawn(read_loop(
        client_id,
        reader,
        events.clone(),
        conn_token.clone(),
        settings.read_timeout,
    ));
    let write_task = tokio::spawn(write_loop(
        client_id,
        writer,
        msg_rx,
        conn_token,
        settings.write_timeout,
    ));

    if let Err(e) = read_task.await {
        error!(%client_id, error = %e, "read task failed");
    }

    // Exactly one disconnect per client; during shutdown the hub is gone
    if !shutdown.is_cancelled() && events.send(HubEvent::Disconnect { client_id }).await.is_err() {
        debug!(%client_id, "hub closed before disconnect");
    }

    if let Err(e) = write_task.await {
        error!(%client_id, error = %e, "write task failed");
    }

    info!(%client_id, "connection closed");
    Ok(())
}

/// Forward decoded messages to the hub until the stream ends, the peer
/// stays idle past `read_timeout`, or the connection is cancelled
pub async fn read_loop<R>(
    client_id: ClientId,
    mut reader: MessageReader<R>,
    events: mpsc::Sender<HubEvent>,
    shutdown: CancellationToken,
    read_timeout: Option<Duration>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(%client_id, "read loop cancelled");
                break;
            }
            next = next_with_deadline(&mut reader, read_timeout) => next,
        };

        match next {
            Ok(Some(message)) => {
                if events
                    .send(HubEvent::Inbound { client_id, message })
                    .await
                    .is_err()
                {
                    debug!(%client_id, "hub closed, ending read loop");
                    break;
                }
            }
            Ok(None) => {
                debug!(%client_id, "peer closed the stream");
                break;
            }
            Err(e) => {
                warn!(%client_id, error = %e, "read failed");
                break;
            }
        }
    }
    debug!(%client_id, "read loop ended");
}

async fn next_with_deadline<R>(
    reader: &mut MessageReader<R>,
    read_timeout: Option<Duration>,
) -> Result<Option<WireMessage>, AppError>
where
    R: AsyncRead + Unpin,
{
    match read_timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.next_inbound()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::ReadTimeout),
        },
        None => reader.next_inbound().await,
    }
}

/// Drain the outbound queue onto the transport
///
/// Queued messages are flushed even after cancellation; a failed or slow
/// write cancels the connection so the reader stops too.
pub async fn write_loop<W>(
    client_id: ClientId,
    mut writer: MessageWriter<W>,
    mut queue: mpsc::Receiver<WireMessage>,
    shutdown: CancellationToken,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            msg = queue.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = shutdown.cancelled() => {
                // the hub may still be queueing a last notice before it drops the sender
                let drained = tokio::time::timeout(write_timeout, async {
                    while let Some(msg) = queue.recv().await {
                        if writer.send(&msg).await.is_err() {
                            break;
                        }
                    }
                })
                .await;
                if drained.is_err() {
                    debug!(%client_id, "gave up draining outbound queue");
                }
                break;
            }
        };

        let result = match tokio::time::timeout(write_timeout, writer.send(&msg)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::WriteTimeout),
        };
        if let Err(e) = result {
            warn!(%client_id, error = %e, "write failed");
            shutdown.cancel();
            break;
        }
    }

    if let Err(e) = writer.close().await {
        debug!(%client_id, error = %e, "close after write loop failed");
    }
    debug!(%client_id, "write loop ended");
}
