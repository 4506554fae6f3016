use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use super::request::handle_request;
use crate::constants::MAX_LINE_BYTES;
use crate::errors::ChatError;
use crate::message_models::{DisconnectMode, ServerEnvelope};
use crate::router::ChatRouter;
use crate::types::ClientId;
use crate::user_state::{ConnectionHandle, ConnectionStatus};

/// Entry point for a new client connection. Returns once both tasks are done
/// and the connection is gone from the server state.
pub async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    router: Arc<ChatRouter>,
    outbound_queue: usize,
) {
    let (tx_outbound, rx_outbound) = mpsc::channel::<ServerEnvelope>(outbound_queue.max(1));
    let connection = ConnectionHandle::new(addr, tx_outbound);
    let client_id = router.state().add_connection(&connection);
    info!("[{client_id}] client connected: {addr}");

    let (read_half, write_half) = io::split(socket);

    let writer = tokio::spawn(client_writer_task(
        write_half,
        client_id,
        rx_outbound,
        connection.subscribe_close(),
    ));

    client_reader_task(read_half, connection.clone(), router.clone()).await;
    connection.close(DisconnectMode::Graceful);

    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("[{client_id}] writer stopped: {e}"),
        Err(e) => error!("[{client_id}] writer task panicked: {e}"),
    }
    router.state().remove_connection(client_id).await;
    info!("[{client_id}] client disconnected: {addr}");
}

async fn client_reader_task(
    reader: ReadHalf<TcpStream>,
    connection: ConnectionHandle,
    router: Arc<ChatRouter>,
) {
    let client_id = connection.client_id;
    let mut closed = connection.subscribe_close();
    let mut buffered_reader = tokio::io::BufReader::new(reader);
    let mut line = String::new();
    let mut status = ConnectionStatus::Handshaking;

    loop {
        line.clear();
        let mut limited = (&mut buffered_reader).take(MAX_LINE_BYTES);
        let read = tokio::select! {
            read = limited.read_line(&mut line) => read,
            _ = closed.changed() => {
                debug!("[{client_id}] reader stopping, connection closed");
                break;
            }
        };

        match read {
            Ok(0) => {
                info!("[{client_id}] peer closed the connection");
                break;
            }
            Ok(n) if n as u64 >= MAX_LINE_BYTES && !line.ends_with('\n') => {
                warn!("[{client_id}] line longer than {MAX_LINE_BYTES} bytes");
                connection.close(DisconnectMode::Immediate);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("[{client_id}] read failed: {e}");
                connection.close(DisconnectMode::Immediate);
                break;
            }
        }

        let request = line.trim();
        if request.is_empty() {
            continue;
        }

        status = match handle_request(request, &status, &connection, &router).await {
            Ok(next) => next,
            Err(ChatError::ProtocolViolation(_)) => break,
            Err(e) => {
                error!("[{client_id}] request failed: {e}");
                status
            }
        };
        if let ConnectionStatus::Leaving(mode) = status {
            debug!("[{client_id}] leaving ({mode:?})");
            break;
        }
    }
}

async fn write_envelope(
    writer: &mut WriteHalf<TcpStream>,
    envelope: &ServerEnvelope,
) -> Result<(), std::io::Error> {
    let line = envelope.to_line().map_err(std::io::Error::other)?;
    writer.write_all(line.as_bytes()).await
}

async fn client_writer_task(
    mut writer: WriteHalf<TcpStream>,
    client_id: ClientId,
    mut rx_outbound: mpsc::Receiver<ServerEnvelope>,
    mut closed: watch::Receiver<Option<DisconnectMode>>,
) -> Result<(), std::io::Error> {
    loop {
        tokio::select! {
            biased;

            changed = closed.changed() => {
                let mode = *closed.borrow_and_update();
                match (changed, mode) {
                    (_, Some(DisconnectMode::Immediate)) | (Err(_), _) => break,
                    (_, Some(DisconnectMode::Graceful)) => {
                        // Flush what was queued before the close, e.g. a ban notice.
                        while let Ok(envelope) = rx_outbound.try_recv() {
                            write_envelope(&mut writer, &envelope).await?;
                        }
                        break;
                    }
                    (Ok(()), None) => {}
                }
            }

            maybe = rx_outbound.recv() => {
                let Some(envelope) = maybe else { break };
                if let Err(e) = write_envelope(&mut writer, &envelope).await {
                    error!("[{client_id}] failed to write message: {e}");
                    return Err(e);
                }
            }
        }
    }

    writer.flush().await?;
    writer.shutdown().await
}
