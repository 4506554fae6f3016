use chat_server::message_models::{ClientEnvelope, ServerEnvelope};
use chat_server::types::Identity;
use log::{debug, error, info, warn};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::errors::ClientError;

const CLIENT_QUEUE_SIZE: usize = 32;

/// A logged-in connection: envelopes written to `outbound` go to the server,
/// everything the server sends after the login reply arrives on `inbound`.
pub struct ServerConnection {
    pub outbound: mpsc::Sender<ClientEnvelope>,
    pub inbound: mpsc::Receiver<ServerEnvelope>,
}

fn to_line(envelope: &ClientEnvelope) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(envelope)?;
    line.push('\n');
    Ok(line)
}

/// Connects, logs in and waits for the server's answer.
pub async fn connect(
    addr: &str,
    identity: &Identity,
    username: &str,
) -> Result<ServerConnection, ClientError> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = io::split(stream);
    let mut lines = BufReader::new(read_half).lines();

    let login = ClientEnvelope::Login {
        identity: identity.to_string(),
        username: username.to_owned(),
    };
    write_half.write_all(to_line(&login)?.as_bytes()).await?;

    let Some(reply) = lines.next_line().await? else {
        return Err(ClientError::Disconnected);
    };
    match serde_json::from_str::<ServerEnvelope>(&reply)? {
        ServerEnvelope::LoginAccepted => info!("logged in to {addr} as {username}"),
        ServerEnvelope::LoginRejected { reason } => return Err(ClientError::LoginRejected(reason)),
        other => {
            warn!("unexpected reply to login: {other:?}");
            return Err(ClientError::Disconnected);
        }
    }

    let (tx_outbound, rx_outbound) = mpsc::channel(CLIENT_QUEUE_SIZE);
    let (tx_inbound, rx_inbound) = mpsc::channel(CLIENT_QUEUE_SIZE);
    tokio::spawn(server_writer_task(write_half, rx_outbound));
    tokio::spawn(server_reader_task(lines, tx_inbound));

    Ok(ServerConnection {
        outbound: tx_outbound,
        inbound: rx_inbound,
    })
}

async fn server_writer_task(
    mut writer: WriteHalf<TcpStream>,
    mut rx_outbound: mpsc::Receiver<ClientEnvelope>,
) {
    while let Some(envelope) = rx_outbound.recv().await {
        let line = match to_line(&envelope) {
            Ok(line) => line,
            Err(e) => {
                error!("cannot encode {envelope:?}: {e}");
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!("failed to write to server: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

async fn server_reader_task(
    mut lines: Lines<BufReader<ReadHalf<TcpStream>>>,
    tx_inbound: mpsc::Sender<ServerEnvelope>,
) {
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("server closed the connection");
                break;
            }
            Err(e) => {
                warn!("read from server failed: {e}");
                break;
            }
        };
        match serde_json::from_str::<ServerEnvelope>(&line) {
            Ok(envelope) => {
                if tx_inbound.send(envelope).await.is_err() {
                    debug!("inbound receiver dropped");
                    break;
                }
            }
            Err(e) => warn!("ignoring malformed line from server: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chat_server::channels::ChatChannel;
    use chat_server::handlers::client::handle_client;
    use chat_server::message_models::ChatBroadcast;
    use chat_server::profile_store::MemoryProfileStore;
    use chat_server::records::set_ban;
    use chat_server::router::ChatRouter;
    use chat_server::server_state::ServerState;
    use chrono::{TimeDelta, Utc};
    use tokio::net::TcpListener;

    use super::*;

    async fn spawn_server(store: MemoryProfileStore) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let router = Arc::new(ChatRouter::builder(ServerState::new(), Arc::new(store)).build());
        tokio::spawn(async move {
            while let Ok((socket, peer)) = listener.accept().await {
                tokio::spawn(handle_client(socket, peer, router.clone(), 32));
            }
        });
        addr
    }

    #[tokio::test]
    async fn local_chat_round_trip() {
        let addr = spawn_server(MemoryProfileStore::new()).await;
        let mut conn = connect(&addr, &Identity::from("id-alice"), "Alice")
            .await
            .unwrap();

        conn.outbound
            .send(ClientEnvelope::EnterScene {
                scene: "town".to_owned(),
            })
            .await
            .unwrap();
        conn.outbound
            .send(ClientEnvelope::Chat(ChatBroadcast::new(
                "hello",
                ChatChannel::LOCAL,
            )))
            .await
            .unwrap();

        let Some(ServerEnvelope::Chat(echo)) = conn.inbound.recv().await else {
            panic!("expected the local echo");
        };
        assert_eq!(echo.text, "Alice: hello");
        assert_eq!(echo.channel, ChatChannel::LOCAL);
    }

    #[tokio::test]
    async fn banned_login_is_rejected() {
        let store = MemoryProfileStore::new();
        let until = Utc::now() + TimeDelta::days(1);
        set_ban(&store, &Identity::from("id-bob"), until).await.unwrap();
        let addr = spawn_server(store).await;

        let result = connect(&addr, &Identity::from("id-bob"), "Bob").await;
        assert!(matches!(result, Err(ClientError::LoginRejected(reason)) if reason == "You are banned."));
    }
}
