use core::net::SocketAddr;
use std::collections::HashSet;
use std::sync::Arc;

use log::warn;
use tokio::sync::mpsc::{Sender, error::TrySendError};
use tokio::sync::{RwLock, watch};

use crate::message_models::{ChatBroadcast, DisconnectMode, ServerEnvelope};
use crate::replies::SystemNotice;
use crate::types::{ClientId, DisplayName, Identity, SceneName, get_next_client_id};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    /// Connected, but hasn't sent Login yet.
    Handshaking,
    /// Logged in. Chat and whispers are accepted.
    Active,
    /// The connection is closing.
    Leaving(DisconnectMode),
}

#[derive(Debug, Default)]
pub struct Session {
    pub identity: Option<Identity>,
    pub display_name: Option<DisplayName>,
    pub scenes: HashSet<SceneName>,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub client_id: ClientId,
    pub addr: SocketAddr,
    pub session: Arc<RwLock<Session>>,
    pub tx_outbound: Sender<ServerEnvelope>,
    tx_close: Arc<watch::Sender<Option<DisconnectMode>>>,
}

impl ConnectionHandle {
    pub fn new(addr: SocketAddr, tx_outbound: Sender<ServerEnvelope>) -> Self {
        let (tx_close, _) = watch::channel(None);
        ConnectionHandle {
            client_id: get_next_client_id(),
            addr,
            session: Arc::new(RwLock::new(Session::default())),
            tx_outbound,
            tx_close: Arc::new(tx_close),
        }
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.session.read().await.identity.clone()
    }

    pub async fn display_name(&self) -> Option<DisplayName> {
        self.session.read().await.display_name.clone()
    }

    pub async fn scenes(&self) -> HashSet<SceneName> {
        self.session.read().await.scenes.clone()
    }

    /// Queues an envelope without waiting. A full or closed queue drops it.
    pub fn send(&self, envelope: ServerEnvelope) -> bool {
        if !self.is_open() {
            return false;
        }
        match self.tx_outbound.try_send(envelope) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("[{}] outbound queue full, dropping message", self.client_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn send_chat(&self, broadcast: ChatBroadcast) -> bool {
        self.send(ServerEnvelope::Chat(broadcast))
    }

    pub fn notify(&self, notice: SystemNotice<'_>) -> bool {
        self.send_chat(notice.to_broadcast())
    }

    /// Asks the connection's tasks to stop. An immediate request is never
    /// downgraded to a graceful one.
    pub fn close(&self, mode: DisconnectMode) {
        self.tx_close.send_if_modified(|current| match (*current, mode) {
            (Some(DisconnectMode::Immediate), _) => false,
            (Some(DisconnectMode::Graceful), DisconnectMode::Graceful) => false,
            _ => {
                *current = Some(mode);
                true
            }
        });
    }

    pub fn subscribe_close(&self) -> watch::Receiver<Option<DisconnectMode>> {
        self.tx_close.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.tx_close.borrow().is_none()
    }
}

#[cfg(test)]
pub(crate) fn test_connection(capacity: usize) -> (ConnectionHandle, tokio::sync::mpsc::Receiver<ServerEnvelope>) {
    let (tx, rx) = tokio::sync::mpsc::channel(capacity);
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    (ConnectionHandle::new(addr, tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let (a, _rx_a) = test_connection(1);
        let (b, _rx_b) = test_connection(1);
        assert_ne!(a.client_id, b.client_id);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (conn, mut rx) = test_connection(1);
        assert!(conn.send_chat(ChatBroadcast::system("one")));
        assert!(!conn.send_chat(ChatBroadcast::system("two")));

        let Some(ServerEnvelope::Chat(first)) = rx.recv().await else {
            panic!("expected a chat envelope");
        };
        assert_eq!(first.text, "one");
    }

    #[tokio::test]
    async fn close_never_downgrades() {
        let (conn, _rx) = test_connection(4);
        let mut closed = conn.subscribe_close();
        assert!(conn.is_open());

        conn.close(DisconnectMode::Immediate);
        conn.close(DisconnectMode::Graceful);
        assert!(!conn.is_open());
        assert_eq!(*closed.borrow_and_update(), Some(DisconnectMode::Immediate));
        assert!(!conn.send_chat(ChatBroadcast::system("late")));
    }

    #[tokio::test]
    async fn graceful_upgrades_to_immediate() {
        let (conn, _rx) = test_connection(4);
        conn.close(DisconnectMode::Graceful);
        conn.close(DisconnectMode::Immediate);
        assert_eq!(*conn.subscribe_close().borrow(), Some(DisconnectMode::Immediate));
    }
}
