use log::{debug, warn};

use super::login::handle_login;
use crate::errors::ChatError;
use crate::message_models::{ClientEnvelope, DisconnectMode};
use crate::router::ChatRouter;
use crate::user_state::{ConnectionHandle, ConnectionStatus};

fn violation(connection: &ConnectionHandle, reason: &str) -> ChatError {
    warn!(
        "[{}] protocol violation from {}: {reason}",
        connection.client_id, connection.addr
    );
    connection.close(DisconnectMode::Immediate);
    ChatError::ProtocolViolation(reason.to_owned())
}

/// Handles one inbound line and returns the connection's next status.
pub async fn handle_request(
    line: &str,
    status: &ConnectionStatus,
    connection: &ConnectionHandle,
    router: &ChatRouter,
) -> Result<ConnectionStatus, ChatError> {
    let client_id = connection.client_id;
    let envelope: ClientEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => return Err(violation(connection, &format!("malformed envelope: {e}"))),
    };

    match (status, envelope) {
        (ConnectionStatus::Leaving(mode), _) => {
            debug!("[{client_id}] ignoring input while leaving");
            Ok(ConnectionStatus::Leaving(*mode))
        }
        (ConnectionStatus::Handshaking, ClientEnvelope::Login { identity, username }) => {
            handle_login(&identity, &username, connection, router).await
        }
        (ConnectionStatus::Handshaking, _) => Err(violation(connection, "message before login")),
        (ConnectionStatus::Active, ClientEnvelope::Login { .. }) => {
            Err(violation(connection, "second login"))
        }
        (ConnectionStatus::Active, ClientEnvelope::Chat(chat)) => {
            let outcome = router.handle_chat(client_id, chat).await?;
            debug!("[{client_id}] chat: {outcome:?}");
            Ok(ConnectionStatus::Active)
        }
        (ConnectionStatus::Active, ClientEnvelope::Whisper(whisper)) => {
            let outcome = router.handle_whisper(client_id, whisper).await?;
            debug!("[{client_id}] whisper: {outcome:?}");
            Ok(ConnectionStatus::Active)
        }
        (ConnectionStatus::Active, ClientEnvelope::EnterScene { scene }) => {
            let scene = scene.trim();
            if scene.is_empty() {
                return Err(violation(connection, "empty scene name"));
            }
            router
                .state()
                .enter_scene(client_id, scene.to_owned())
                .await?;
            Ok(ConnectionStatus::Active)
        }
        (ConnectionStatus::Active, ClientEnvelope::LeaveScene { scene }) => {
            router.state().leave_scene(client_id, scene.trim()).await?;
            Ok(ConnectionStatus::Active)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::message_models::ServerEnvelope;
    use crate::profile_store::MemoryProfileStore;
    use crate::server_state::ServerState;
    use crate::user_state::test_connection;

    fn router(state: &ServerState) -> ChatRouter {
        ChatRouter::builder(state.clone(), Arc::new(MemoryProfileStore::new())).build()
    }

    #[tokio::test]
    async fn garbage_line_disconnects() {
        let state = ServerState::new();
        let router = router(&state);
        let (conn, _rx) = test_connection(4);
        state.add_connection(&conn);

        let result = handle_request("{not json", &ConnectionStatus::Handshaking, &conn, &router).await;
        assert!(matches!(result, Err(ChatError::ProtocolViolation(_))));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn chat_before_login_disconnects() {
        let state = ServerState::new();
        let router = router(&state);
        let (conn, _rx) = test_connection(4);
        state.add_connection(&conn);

        let line = r#"{"type":"Chat","Text":"hi","Channel":2}"#;
        let result = handle_request(line, &ConnectionStatus::Handshaking, &conn, &router).await;
        assert!(matches!(result, Err(ChatError::ProtocolViolation(_))));
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn login_scene_and_chat() {
        let state = ServerState::new();
        let router = router(&state);
        let (conn, mut rx) = test_connection(8);
        state.add_connection(&conn);

        let mut status = ConnectionStatus::Handshaking;
        for line in [
            r#"{"type":"Login","identity":"id-alice","username":"Alice"}"#,
            r#"{"type":"EnterScene","scene":"town"}"#,
            r#"{"type":"Chat","Text":"hi all","Channel":1}"#,
        ] {
            status = handle_request(line, &status, &conn, &router).await.unwrap();
        }
        assert_eq!(status, ConnectionStatus::Active);
        assert_eq!(rx.try_recv().unwrap(), ServerEnvelope::LoginAccepted);
        let Ok(ServerEnvelope::Chat(echo)) = rx.try_recv() else {
            panic!("expected the local echo");
        };
        assert_eq!(echo.text, "Alice: hi all");

        let second_login = r#"{"type":"Login","identity":"id-alice","username":"Alice"}"#;
        let result = handle_request(second_login, &status, &conn, &router).await;
        assert!(matches!(result, Err(ChatError::ProtocolViolation(_))));
    }
}
