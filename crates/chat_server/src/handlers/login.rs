use log::{error, info, warn};

use crate::errors::ChatError;
use crate::message_models::{DisconnectMode, ServerEnvelope};
use crate::parsers::username_parser;
use crate::records::get_ban;
use crate::replies::SystemNotice;
use crate::router::ChatRouter;
use crate::types::{DisplayName, Identity};
use crate::user_state::{ConnectionHandle, ConnectionStatus};

fn reject(connection: &ConnectionHandle, notice: SystemNotice<'_>) -> ConnectionStatus {
    connection.send(ServerEnvelope::LoginRejected {
        reason: notice.format(),
    });
    connection.close(DisconnectMode::Graceful);
    ConnectionStatus::Leaving(DisconnectMode::Graceful)
}

/// Ban gate in front of the session. Every failure closes the connection
/// after the rejection is flushed.
pub async fn handle_login(
    identity: &str,
    username: &str,
    connection: &ConnectionHandle,
    router: &ChatRouter,
) -> Result<ConnectionStatus, ChatError> {
    let client_id = connection.client_id;
    let identity = identity.trim();
    if identity.is_empty() || username_parser(username).is_err() {
        warn!("[{client_id}] rejected login with username {username:?}");
        return Ok(reject(connection, SystemNotice::InvalidUsername));
    }
    let identity = Identity::from(identity);

    match get_ban(router.store().as_ref(), &identity).await {
        Ok(false) => {}
        Ok(true) => {
            info!("[{client_id}] {identity} is banned");
            return Ok(reject(connection, SystemNotice::Banned));
        }
        Err(e) => {
            error!("[{client_id}] ban lookup for {identity} failed: {e}");
            return Ok(reject(connection, SystemNotice::BanLookupFailed));
        }
    }

    match router
        .state()
        .authenticate(
            client_id,
            identity.clone(),
            DisplayName(username.to_owned()),
        )
        .await
    {
        Ok(()) => {}
        Err(ChatError::AlreadyLoggedIn(who)) => {
            info!("[{client_id}] {who} is already logged in");
            return Ok(reject(connection, SystemNotice::AlreadyLoggedIn));
        }
        Err(e) => return Err(e),
    }

    info!("[{client_id}] logged in as {username} ({identity})");
    connection.send(ServerEnvelope::LoginAccepted);
    Ok(ConnectionStatus::Active)
}
