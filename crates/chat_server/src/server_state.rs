use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet, mapref::entry::Entry};
use log::{debug, info};

use crate::errors::ChatError;
use crate::identity::IdentityProvider;
use crate::message_models::{ChatBroadcast, DisconnectMode};
use crate::types::{ClientId, DisplayName, Identity, SceneName};
use crate::user_state::ConnectionHandle;

/// Registry of live connections. Cloning shares the same registry.
#[derive(Clone, Debug, Default)]
pub struct ServerState {
    connections: Arc<DashMap<ClientId, ConnectionHandle>>,
    identities: Arc<DashMap<Identity, ClientId>>,
    // Lowercased display name.
    names: Arc<DashMap<String, ClientId>>,
    scenes: Arc<DashMap<SceneName, DashSet<ClientId>>>,
}

impl ServerState {
    pub fn new() -> Self {
        ServerState::default()
    }

    pub fn add_connection(&self, connection: &ConnectionHandle) -> ClientId {
        self.connections
            .insert(connection.client_id, connection.clone());
        connection.client_id
    }

    pub fn get(&self, client_id: ClientId) -> Option<ConnectionHandle> {
        self.connections.get(&client_id).map(|c| c.value().clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Binds an identity and display name to a connection. Both must be free.
    pub async fn authenticate(
        &self,
        client_id: ClientId,
        identity: Identity,
        display_name: DisplayName,
    ) -> Result<(), ChatError> {
        let connection = self
            .get(client_id)
            .ok_or(ChatError::UnknownConnection(client_id))?;

        match self.identities.entry(identity.clone()) {
            Entry::Occupied(_) => return Err(ChatError::AlreadyLoggedIn(identity.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(client_id);
            }
        }
        let name_key = display_name.0.to_lowercase();
        let name_taken = match self.names.entry(name_key) {
            Entry::Occupied(_) => true,
            Entry::Vacant(slot) => {
                slot.insert(client_id);
                false
            }
        };
        if name_taken {
            self.identities.remove(&identity);
            return Err(ChatError::AlreadyLoggedIn(display_name.to_string()));
        }

        let mut session = connection.session.write().await;
        session.identity = Some(identity);
        session.display_name = Some(display_name);
        Ok(())
    }

    /// Drops a connection and every index entry that points at it.
    pub async fn remove_connection(&self, client_id: ClientId) {
        let Some((_, connection)) = self.connections.remove(&client_id) else {
            return;
        };
        let session = connection.session.read().await;
        if let Some(identity) = &session.identity {
            self.identities.remove_if(identity, |_, id| *id == client_id);
        }
        if let Some(name) = &session.display_name {
            self.names
                .remove_if(&name.0.to_lowercase(), |_, id| *id == client_id);
        }
        for scene in &session.scenes {
            self.drop_scene_member(scene, client_id);
        }
        info!("[{client_id}] removed from server state");
    }

    pub async fn enter_scene(&self, client_id: ClientId, scene: SceneName) -> Result<(), ChatError> {
        let connection = self
            .get(client_id)
            .ok_or(ChatError::UnknownConnection(client_id))?;
        self.scenes
            .entry(scene.clone())
            .or_default()
            .insert(client_id);
        debug!("[{client_id}] entered scene {scene}");
        connection.session.write().await.scenes.insert(scene);
        Ok(())
    }

    pub async fn leave_scene(&self, client_id: ClientId, scene: &str) -> Result<(), ChatError> {
        let connection = self
            .get(client_id)
            .ok_or(ChatError::UnknownConnection(client_id))?;
        connection.session.write().await.scenes.remove(scene);
        self.drop_scene_member(scene, client_id);
        debug!("[{client_id}] left scene {scene}");
        Ok(())
    }

    fn drop_scene_member(&self, scene: &str, client_id: ClientId) {
        if let Some(members) = self.scenes.get(scene) {
            members.remove(&client_id);
        }
        self.scenes.remove_if(scene, |_, members| members.is_empty());
    }

    /// Everyone sharing at least one scene with `client_id`, the sender
    /// included, each listed once.
    pub async fn scene_peers(&self, client_id: ClientId) -> Vec<ConnectionHandle> {
        let Some(connection) = self.get(client_id) else {
            return Vec::new();
        };
        let scenes = connection.scenes().await;
        let mut peer_ids = HashSet::new();
        for scene in &scenes {
            if let Some(members) = self.scenes.get(scene) {
                peer_ids.extend(members.iter().map(|id| *id));
            }
        }
        peer_ids.insert(client_id);
        peer_ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn authenticated_clients(&self) -> Vec<ConnectionHandle> {
        let ids: Vec<ClientId> = self.identities.iter().map(|e| *e.value()).collect();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Queues the broadcast on each connection; returns how many accepted it.
    pub fn deliver(&self, recipients: &[ConnectionHandle], broadcast: &ChatBroadcast) -> usize {
        recipients
            .iter()
            .filter(|c| c.send_chat(broadcast.clone()))
            .count()
    }

    pub fn disconnect(&self, client_id: ClientId, mode: DisconnectMode) -> bool {
        match self.get(client_id) {
            Some(connection) => {
                info!("[{client_id}] disconnect requested ({mode:?})");
                connection.close(mode);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl IdentityProvider for ServerState {
    async fn identity(&self, client_id: ClientId) -> Option<Identity> {
        self.get(client_id)?.identity().await
    }

    async fn display_name(&self, client_id: ClientId) -> Option<DisplayName> {
        self.get(client_id)?.display_name().await
    }

    async fn connection_by_identity(&self, identity: &Identity) -> Option<ClientId> {
        self.identities.get(identity).map(|id| *id)
    }

    async fn connection_by_name(&self, name: &str) -> Option<ClientId> {
        self.names.get(&name.to_lowercase()).map(|id| *id)
    }
}

#[cfg(test)]
pub(crate) async fn logged_in(
    state: &ServerState,
    identity: &str,
    name: &str,
) -> (ConnectionHandle, tokio::sync::mpsc::Receiver<crate::message_models::ServerEnvelope>) {
    let (connection, rx) = crate::user_state::test_connection(16);
    state.add_connection(&connection);
    state
        .authenticate(
            connection.client_id,
            Identity::from(identity),
            DisplayName(name.to_owned()),
        )
        .await
        .unwrap();
    (connection, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_state::test_connection;

    #[tokio::test]
    async fn one_connection_per_identity_and_name() {
        let state = ServerState::new();
        let (alice, _rx) = logged_in(&state, "id-alice", "Alice").await;

        let (second, _rx2) = test_connection(4);
        state.add_connection(&second);
        let err = state
            .authenticate(
                second.client_id,
                Identity::from("id-alice"),
                DisplayName("Other".to_owned()),
            )
            .await;
        assert!(matches!(err, Err(ChatError::AlreadyLoggedIn(_))));

        let err = state
            .authenticate(
                second.client_id,
                Identity::from("id-other"),
                DisplayName("ALICE".to_owned()),
            )
            .await;
        assert!(matches!(err, Err(ChatError::AlreadyLoggedIn(_))));
        // The rejected identity was rolled back.
        assert_eq!(
            state.connection_by_identity(&Identity::from("id-other")).await,
            None
        );

        assert_eq!(
            state.connection_by_name("aLiCe").await,
            Some(alice.client_id)
        );
        assert_eq!(state.authenticated_clients().len(), 1);
    }

    #[tokio::test]
    async fn removal_clears_every_index() {
        let state = ServerState::new();
        let (alice, _rx) = logged_in(&state, "id-alice", "Alice").await;
        state
            .enter_scene(alice.client_id, "forest".to_owned())
            .await
            .unwrap();

        state.remove_connection(alice.client_id).await;
        assert_eq!(state.connection_count(), 0);
        assert_eq!(state.connection_by_name("alice").await, None);
        assert_eq!(
            state.connection_by_identity(&Identity::from("id-alice")).await,
            None
        );
        assert!(state.scenes.is_empty());
    }

    #[tokio::test]
    async fn scene_peers_are_deduplicated_and_include_sender() {
        let state = ServerState::new();
        let (alice, _a) = logged_in(&state, "a", "Alice").await;
        let (bob, _b) = logged_in(&state, "b", "Bob").await;
        let (carol, _c) = logged_in(&state, "c", "Carol").await;

        for scene in ["town", "tavern"] {
            state
                .enter_scene(alice.client_id, scene.to_owned())
                .await
                .unwrap();
            state
                .enter_scene(bob.client_id, scene.to_owned())
                .await
                .unwrap();
        }
        state
            .enter_scene(carol.client_id, "dungeon".to_owned())
            .await
            .unwrap();

        let mut peers: Vec<ClientId> = state
            .scene_peers(alice.client_id)
            .await
            .iter()
            .map(|c| c.client_id)
            .collect();
        peers.sort();
        let mut expected = vec![alice.client_id, bob.client_id];
        expected.sort();
        assert_eq!(peers, expected);

        state.leave_scene(bob.client_id, "town").await.unwrap();
        state.leave_scene(bob.client_id, "tavern").await.unwrap();
        let peers = state.scene_peers(alice.client_id).await;
        assert_eq!(peers.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_closes_the_handle() {
        let state = ServerState::new();
        let (alice, _rx) = logged_in(&state, "a", "Alice").await;
        assert!(state.disconnect(alice.client_id, DisconnectMode::Graceful));
        assert!(!alice.is_open());
        assert!(!state.disconnect(9_999_999, DisconnectMode::Immediate));
    }
}
