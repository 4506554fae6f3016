use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};

use crate::channels::ChatChannel;
use crate::identity::IdentityProvider;
use crate::profile_store::ProfileStore;
use crate::records::{block_list_contains, get_block_list, get_mute};
use crate::types::Identity;

#[async_trait]
pub trait ChannelMuteChecker: Send + Sync {
    async fn is_muted(&self, identity: &Identity, channel: ChatChannel) -> bool;
}

#[async_trait]
pub trait WhisperMuteChecker: Send + Sync {
    /// Whether `receiver` has blocked `sender`.
    async fn is_muted(&self, sender: &Identity, receiver: &Identity) -> bool;
}

/// Reads the Mute record. A failed lookup counts as muted.
pub struct ProfileMuteChecker {
    store: Arc<dyn ProfileStore>,
}

impl ProfileMuteChecker {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        ProfileMuteChecker { store }
    }
}

#[async_trait]
impl ChannelMuteChecker for ProfileMuteChecker {
    async fn is_muted(&self, identity: &Identity, channel: ChatChannel) -> bool {
        match get_mute(self.store.as_ref(), identity).await {
            Ok(flags) => flags.intersects(channel),
            Err(e) => {
                error!("mute lookup for {identity} failed: {e}");
                true
            }
        }
    }
}

/// Looks the sender's display name up in the receiver's block list. Anything
/// that cannot be resolved counts as blocked.
pub struct ProfileWhisperMuteChecker {
    store: Arc<dyn ProfileStore>,
    identities: Arc<dyn IdentityProvider>,
}

impl ProfileWhisperMuteChecker {
    pub fn new(store: Arc<dyn ProfileStore>, identities: Arc<dyn IdentityProvider>) -> Self {
        ProfileWhisperMuteChecker { store, identities }
    }
}

#[async_trait]
impl WhisperMuteChecker for ProfileWhisperMuteChecker {
    async fn is_muted(&self, sender: &Identity, receiver: &Identity) -> bool {
        let sender_name = match self.identities.connection_by_identity(sender).await {
            Some(client_id) => self.identities.display_name(client_id).await,
            None => None,
        };
        let Some(sender_name) = sender_name else {
            warn!("cannot resolve a display name for {sender}");
            return true;
        };

        match get_block_list(self.store.as_ref(), receiver).await {
            Ok(blocked) => block_list_contains(&blocked, &sender_name.0),
            Err(e) => {
                error!("block list lookup for {receiver} failed: {e}");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile_store::{MemoryProfileStore, test_support::UnavailableStore};
    use crate::records::{set_block_list, set_mute};
    use crate::server_state::{ServerState, logged_in};

    #[tokio::test]
    async fn channel_mute_reads_flags() {
        let store = Arc::new(MemoryProfileStore::new());
        let bob = Identity::from("bob");
        set_mute(store.as_ref(), &bob, ChatChannel::GLOBAL)
            .await
            .unwrap();

        let checker = ProfileMuteChecker::new(store);
        assert!(checker.is_muted(&bob, ChatChannel::GLOBAL).await);
        assert!(!checker.is_muted(&bob, ChatChannel::LOCAL).await);
        assert!(!checker.is_muted(&Identity::from("alice"), ChatChannel::GLOBAL).await);
    }

    #[tokio::test]
    async fn mute_all_covers_every_channel() {
        let store = Arc::new(MemoryProfileStore::new());
        let bob = Identity::from("bob");
        set_mute(store.as_ref(), &bob, ChatChannel::all())
            .await
            .unwrap();
        let checker = ProfileMuteChecker::new(store);
        assert!(checker.is_muted(&bob, ChatChannel::WHISPER).await);
    }

    #[tokio::test]
    async fn checkers_fail_closed() {
        let state = ServerState::new();
        let (_alice, _a) = logged_in(&state, "alice", "Alice").await;
        let (_bob, _b) = logged_in(&state, "bob", "Bob").await;

        let channel = ProfileMuteChecker::new(Arc::new(UnavailableStore));
        assert!(channel.is_muted(&Identity::from("bob"), ChatChannel::LOCAL).await);

        let whisper =
            ProfileWhisperMuteChecker::new(Arc::new(UnavailableStore), Arc::new(state.clone()));
        assert!(
            whisper
                .is_muted(&Identity::from("alice"), &Identity::from("bob"))
                .await
        );

        let whisper =
            ProfileWhisperMuteChecker::new(Arc::new(MemoryProfileStore::new()), Arc::new(state));
        assert!(
            whisper
                .is_muted(&Identity::from("ghost"), &Identity::from("bob"))
                .await,
            "unknown sender"
        );
    }

    #[tokio::test]
    async fn whisper_block_list_uses_display_names() {
        let state = ServerState::new();
        let (_carol, _c) = logged_in(&state, "id-carol", "Carol").await;
        let (_dave, _d) = logged_in(&state, "id-dave", "Dave").await;
        let store = Arc::new(MemoryProfileStore::new());
        set_block_list(store.as_ref(), &Identity::from("id-bob"), &["carol".to_owned()])
            .await
            .unwrap();

        let whisper = ProfileWhisperMuteChecker::new(store, Arc::new(state));
        let bob = Identity::from("id-bob");
        assert!(whisper.is_muted(&Identity::from("id-carol"), &bob).await);
        assert!(!whisper.is_muted(&Identity::from("id-dave"), &bob).await);
    }
}
