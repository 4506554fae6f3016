use std::sync::Arc;

use chat_server::channels::ChatChannel;
use chat_server::constants::MESSAGE_MAX_CHARS;
use chat_server::message_models::{ChatBroadcast, ClientEnvelope, ServerEnvelope, WhisperBroadcast};
use chat_server::profile_store::ProfileStore;
use chat_server::records::{block_list_contains, get_block_list};
use chat_server::replies::SystemNotice;
use chat_server::sanitize::clamp_length;
use chat_server::types::{DisplayName, Identity};
use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::commands::{ClientCommandDispatcher, ClientContext};
use crate::directory::AccountDirectory;
use crate::errors::ClientError;
use crate::history::ChatHistory;
use crate::message::ChatMessage;
use crate::tabs::TabSet;

pub const MAX_CHAT_MESSAGES: usize = 200;
pub const MAX_SENT_MESSAGES: usize = 200;

/// Client side of a chat session: local history, tab filtering, the local
/// block list and outgoing chat.
///
/// Lines that should appear on screen are queued and collected with
/// [`ChatClient::take_rendered`].
pub struct ChatClient {
    identity: Identity,
    display_name: DisplayName,
    store: Arc<dyn ProfileStore>,
    directory: Arc<dyn AccountDirectory>,
    outbound: mpsc::Sender<ClientEnvelope>,
    commands: ClientCommandDispatcher,
    history: ChatHistory<ChatMessage>,
    sent: ChatHistory<String>,
    recall_index: usize,
    tabs: TabSet,
    show_timestamps: bool,
    last_whisper_name: Option<String>,
    rendered: Vec<String>,
}

impl ChatClient {
    pub fn new(
        identity: Identity,
        display_name: DisplayName,
        store: Arc<dyn ProfileStore>,
        directory: Arc<dyn AccountDirectory>,
        outbound: mpsc::Sender<ClientEnvelope>,
    ) -> Self {
        ChatClient {
            identity,
            display_name,
            store,
            directory,
            outbound,
            commands: ClientCommandDispatcher::default(),
            history: ChatHistory::new(MAX_CHAT_MESSAGES),
            sent: ChatHistory::new(MAX_SENT_MESSAGES),
            recall_index: 0,
            tabs: TabSet::default(),
            show_timestamps: false,
            last_whisper_name: None,
            rendered: Vec::new(),
        }
    }

    pub fn with_tabs(mut self, tabs: TabSet) -> Self {
        self.tabs = tabs;
        self
    }

    pub fn history(&self) -> &ChatHistory<ChatMessage> {
        &self.history
    }

    pub fn tabs(&self) -> &TabSet {
        &self.tabs
    }

    pub fn last_whisper_name(&self) -> Option<&str> {
        self.last_whisper_name.as_deref()
    }

    pub fn set_show_timestamps(&mut self, show: bool) {
        self.show_timestamps = show;
    }

    /// Drains the lines queued for display.
    pub fn take_rendered(&mut self) -> Vec<String> {
        std::mem::take(&mut self.rendered)
    }

    /// Blocked senders are checked against this client's own list. A failed
    /// lookup hides the message. System notices are never filtered.
    async fn is_hidden(&self, message: &ChatMessage) -> bool {
        if message.channel() == ChatChannel::SYSTEM || message.sender_display_name().is_empty() {
            return false;
        }
        match get_block_list(self.store.as_ref(), &self.identity).await {
            Ok(names) => block_list_contains(&names, message.sender_display_name()),
            Err(e) => {
                error!("block list lookup failed: {e}");
                true
            }
        }
    }

    /// Stores a received broadcast and queues it for display when it passes
    /// the block list and the active tab. Returns whether it was queued.
    pub async fn receive(&mut self, broadcast: ChatBroadcast) -> bool {
        let message = ChatMessage::received_now(broadcast);
        self.history.push(message.clone());

        if self.is_hidden(&message).await {
            debug!("hiding message from {}", message.sender_display_name());
            return false;
        }
        if !self.tabs.active().shows(message.channel()) {
            return false;
        }
        self.rendered.push(message.display_line(self.show_timestamps));
        true
    }

    /// Routes one server envelope. Chat lines go through [`ChatClient::receive`].
    pub async fn handle_server(&mut self, envelope: ServerEnvelope) -> Result<(), ClientError> {
        match envelope {
            ServerEnvelope::Chat(broadcast) => {
                self.receive(broadcast).await;
                Ok(())
            }
            ServerEnvelope::LoginAccepted => Ok(()),
            ServerEnvelope::LoginRejected { reason } => Err(ClientError::LoginRejected(reason)),
        }
    }

    async fn feedback(&mut self, text: String) {
        self.receive(ChatBroadcast::system(text)).await;
    }

    /// History filtered by the active tab and the block list.
    pub async fn visible_messages(&self) -> Vec<&ChatMessage> {
        let blocked = match get_block_list(self.store.as_ref(), &self.identity).await {
            Ok(names) => Some(names),
            Err(e) => {
                error!("block list lookup failed: {e}");
                None
            }
        };
        let tab = self.tabs.active();
        self.history
            .iter()
            .filter(|message| tab.shows(message.channel()))
            .filter(|message| {
                if message.channel() == ChatChannel::SYSTEM || message.sender_display_name().is_empty() {
                    return true;
                }
                match &blocked {
                    Some(names) => !block_list_contains(names, message.sender_display_name()),
                    None => false,
                }
            })
            .collect()
    }

    /// Switches tab and rebuilds the pane from history.
    pub async fn select_tab(&mut self, name: &str) -> Option<String> {
        if !self.tabs.select(name) {
            return None;
        }
        Some(self.redisplay().await)
    }

    pub async fn redisplay(&self) -> String {
        self.visible_messages()
            .await
            .iter()
            .map(|message| message.display_line(self.show_timestamps))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn remember_sent(&mut self, text: &str) {
        self.sent.push(text.to_owned());
        self.recall_index = self.sent.len();
    }

    /// Older sent line, for the up-arrow.
    pub fn recall_previous(&mut self) -> Option<&str> {
        if self.sent.is_empty() {
            return None;
        }
        self.recall_index = self.recall_index.saturating_sub(1);
        self.sent.get(self.recall_index).map(String::as_str)
    }

    /// Newer sent line. `None` past the newest, meaning an empty input.
    pub fn recall_next(&mut self) -> Option<&str> {
        if self.recall_index >= self.sent.len() {
            return None;
        }
        self.recall_index += 1;
        self.sent.get(self.recall_index).map(String::as_str)
    }

    async fn send(&self, envelope: ClientEnvelope) -> Result<(), ClientError> {
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    /// Outgoing input. Commands are handled first, on any channel. Whisper
    /// input goes to the last whispered player.
    pub async fn submit(&mut self, channel: ChatChannel, input: &str) -> Result<(), ClientError> {
        let text = clamp_length(input.trim(), MESSAGE_MAX_CHARS).to_owned();
        if text.is_empty() {
            return Ok(());
        }
        self.remember_sent(&text);

        let ctx = ClientContext {
            identity: &self.identity,
            display_name: &self.display_name,
            store: self.store.as_ref(),
            directory: self.directory.as_ref(),
            outbound: &self.outbound,
        };
        match self.commands.dispatch(&text, &ctx).await {
            None => {}
            Some(Ok(None)) => return Ok(()),
            Some(Ok(Some(feedback))) => {
                self.feedback(feedback).await;
                return Ok(());
            }
            Some(Err(ClientError::ProfileStore(e))) => {
                let report = e.to_string();
                self.feedback(SystemNotice::StoreFailure { report: &report }.format())
                    .await;
                return Ok(());
            }
            Some(Err(e)) => return Err(e),
        }

        if channel == ChatChannel::WHISPER {
            let Some(name) = self.last_whisper_name.clone() else {
                warn!("whisper without a target");
                return Ok(());
            };
            return self.whisper(&name, &text).await;
        }
        if !channel.is_single() {
            warn!("refusing to send on channel {channel}");
            return Ok(());
        }
        self.send(ClientEnvelope::Chat(ChatBroadcast::new(text, channel)))
            .await
    }

    /// Checks the player exists, echoes `To {name}: {text}` locally and sends
    /// the whisper.
    pub async fn whisper(&mut self, name: &str, input: &str) -> Result<(), ClientError> {
        let text = clamp_length(input.trim(), MESSAGE_MAX_CHARS).to_owned();
        if text.is_empty() {
            return Ok(());
        }
        match self.directory.lookup(name).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.feedback(format!("{name} does not exist.")).await;
                return Ok(());
            }
            Err(e) => {
                let report = e.to_string();
                self.feedback(SystemNotice::StoreFailure { report: &report }.format())
                    .await;
                return Ok(());
            }
        }

        self.last_whisper_name = Some(name.to_owned());
        self.send(ClientEnvelope::Whisper(WhisperBroadcast {
            player_name: name.to_owned(),
            text: text.clone(),
        }))
        .await?;
        self.receive(ChatBroadcast::new(
            format!("To {name}: {text}"),
            ChatChannel::WHISPER,
        ))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chat_server::errors::ProfileError;
    use chat_server::profile_store::{MemoryProfileStore, RecordKey};
    use chat_server::records::set_block_list;

    use super::*;
    use crate::directory::MemoryAccountDirectory;

    struct DownStore;

    #[async_trait]
    impl ProfileStore for DownStore {
        async fn get(
            &self,
            _identity: &Identity,
            _key: RecordKey,
        ) -> Result<Option<String>, ProfileError> {
            Err(ProfileError::Unavailable("down".to_owned()))
        }

        async fn set(
            &self,
            _identity: &Identity,
            _key: RecordKey,
            _value: String,
        ) -> Result<(), ProfileError> {
            Err(ProfileError::Unavailable("down".to_owned()))
        }
    }

    fn client(store: Arc<dyn ProfileStore>) -> (ChatClient, mpsc::Receiver<ClientEnvelope>) {
        let directory = MemoryAccountDirectory::new();
        directory.register("alice", Identity::from("id-alice"));
        directory.register("bob", Identity::from("id-bob"));
        directory.register("carol", Identity::from("id-carol"));
        let (tx, rx) = mpsc::channel(8);
        let client = ChatClient::new(
            Identity::from("id-alice"),
            DisplayName("Alice".to_owned()),
            store,
            Arc::new(directory),
            tx,
        );
        (client, rx)
    }

    #[tokio::test]
    async fn blocked_sender_is_kept_but_not_shown() {
        let store = MemoryProfileStore::new();
        set_block_list(&store, &Identity::from("id-alice"), &["carol".to_owned()])
            .await
            .unwrap();
        let (mut client, _rx) = client(Arc::new(store));
        assert!(client.select_tab("Global").await.is_some());

        assert!(!client.receive(ChatBroadcast::new("Carol: hi", ChatChannel::GLOBAL)).await);
        assert!(!client.receive(ChatBroadcast::new("From Carol: psst", ChatChannel::WHISPER)).await);
        assert!(client.receive(ChatBroadcast::new("Bob: hey", ChatChannel::GLOBAL)).await);

        assert_eq!(client.history().len(), 3);
        assert_eq!(client.take_rendered(), vec!["[Global] Bob: hey".to_owned()]);
        assert_eq!(client.redisplay().await, "[Global] Bob: hey");
    }

    #[tokio::test]
    async fn active_tab_filters_channels() {
        let (mut client, _rx) = client(Arc::new(MemoryProfileStore::new()));
        client.select_tab("local").await;

        assert!(!client.receive(ChatBroadcast::new("Bob: global", ChatChannel::GLOBAL)).await);
        assert!(client.receive(ChatBroadcast::new("Bob: local", ChatChannel::LOCAL)).await);
        assert!(client.receive(ChatBroadcast::system("Server restarting.")).await);

        let redisplayed = client.select_tab("All").await.unwrap();
        assert_eq!(
            redisplayed,
            "[Global] Bob: global\n[Local] Bob: local\n[SYSTEM] Server restarting."
        );
    }

    #[tokio::test]
    async fn failed_block_lookup_hides_player_lines() {
        let (mut client, _rx) = client(Arc::new(DownStore));
        assert!(!client.receive(ChatBroadcast::new("Bob: hey", ChatChannel::GLOBAL)).await);
        assert!(client.receive(ChatBroadcast::system("You have been kicked.")).await);
        assert_eq!(client.history().len(), 2);
        assert_eq!(client.visible_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn submit_trims_and_clamps() {
        let (mut client, mut rx) = client(Arc::new(MemoryProfileStore::new()));
        let long = format!("  {}  ", "x".repeat(150));
        client.submit(ChatChannel::GLOBAL, &long).await.unwrap();

        let Ok(ClientEnvelope::Chat(chat)) = rx.try_recv() else {
            panic!("expected a chat envelope");
        };
        assert_eq!(chat.text.chars().count(), MESSAGE_MAX_CHARS);
        assert_eq!(chat.channel, ChatChannel::GLOBAL);

        client.submit(ChatChannel::GLOBAL, "   ").await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn command_feedback_lands_in_history() {
        let (mut client, mut rx) = client(Arc::new(MemoryProfileStore::new()));
        client.submit(ChatChannel::GLOBAL, "/mute bob global").await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(
            client.take_rendered(),
            vec!["[SYSTEM] You do not have permission to do that.".to_owned()]
        );
    }

    #[tokio::test]
    async fn whisper_echoes_and_remembers_target() {
        let (mut client, mut rx) = client(Arc::new(MemoryProfileStore::new()));
        client.whisper("Bob", "psst").await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientEnvelope::Whisper(WhisperBroadcast {
                player_name: "Bob".to_owned(),
                text: "psst".to_owned(),
            })
        );
        assert_eq!(client.take_rendered(), vec!["To Bob: psst".to_owned()]);
        assert_eq!(client.last_whisper_name(), Some("Bob"));

        client.submit(ChatChannel::WHISPER, "again").await.unwrap();
        let Ok(ClientEnvelope::Whisper(again)) = rx.try_recv() else {
            panic!("expected a whisper");
        };
        assert_eq!(again.player_name, "Bob");
    }

    #[tokio::test]
    async fn whisper_to_unknown_player_is_not_sent() {
        let (mut client, mut rx) = client(Arc::new(MemoryProfileStore::new()));
        client.whisper("mallory", "hi").await.unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(
            client.take_rendered(),
            vec!["[SYSTEM] mallory does not exist.".to_owned()]
        );
        assert_eq!(client.last_whisper_name(), None);
    }

    #[tokio::test]
    async fn sent_lines_can_be_recalled() {
        let (mut client, _rx) = client(Arc::new(MemoryProfileStore::new()));
        client.submit(ChatChannel::GLOBAL, "one").await.unwrap();
        client.submit(ChatChannel::GLOBAL, "two").await.unwrap();

        assert_eq!(client.recall_previous(), Some("two"));
        assert_eq!(client.recall_previous(), Some("one"));
        assert_eq!(client.recall_previous(), Some("one"));
        assert_eq!(client.recall_next(), Some("two"));
        assert_eq!(client.recall_next(), None);
    }

    #[tokio::test]
    async fn login_rejection_surfaces_as_error() {
        let (mut client, _rx) = client(Arc::new(MemoryProfileStore::new()));
        let result = client
            .handle_server(ServerEnvelope::LoginRejected {
                reason: "You are banned.".to_owned(),
            })
            .await;
        assert!(matches!(result, Err(ClientError::LoginRejected(reason)) if reason == "You are banned."));
    }
}
