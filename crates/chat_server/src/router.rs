use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use log::{debug, error, info, warn};

use crate::channels::ChatChannel;
use crate::commands::{CommandContext, CommandDispatcher, CommandOutcome};
use crate::constants::{DEFAULT_BAN_DURATION_DAYS, DEFAULT_FILTER_TIMEOUT_MS, MESSAGE_MAX_CHARS};
use crate::errors::ChatError;
use crate::filters::{PassthroughFilter, ProfanityFilter};
use crate::identity::IdentityProvider;
use crate::message_models::{ChatBroadcast, DisconnectMode, WhisperBroadcast};
use crate::mute_checkers::{
    ChannelMuteChecker, ProfileMuteChecker, ProfileWhisperMuteChecker, WhisperMuteChecker,
};
use crate::profile_store::ProfileStore;
use crate::replies::SystemNotice;
use crate::sanitize::{clamp_length, sanitize};
use crate::server_state::ServerState;
use crate::types::{ClientId, Identity};
use crate::user_state::ConnectionHandle;

/// Where one inbound message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    CommandHandled(CommandOutcome),
    /// Sender is muted in the channel. They got a notice.
    Muted,
    /// Queued on this many connections.
    Delivered(usize),
    TargetOffline,
    BlockedByTarget,
    /// Filter failure, unresolvable sender or a sender that went away.
    Dropped,
    /// Channel has no routing.
    NotRouted,
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub max_message_chars: usize,
    pub filter_timeout: Duration,
    pub ban_duration: TimeDelta,
    pub verbose_logging: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        RouterSettings {
            max_message_chars: MESSAGE_MAX_CHARS,
            filter_timeout: Duration::from_millis(DEFAULT_FILTER_TIMEOUT_MS),
            ban_duration: TimeDelta::days(i64::from(DEFAULT_BAN_DURATION_DAYS)),
            verbose_logging: false,
        }
    }
}

enum Preprocessed {
    Command(CommandOutcome),
    Text(String),
}

/// Server side of chat: sanitizing, command interception, moderation checks,
/// filtering and fan-out.
pub struct ChatRouter {
    state: ServerState,
    store: Arc<dyn ProfileStore>,
    identities: Arc<dyn IdentityProvider>,
    filter: Arc<dyn ProfanityFilter>,
    channel_mutes: Arc<dyn ChannelMuteChecker>,
    whisper_mutes: Arc<dyn WhisperMuteChecker>,
    commands: CommandDispatcher,
    settings: RouterSettings,
}

pub struct ChatRouterBuilder {
    state: ServerState,
    store: Arc<dyn ProfileStore>,
    identities: Option<Arc<dyn IdentityProvider>>,
    filter: Option<Arc<dyn ProfanityFilter>>,
    channel_mutes: Option<Arc<dyn ChannelMuteChecker>>,
    whisper_mutes: Option<Arc<dyn WhisperMuteChecker>>,
    commands: Option<CommandDispatcher>,
    settings: RouterSettings,
}

impl ChatRouterBuilder {
    pub fn identities(mut self, identities: Arc<dyn IdentityProvider>) -> Self {
        self.identities = Some(identities);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn ProfanityFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn channel_mutes(mut self, checker: Arc<dyn ChannelMuteChecker>) -> Self {
        self.channel_mutes = Some(checker);
        self
    }

    pub fn whisper_mutes(mut self, checker: Arc<dyn WhisperMuteChecker>) -> Self {
        self.whisper_mutes = Some(checker);
        self
    }

    pub fn commands(mut self, commands: CommandDispatcher) -> Self {
        self.commands = Some(commands);
        self
    }

    pub fn settings(mut self, settings: RouterSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ChatRouter {
        let identities: Arc<dyn IdentityProvider> = match self.identities {
            Some(identities) => identities,
            None => Arc::new(self.state.clone()),
        };
        let channel_mutes: Arc<dyn ChannelMuteChecker> = match self.channel_mutes {
            Some(checker) => checker,
            None => Arc::new(ProfileMuteChecker::new(self.store.clone())),
        };
        let whisper_mutes: Arc<dyn WhisperMuteChecker> = match self.whisper_mutes {
            Some(checker) => checker,
            None => Arc::new(ProfileWhisperMuteChecker::new(
                self.store.clone(),
                identities.clone(),
            )),
        };
        let filter: Arc<dyn ProfanityFilter> = match self.filter {
            Some(filter) => filter,
            None => Arc::new(PassthroughFilter),
        };
        ChatRouter {
            state: self.state,
            store: self.store,
            identities,
            filter,
            channel_mutes,
            whisper_mutes,
            commands: self.commands.unwrap_or_default(),
            settings: self.settings,
        }
    }
}

impl ChatRouter {
    pub fn builder(state: ServerState, store: Arc<dyn ProfileStore>) -> ChatRouterBuilder {
        ChatRouterBuilder {
            state,
            store,
            identities: None,
            filter: None,
            channel_mutes: None,
            whisper_mutes: None,
            commands: None,
            settings: RouterSettings::default(),
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Terminates the connection. Only a modified client gets here.
    fn violation(&self, sender: &ConnectionHandle, reason: &str) -> ChatError {
        warn!(
            "[{}] protocol violation from {}: {reason}",
            sender.client_id, sender.addr
        );
        sender.close(DisconnectMode::Immediate);
        ChatError::ProtocolViolation(reason.to_owned())
    }

    async fn authenticated_sender(
        &self,
        client_id: ClientId,
    ) -> Result<(ConnectionHandle, Identity), ChatError> {
        let sender = self
            .state
            .get(client_id)
            .ok_or(ChatError::UnknownConnection(client_id))?;
        match self.identities.identity(client_id).await {
            Some(identity) => Ok((sender, identity)),
            None => Err(self.violation(&sender, "chat before login")),
        }
    }

    /// Steps shared by chat and whispers: reject blank text, clamp, sanitize,
    /// then run the text as a command if it is one.
    async fn preprocess(
        &self,
        sender: &ConnectionHandle,
        identity: &Identity,
        raw: &str,
    ) -> Result<Preprocessed, ChatError> {
        if raw.trim().is_empty() {
            return Err(self.violation(sender, "blank chat message"));
        }
        if self.settings.verbose_logging {
            info!(">> chat [{}] {identity}: {raw:?}", sender.client_id);
        } else {
            debug!(">> chat [{}] {identity}: {raw:?}", sender.client_id);
        }

        let text = sanitize(clamp_length(raw.trim(), self.settings.max_message_chars));
        if text.is_empty() {
            return Err(self.violation(sender, "chat message empty after sanitizing"));
        }

        let ctx = CommandContext {
            caller: sender,
            caller_identity: identity,
            state: &self.state,
            identities: self.identities.as_ref(),
            store: self.store.as_ref(),
            ban_duration: self.settings.ban_duration,
        };
        match self.commands.dispatch(&text, &ctx).await {
            Some(outcome) => Ok(Preprocessed::Command(outcome)),
            None => Ok(Preprocessed::Text(text)),
        }
    }

    async fn run_filter(&self, sender: &ConnectionHandle, text: &str) -> Option<String> {
        match tokio::time::timeout(self.settings.filter_timeout, self.filter.filter(text)).await {
            Ok(Ok(filtered)) => Some(filtered),
            Ok(Err(e)) => {
                error!("[{}] profanity filter failed: {e}", sender.client_id);
                sender.notify(SystemNotice::Undeliverable);
                None
            }
            Err(_) => {
                error!(
                    "[{}] profanity filter timed out after {:?}",
                    sender.client_id, self.settings.filter_timeout
                );
                sender.notify(SystemNotice::Undeliverable);
                None
            }
        }
    }

    /// Filters the text and prefixes the sender's display name. `None` drops
    /// the message.
    async fn compose(
        &self,
        sender: &ConnectionHandle,
        text: &str,
        prefix: &str,
    ) -> Option<String> {
        let filtered = self.run_filter(sender, text).await?;
        let Some(name) = self.identities.display_name(sender.client_id).await else {
            error!("[{}] no display name, dropping message", sender.client_id);
            return None;
        };
        if !sender.is_open() {
            debug!("[{}] sender left before delivery", sender.client_id);
            return None;
        }
        Some(format!("{prefix}{name}: {filtered}"))
    }

    pub async fn handle_chat(
        &self,
        client_id: ClientId,
        message: ChatBroadcast,
    ) -> Result<PipelineStatus, ChatError> {
        let (sender, identity) = self.authenticated_sender(client_id).await?;

        let text = match self.preprocess(&sender, &identity, &message.text).await? {
            Preprocessed::Command(outcome) => return Ok(PipelineStatus::CommandHandled(outcome)),
            Preprocessed::Text(text) => text,
        };

        let channel = message.channel;
        if !channel.is_single() {
            return Err(self.violation(
                &sender,
                &format!("chat must use exactly one channel, got bits {:#b}", channel.bits()),
            ));
        }

        if self.channel_mutes.is_muted(&identity, channel).await {
            debug!("[{client_id}] {identity} is muted in {channel}");
            sender.notify(SystemNotice::MutedIn { channel });
            return Ok(PipelineStatus::Muted);
        }

        let Some(line) = self.compose(&sender, &text, "").await else {
            return Ok(PipelineStatus::Dropped);
        };
        let broadcast = ChatBroadcast::new(line, channel);

        let recipients = if channel == ChatChannel::LOCAL {
            self.state.scene_peers(client_id).await
        } else if channel == ChatChannel::GLOBAL {
            self.state.authenticated_clients()
        } else {
            warn!("[{client_id}] no routing for the {channel} channel");
            sender.notify(SystemNotice::ChannelUnavailable { channel });
            return Ok(PipelineStatus::NotRouted);
        };
        Ok(PipelineStatus::Delivered(
            self.state.deliver(&recipients, &broadcast),
        ))
    }

    pub async fn handle_whisper(
        &self,
        client_id: ClientId,
        whisper: WhisperBroadcast,
    ) -> Result<PipelineStatus, ChatError> {
        let (sender, identity) = self.authenticated_sender(client_id).await?;

        let text = match self.preprocess(&sender, &identity, &whisper.text).await? {
            Preprocessed::Command(outcome) => return Ok(PipelineStatus::CommandHandled(outcome)),
            Preprocessed::Text(text) => text,
        };

        let target_name = whisper.player_name.trim();
        let target = match self.identities.connection_by_name(target_name).await {
            Some(target_id) => match self.identities.identity(target_id).await {
                Some(target_identity) => self
                    .state
                    .get(target_id)
                    .map(|connection| (connection, target_identity)),
                None => None,
            },
            None => None,
        };
        let Some((target, target_identity)) = target else {
            sender.notify(SystemNotice::NotOnline { name: target_name });
            return Ok(PipelineStatus::TargetOffline);
        };

        if self.whisper_mutes.is_muted(&identity, &target_identity).await {
            sender.notify(SystemNotice::BlockedByReceiver);
            return Ok(PipelineStatus::BlockedByTarget);
        }
        if self
            .channel_mutes
            .is_muted(&identity, ChatChannel::WHISPER)
            .await
        {
            sender.notify(SystemNotice::MutedIn {
                channel: ChatChannel::WHISPER,
            });
            return Ok(PipelineStatus::Muted);
        }

        let Some(line) = self.compose(&sender, &text, "From ").await else {
            return Ok(PipelineStatus::Dropped);
        };
        let delivered = target.send_chat(ChatBroadcast::new(line, ChatChannel::WHISPER));
        Ok(PipelineStatus::Delivered(usize::from(delivered)))
    }
}
