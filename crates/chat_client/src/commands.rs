//! Client halves of the moderation commands.
//!
//! The checks made here only save a round trip. Every command is re-validated
//! by the server, which is the only place state changes.

use std::sync::Arc;

use async_trait::async_trait;
use chat_server::channels::ChatChannel;
use chat_server::commands::{CommandKeys, CommandTable};
use chat_server::constants::COMMAND_CHAR;
use chat_server::message_models::{ChatBroadcast, ClientEnvelope};
use chat_server::parsers::parse_command_line;
use chat_server::profile_store::ProfileStore;
use chat_server::records::is_admin;
use chat_server::types::{DisplayName, Identity};
use log::debug;
use tokio::sync::mpsc;

use crate::directory::AccountDirectory;
use crate::errors::ClientError;

const NO_PERMISSION: &str = "You do not have permission to do that.";
const MISSING_USERNAME: &str = "Invalid command parameters. Requires at least: /command username";

/// What a client command needs from the local session.
pub struct ClientContext<'a> {
    pub identity: &'a Identity,
    pub display_name: &'a DisplayName,
    pub store: &'a dyn ProfileStore,
    pub directory: &'a dyn AccountDirectory,
    pub outbound: &'a mpsc::Sender<ClientEnvelope>,
}

impl ClientContext<'_> {
    /// Sends `/token token ...` to the server. The channel is not looked at
    /// for commands.
    pub async fn forward(&self, tokens: &[String]) -> Result<(), ClientError> {
        let text = format!("{COMMAND_CHAR}{}", tokens.join(" "));
        debug!("forwarding command: {text}");
        self.outbound
            .send(ClientEnvelope::Chat(ChatBroadcast::new(text, ChatChannel::LOCAL)))
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    async fn is_admin(&self) -> bool {
        is_admin(self.store, self.identity).await
    }

    /// Replaces the username at `tokens[1]` with its identity.
    /// `Ok(Err(feedback))` when the account does not exist.
    async fn resolve_target(
        &self,
        tokens: &[String],
    ) -> Result<Result<Vec<String>, String>, ClientError> {
        let Some(username) = tokens.get(1) else {
            return Ok(Err(MISSING_USERNAME.to_owned()));
        };
        match self.directory.lookup(username).await? {
            Some(identity) => {
                let mut rewritten = tokens.to_vec();
                rewritten[1] = identity.0;
                Ok(Ok(rewritten))
            }
            None => Ok(Err(format!("{username} does not exist."))),
        }
    }
}

/// Returns the feedback line to show locally, if any.
#[async_trait]
pub trait ClientCommand: CommandKeys + Send + Sync {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError>;
}

pub fn client_commands() -> Vec<Arc<dyn ClientCommand>> {
    vec![
        Arc::new(BanCommand),
        Arc::new(UnbanCommand),
        Arc::new(MuteCommand),
        Arc::new(UnmuteCommand),
        Arc::new(KickCommand),
        Arc::new(BlockCommand),
        Arc::new(UnblockCommand),
    ]
}

pub struct ClientCommandDispatcher {
    table: CommandTable<dyn ClientCommand>,
}

impl ClientCommandDispatcher {
    pub fn new(handlers: impl IntoIterator<Item = Arc<dyn ClientCommand>>) -> Self {
        ClientCommandDispatcher {
            table: CommandTable::build(handlers),
        }
    }

    pub fn table(&self) -> &CommandTable<dyn ClientCommand> {
        &self.table
    }

    /// `None` when `text` is not a registered command and should be sent as chat.
    pub async fn dispatch(
        &self,
        text: &str,
        ctx: &ClientContext<'_>,
    ) -> Option<Result<Option<String>, ClientError>> {
        let tokens = parse_command_line(text)?;
        let handler = self.table.lookup(tokens.first()?)?;
        Some(handler.execute(&tokens, ctx).await)
    }
}

impl Default for ClientCommandDispatcher {
    fn default() -> Self {
        ClientCommandDispatcher::new(client_commands())
    }
}

/// Admin check, then `/keyword identity`.
async fn forward_by_identity(
    tokens: &[String],
    ctx: &ClientContext<'_>,
) -> Result<Option<String>, ClientError> {
    if tokens.len() < 2 {
        return Ok(Some(MISSING_USERNAME.to_owned()));
    }
    if !ctx.is_admin().await {
        return Ok(Some(NO_PERMISSION.to_owned()));
    }
    match ctx.resolve_target(tokens).await? {
        Ok(rewritten) => {
            ctx.forward(&rewritten[..2]).await?;
            Ok(None)
        }
        Err(feedback) => Ok(Some(feedback)),
    }
}

pub struct BanCommand;
impl CommandKeys for BanCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["ban"]
    }
}
#[async_trait]
impl ClientCommand for BanCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        forward_by_identity(tokens, ctx).await
    }
}

pub struct UnbanCommand;
impl CommandKeys for UnbanCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["unban", "removeban"]
    }
}
#[async_trait]
impl ClientCommand for UnbanCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        forward_by_identity(tokens, ctx).await
    }
}

/// Shared by mute and unmute: `/keyword username channel`.
async fn forward_channel_command(
    keyword: &str,
    tokens: &[String],
    ctx: &ClientContext<'_>,
) -> Result<Option<String>, ClientError> {
    if tokens.len() < 3 {
        return Ok(Some(format!(
            "Incorrect syntax. Use: /{keyword} username channel"
        )));
    }
    if !ctx.is_admin().await {
        return Ok(Some(NO_PERMISSION.to_owned()));
    }
    if ctx.display_name.matches(&tokens[1]) {
        return Ok(Some(format!("You cannot {keyword} yourself!")));
    }
    match ctx.resolve_target(tokens).await? {
        Ok(rewritten) => {
            ctx.forward(&rewritten[..3]).await?;
            Ok(None)
        }
        Err(feedback) => Ok(Some(feedback)),
    }
}

pub struct MuteCommand;
impl CommandKeys for MuteCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["mute"]
    }
}
#[async_trait]
impl ClientCommand for MuteCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        forward_channel_command("mute", tokens, ctx).await
    }
}

pub struct UnmuteCommand;
impl CommandKeys for UnmuteCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["unmute", "removemute"]
    }
}
#[async_trait]
impl ClientCommand for UnmuteCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        forward_channel_command("unmute", tokens, ctx).await
    }
}

/// Kicks go by display name, so there is nothing to resolve.
pub struct KickCommand;
impl CommandKeys for KickCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["kick"]
    }
}
#[async_trait]
impl ClientCommand for KickCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        if tokens.len() < 2 {
            return Ok(Some(MISSING_USERNAME.to_owned()));
        }
        if !ctx.is_admin().await {
            return Ok(Some("You don't have permission to kick players.".to_owned()));
        }
        ctx.forward(&tokens[..2]).await?;
        Ok(None)
    }
}

/// Shared by block and unblock. The list holds display names, so the name is
/// forwarded lowercased rather than resolved.
async fn forward_block_command(
    keyword: &str,
    tokens: &[String],
    ctx: &ClientContext<'_>,
) -> Result<Option<String>, ClientError> {
    let Some(name) = tokens.get(1) else {
        return Ok(Some(MISSING_USERNAME.to_owned()));
    };
    if ctx.display_name.matches(name) {
        return Ok(Some(format!("You cannot {keyword} yourself!")));
    }
    if ctx.directory.lookup(name).await?.is_none() {
        return Ok(Some(format!("{name} does not exist.")));
    }
    ctx.forward(&[tokens[0].clone(), name.to_lowercase()]).await?;
    Ok(None)
}

pub struct BlockCommand;
impl CommandKeys for BlockCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["block"]
    }
}
#[async_trait]
impl ClientCommand for BlockCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        forward_block_command("block", tokens, ctx).await
    }
}

pub struct UnblockCommand;
impl CommandKeys for UnblockCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["unblock", "removeblock"]
    }
}
#[async_trait]
impl ClientCommand for UnblockCommand {
    async fn execute(
        &self,
        tokens: &[String],
        ctx: &ClientContext<'_>,
    ) -> Result<Option<String>, ClientError> {
        forward_block_command("unblock", tokens, ctx).await
    }
}
