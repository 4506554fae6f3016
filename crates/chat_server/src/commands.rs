use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use log::{debug, error, warn};

use crate::errors::ChatError;
use crate::handlers::blocking::{BlockCommand, UnblockCommand};
use crate::handlers::moderation::{
    BanCommand, KickCommand, MuteCommand, UnbanCommand, UnmuteCommand,
};
use crate::identity::IdentityProvider;
use crate::parsers::parse_command_line;
use crate::profile_store::ProfileStore;
use crate::replies::SystemNotice;
use crate::server_state::ServerState;
use crate::types::Identity;
use crate::user_state::ConnectionHandle;

/// Keywords a command answers to, without the leading slash.
pub trait CommandKeys {
    fn keys(&self) -> &'static [&'static str];
}

/// Keyword to handler lookup, built once at start-up. Keys are stored
/// lowercase; on a collision the first registered handler keeps the key.
pub struct CommandTable<H: ?Sized> {
    handlers: HashMap<String, Arc<H>>,
}

impl<H: ?Sized + CommandKeys> CommandTable<H> {
    pub fn new() -> Self {
        CommandTable {
            handlers: HashMap::new(),
        }
    }

    pub fn build(handlers: impl IntoIterator<Item = Arc<H>>) -> Self {
        let mut table = CommandTable::new();
        for handler in handlers {
            table.register(handler);
        }
        table
    }

    pub fn register(&mut self, handler: Arc<H>) {
        for key in handler.keys() {
            let key = key.to_lowercase();
            if self.handlers.contains_key(&key) {
                warn!("command key '{key}' is already registered, keeping the first handler");
                continue;
            }
            self.handlers.insert(key, handler.clone());
        }
    }

    pub fn lookup(&self, keyword: &str) -> Option<&Arc<H>> {
        self.handlers.get(&keyword.to_lowercase())
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl<H: ?Sized + CommandKeys> Default for CommandTable<H> {
    fn default() -> Self {
        CommandTable::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// State changed.
    Applied,
    /// Target already in the requested state.
    NoOp,
    /// Bad syntax, self-targeting, missing permission or unknown target.
    Rejected,
}

/// What a server-side command runs against.
pub struct CommandContext<'a> {
    pub caller: &'a ConnectionHandle,
    pub caller_identity: &'a Identity,
    pub state: &'a ServerState,
    pub identities: &'a dyn IdentityProvider,
    pub store: &'a dyn ProfileStore,
    pub ban_duration: TimeDelta,
}

impl CommandContext<'_> {
    pub fn reply(&self, notice: SystemNotice<'_>) {
        self.caller.notify(notice);
    }

    /// The caller named by identity or by display name.
    pub async fn is_caller(&self, target: &str) -> bool {
        if self.caller_identity.0 == target {
            return true;
        }
        self.caller
            .display_name()
            .await
            .is_some_and(|name| name.matches(target))
    }

    /// Live connection for a target given as an identity, falling back to a
    /// display name.
    pub async fn find_target(&self, target: &str) -> Option<ConnectionHandle> {
        let client_id = match self
            .identities
            .connection_by_identity(&Identity::from(target))
            .await
        {
            Some(client_id) => Some(client_id),
            None => self.identities.connection_by_name(target).await,
        };
        self.state.get(client_id?)
    }

    /// Identity a target argument refers to: the matching live connection's
    /// identity, otherwise the argument itself.
    pub async fn resolve_identity(&self, target: &str) -> Identity {
        if let Some(connection) = self.find_target(target).await {
            if let Some(identity) = connection.identity().await {
                return identity;
            }
        }
        Identity::from(target)
    }
}

/// Authoritative half of a slash command. Re-validates everything the client
/// already checked.
#[async_trait]
pub trait ServerCommand: CommandKeys + Send + Sync {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError>;
}

pub fn server_commands() -> Vec<Arc<dyn ServerCommand>> {
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

pub struct CommandDispatcher {
    table: CommandTable<dyn ServerCommand>,
}

impl CommandDispatcher {
    pub fn new(handlers: impl IntoIterator<Item = Arc<dyn ServerCommand>>) -> Self {
        CommandDispatcher {
            table: CommandTable::build(handlers),
        }
    }

    pub fn table(&self) -> &CommandTable<dyn ServerCommand> {
        &self.table
    }

    /// Runs `text` as a command. `None` when it is not a command line or the
    /// keyword is unknown, in which case it is ordinary chat.
    pub async fn dispatch(
        &self,
        text: &str,
        ctx: &CommandContext<'_>,
    ) -> Option<CommandOutcome> {
        let tokens = parse_command_line(text)?;
        let handler = self.table.lookup(&tokens[0])?;
        debug!(
            "[{}] command {:?} from {}",
            ctx.caller.client_id, tokens, ctx.caller_identity
        );

        match handler.execute(&tokens, ctx).await {
            Ok(outcome) => Some(outcome),
            Err(ChatError::ProfileStore(e)) => {
                error!("/{} from {} failed: {e}", tokens[0], ctx.caller_identity);
                ctx.reply(SystemNotice::StoreFailure {
                    report: &e.to_string(),
                });
                Some(CommandOutcome::Rejected)
            }
            Err(e) => {
                error!("/{} from {} failed: {e}", tokens[0], ctx.caller_identity);
                Some(CommandOutcome::Rejected)
            }
        }
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        CommandDispatcher::new(server_commands())
    }
}
