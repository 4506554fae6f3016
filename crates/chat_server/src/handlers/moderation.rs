use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};

use crate::channels::ChatChannel;
use crate::commands::{CommandContext, CommandKeys, CommandOutcome, ServerCommand};
use crate::errors::{ChatError, ProfileError};
use crate::message_models::DisconnectMode;
use crate::records::{ban_expiry, ban_until, clear_ban, get_mute, is_admin, set_ban, set_mute};
use crate::replies::SystemNotice;

/// Admin gate shared by the ban/mute/kick family. The client checks the
/// same flag first, so a refusal here means a modified client.
async fn require_admin(ctx: &CommandContext<'_>, action: &str) -> bool {
    if is_admin(ctx.store, ctx.caller_identity).await {
        return true;
    }
    warn!(
        "[{}] {} tried to {action} without the Admin flag",
        ctx.caller.client_id, ctx.caller_identity
    );
    ctx.reply(SystemNotice::NoPermission { action });
    false
}

fn channel_arg(ctx: &CommandContext<'_>, arg: &str) -> Option<ChatChannel> {
    let channel = ChatChannel::from_command_arg(arg);
    if channel.is_none() {
        ctx.reply(SystemNotice::InvalidChannelName);
    }
    channel
}

pub struct BanCommand;

impl CommandKeys for BanCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["ban"]
    }
}

#[async_trait]
impl ServerCommand for BanCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let Some(target) = args.get(1) else {
            ctx.reply(SystemNotice::Usage {
                usage: "/ban username",
            });
            return Ok(CommandOutcome::Rejected);
        };
        if ctx.is_caller(target).await {
            ctx.reply(SystemNotice::CannotTargetSelf { action: "ban" });
            return Ok(CommandOutcome::Rejected);
        }
        if !require_admin(ctx, "ban").await {
            return Ok(CommandOutcome::Rejected);
        }

        let target_identity = ctx.resolve_identity(target).await;
        let now = Utc::now();
        match ban_expiry(ctx.store, &target_identity).await {
            Ok(Some(until)) if until > now => {
                ctx.reply(SystemNotice::AlreadyBanned {
                    target,
                    until: &until.to_rfc3339_opts(SecondsFormat::Secs, true),
                });
                return Ok(CommandOutcome::NoOp);
            }
            Ok(_) => {}
            // A corrupt record is overwritten by the new ban.
            Err(ProfileError::CorruptRecord { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let Some(until) = ban_until(now, ctx.ban_duration) else {
            error!("ban duration {} is out of range", ctx.ban_duration);
            ctx.reply(SystemNotice::BanDurationOutOfRange);
            return Ok(CommandOutcome::Rejected);
        };
        set_ban(ctx.store, &target_identity, until).await?;
        info!("{} banned {target}", ctx.caller_identity);
        ctx.reply(SystemNotice::UserBanned);

        if let Some(connection) = ctx.find_target(target).await {
            connection.notify(SystemNotice::YouAreBanned);
            ctx.state.disconnect(connection.client_id, DisconnectMode::Graceful);
        }
        Ok(CommandOutcome::Applied)
    }
}

pub struct UnbanCommand;

impl CommandKeys for UnbanCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["unban", "removeban"]
    }
}

#[async_trait]
impl ServerCommand for UnbanCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let Some(target) = args.get(1) else {
            ctx.reply(SystemNotice::Usage {
                usage: "/unban username",
            });
            return Ok(CommandOutcome::Rejected);
        };
        if !require_admin(ctx, "unban").await {
            return Ok(CommandOutcome::Rejected);
        }

        let target_identity = ctx.resolve_identity(target).await;
        match ban_expiry(ctx.store, &target_identity).await {
            Ok(Some(until)) if until > Utc::now() => {}
            Ok(_) => {
                ctx.reply(SystemNotice::NotBanned { target });
                return Ok(CommandOutcome::NoOp);
            }
            Err(ProfileError::CorruptRecord { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        clear_ban(ctx.store, &target_identity).await?;
        info!("{} unbanned {target}", ctx.caller_identity);
        ctx.reply(SystemNotice::UserUnbanned);
        Ok(CommandOutcome::Applied)
    }
}

pub struct MuteCommand;

impl CommandKeys for MuteCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["mute"]
    }
}

#[async_trait]
impl ServerCommand for MuteCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let [_, target, channel_name, ..] = args else {
            ctx.reply(SystemNotice::ChannelUsage { command: "mute" });
            return Ok(CommandOutcome::Rejected);
        };
        let Some(channel) = channel_arg(ctx, channel_name) else {
            return Ok(CommandOutcome::Rejected);
        };
        if ctx.is_caller(target).await {
            ctx.reply(SystemNotice::CannotTargetSelf { action: "mute" });
            return Ok(CommandOutcome::Rejected);
        }
        if !require_admin(ctx, "mute").await {
            return Ok(CommandOutcome::Rejected);
        }

        let target_identity = ctx.resolve_identity(target).await;
        let flags = get_mute(ctx.store, &target_identity).await?;
        if flags.contains(channel) {
            ctx.reply(SystemNotice::AlreadyMuted { target, channel });
            return Ok(CommandOutcome::NoOp);
        }

        set_mute(ctx.store, &target_identity, flags | channel).await?;
        info!("{} muted {target} in {channel}", ctx.caller_identity);
        ctx.reply(SystemNotice::UserMuted { channel });
        if let Some(connection) = ctx.find_target(target).await {
            connection.notify(SystemNotice::YouAreMuted { channel });
        }
        Ok(CommandOutcome::Applied)
    }
}

pub struct UnmuteCommand;

impl CommandKeys for UnmuteCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["unmute", "removemute"]
    }
}

#[async_trait]
impl ServerCommand for UnmuteCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let [_, target, channel_name, ..] = args else {
            ctx.reply(SystemNotice::ChannelUsage { command: "unmute" });
            return Ok(CommandOutcome::Rejected);
        };
        let Some(channel) = channel_arg(ctx, channel_name) else {
            return Ok(CommandOutcome::Rejected);
        };
        if !require_admin(ctx, "unmute").await {
            return Ok(CommandOutcome::Rejected);
        }

        let target_identity = ctx.resolve_identity(target).await;
        let flags = get_mute(ctx.store, &target_identity).await?;
        if !flags.intersects(channel) {
            ctx.reply(SystemNotice::NotMuted { target, channel });
            return Ok(CommandOutcome::NoOp);
        }

        set_mute(ctx.store, &target_identity, flags - channel).await?;
        info!("{} unmuted {target} in {channel}", ctx.caller_identity);
        ctx.reply(SystemNotice::UserUnmuted { channel });
        if let Some(connection) = ctx.find_target(target).await {
            connection.notify(SystemNotice::YouAreUnmuted { channel });
        }
        Ok(CommandOutcome::Applied)
    }
}

pub struct KickCommand;

impl CommandKeys for KickCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["kick"]
    }
}

#[async_trait]
impl ServerCommand for KickCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let Some(target) = args.get(1) else {
            ctx.reply(SystemNotice::Usage {
                usage: "/kick username",
            });
            return Ok(CommandOutcome::Rejected);
        };
        if ctx.is_caller(target).await {
            ctx.reply(SystemNotice::CannotTargetSelf { action: "kick" });
            return Ok(CommandOutcome::Rejected);
        }
        if !require_admin(ctx, "kick players").await {
            return Ok(CommandOutcome::Rejected);
        }

        let Some(connection) = ctx.find_target(target).await else {
            ctx.reply(SystemNotice::NotOnline { name: target });
            return Ok(CommandOutcome::Rejected);
        };
        info!("{} kicked {target}", ctx.caller_identity);
        connection.notify(SystemNotice::YouAreKicked);
        ctx.state.disconnect(connection.client_id, DisconnectMode::Graceful);
        ctx.reply(SystemNotice::UserKicked { name: target });
        Ok(CommandOutcome::Applied)
    }
}
