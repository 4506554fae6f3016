use async_trait::async_trait;
use log::debug;

use crate::commands::{CommandContext, CommandKeys, CommandOutcome, ServerCommand};
use crate::errors::ChatError;
use crate::records::{block_list_contains, get_block_list, set_block_list};
use crate::replies::SystemNotice;

// Block lists belong to the caller, so these commands need no admin check.

pub struct BlockCommand;

impl CommandKeys for BlockCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["block"]
    }
}

#[async_trait]
impl ServerCommand for BlockCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let Some(name) = args.get(1) else {
            ctx.reply(SystemNotice::Usage {
                usage: "/block username",
            });
            return Ok(CommandOutcome::Rejected);
        };
        let name = name.to_lowercase();
        if ctx.is_caller(&name).await {
            ctx.reply(SystemNotice::CannotTargetSelf { action: "block" });
            return Ok(CommandOutcome::Rejected);
        }

        let mut blocked = get_block_list(ctx.store, ctx.caller_identity).await?;
        if block_list_contains(&blocked, &name) {
            ctx.reply(SystemNotice::AlreadyBlocked { name: &name });
            return Ok(CommandOutcome::NoOp);
        }
        blocked.push(name.clone());
        set_block_list(ctx.store, ctx.caller_identity, &blocked).await?;
        debug!("{} blocked {name}", ctx.caller_identity);
        ctx.reply(SystemNotice::Blocked { name: &name });
        Ok(CommandOutcome::Applied)
    }
}

pub struct UnblockCommand;

impl CommandKeys for UnblockCommand {
    fn keys(&self) -> &'static [&'static str] {
        &["unblock", "removeblock"]
    }
}

#[async_trait]
impl ServerCommand for UnblockCommand {
    async fn execute(
        &self,
        args: &[String],
        ctx: &CommandContext<'_>,
    ) -> Result<CommandOutcome, ChatError> {
        let Some(name) = args.get(1) else {
            ctx.reply(SystemNotice::Usage {
                usage: "/unblock username",
            });
            return Ok(CommandOutcome::Rejected);
        };
        let name = name.to_lowercase();

        let mut blocked = get_block_list(ctx.store, ctx.caller_identity).await?;
        if !block_list_contains(&blocked, &name) {
            ctx.reply(SystemNotice::NotBlocked { name: &name });
            return Ok(CommandOutcome::NoOp);
        }
        blocked.retain(|n| !n.eq_ignore_ascii_case(&name));
        set_block_list(ctx.store, ctx.caller_identity, &blocked).await?;
        debug!("{} unblocked {name}", ctx.caller_identity);
        ctx.reply(SystemNotice::Unblocked { name: &name });
        Ok(CommandOutcome::Applied)
    }
}
