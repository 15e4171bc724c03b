//! Commands every deployment gets.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use atbot_channels::MembershipHandle;
use atbot_core::types::ChannelId;

use crate::dispatch::{CommandRegistry, SubCommand};
use crate::result::{CommandArguments, CommandResult, EditPermission};

/// Repeats its arguments. Editable, and undo clears the reply.
pub struct EchoCommand;

#[async_trait]
impl SubCommand for EchoCommand {
    fn description(&self) -> &str {
        "repeat the given text"
    }

    async fn handle(&self, args: &CommandArguments) -> anyhow::Result<CommandResult> {
        if args.is_undo {
            return Ok(CommandResult::ok("").with_undo());
        }
        if args.arguments.is_empty() {
            return Ok(CommandResult::usage("Usage: `echo <text>`"));
        }
        Ok(CommandResult::ok(args.arguments.join(" "))
            .with_edit(EditPermission::ForceAllow)
            .with_undo())
    }
}

/// Reports whether the caller is in each named channel.
pub struct IsMemberCommand {
    membership: MembershipHandle,
}

impl IsMemberCommand {
    pub fn new(membership: MembershipHandle) -> Self {
        Self { membership }
    }
}

#[async_trait]
impl SubCommand for IsMemberCommand {
    fn description(&self) -> &str {
        "check whether you are a member of the given channels"
    }

    async fn handle(&self, args: &CommandArguments) -> anyhow::Result<CommandResult> {
        if args.arguments.is_empty() {
            return Ok(CommandResult::usage("Usage: `ismember <#channel>...`"));
        }
        let Some(channels) = args
            .arguments
            .iter()
            .map(|a| parse_channel_ref(a))
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(CommandResult::failure(
                "Name channels with #channel links or channel IDs",
            ));
        };

        let found = self
            .membership
            .user_in_channels(&args.source.user, &channels)
            .await
            .context("membership lookup")?;

        let lines: Vec<String> = channels
            .iter()
            .map(|ch| {
                let joined = found.get(ch).copied().unwrap_or(false);
                format!("<#{ch}>: {}", if joined { "yes" } else { "no" })
            })
            .collect();
        Ok(CommandResult::ok(lines.join("\n")).with_edit(EditPermission::ForceAllow))
    }
}

/// `<#C123|name>`, `<#C123>` or a bare `C123`.
fn parse_channel_ref(arg: &str) -> Option<ChannelId> {
    let id = match arg.strip_prefix("<#").and_then(|s| s.strip_suffix('>')) {
        Some(inner) => inner.split('|').next().unwrap_or(inner),
        None => arg,
    };
    let valid = id.starts_with(['C', 'G'])
        && id.len() > 1
        && id.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ChannelId::from(id))
}

/// Register `echo` and `ismember`. `help` is built into the registry.
pub fn register_builtins(registry: &CommandRegistry, membership: MembershipHandle) {
    registry.register("echo", Arc::new(EchoCommand));
    registry.register("ismember", Arc::new(IsMemberCommand::new(membership)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::result::{CommandSource, ResultCode};
    use atbot_core::types::{MessageId, UserId};

    fn args(tokens: &[&str]) -> CommandArguments {
        CommandArguments::new(
            tokens.iter().map(|s| s.to_string()).collect(),
            CommandSource {
                message: MessageId::new("C1", "1.0"),
                user: UserId::from("U1"),
                archive_link: String::new(),
                is_private: false,
            },
        )
    }

    #[test]
    fn channel_refs() {
        assert_eq!(parse_channel_ref("<#C123|general>"), Some(ChannelId::from("C123")));
        assert_eq!(parse_channel_ref("<#G9>"), Some(ChannelId::from("G9")));
        assert_eq!(parse_channel_ref("C42"), Some(ChannelId::from("C42")));
        assert_eq!(parse_channel_ref("#general"), None);
        assert_eq!(parse_channel_ref("C"), None);
    }

    #[tokio::test]
    async fn echo_joins_arguments_and_opts_in() {
        let result = EchoCommand.handle(&args(&["hello", "world"])).await.unwrap();
        assert_eq!(result.message, "hello world");
        assert!(result.can_undo);
        assert!(result.edit_allowed());

        let result = EchoCommand.handle(&args(&[])).await.unwrap();
        assert_eq!(result.code, ResultCode::PrintUsage);
    }

    #[tokio::test]
    async fn ismember_reads_membership_actor() {
        let (membership, _worker) = MembershipHandle::spawn();
        membership
            .set_membership(&UserId::from("U1"), &ChannelId::from("C1"), true)
            .await
            .unwrap();

        let registry = CommandRegistry::new();
        register_builtins(&registry, membership);

        let result = registry
            .dispatch(&args(&["ismember", "<#C1|general>", "C2"]))
            .await;
        assert_eq!(result.code, ResultCode::Ok);
        assert_eq!(result.message, "<#C1>: yes\n<#C2>: no");

        let result = registry.dispatch(&args(&["ismember", "general"])).await;
        assert_eq!(result.code, ResultCode::Failure);
    }

    #[tokio::test]
    async fn ismember_reports_stopped_actor_as_error() {
        let (membership, worker) = MembershipHandle::spawn();
        worker.abort();
        let _ = worker.await;

        let registry = CommandRegistry::new();
        register_builtins(&registry, membership);
        let result = registry.dispatch(&args(&["ismember", "C1"])).await;
        assert_eq!(result.code, ResultCode::Error);
    }
}
