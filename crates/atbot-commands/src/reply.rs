//! Decides where a result's text goes and what it looks like there.
//!
//! Routing is pure: [`ReplyRouter::route`] returns the shaped replies and the
//! lifecycle coordinator delivers them.

use atbot_core::config::CommandsConfig;

use crate::result::{CommandArguments, CommandResult, ReplyType, ResultCode};

pub const TRUNCATED_HEADER: &str = "[Reply truncated]\n";
pub const NOT_UNDERSTOOD: &str = "I didn't quite understand that, sorry.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// The channel the command was posted in.
    Channel,
    /// Direct message to the author.
    Private,
    /// Direct message carrying problem detail.
    PrivateLog,
    /// The configured audit channel.
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedReply {
    pub destination: Destination,
    pub text: String,
}

impl ShapedReply {
    fn new(destination: Destination, text: impl Into<String>) -> Self {
        Self {
            destination,
            text: text.into(),
        }
    }
}

/// Length limits, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyPolicy {
    /// Channel replies longer than this are cut and sent in full privately.
    pub long_reply_threshold: usize,
    /// How much of a long reply stays in the channel.
    pub long_reply_cut: usize,
    /// Error detail longer than this is also sent privately.
    pub short_reply_threshold: usize,
}

impl From<&CommandsConfig> for ReplyPolicy {
    fn from(cfg: &CommandsConfig) -> Self {
        Self {
            long_reply_threshold: cfg.long_reply_threshold,
            long_reply_cut: cfg.long_reply_cut,
            short_reply_threshold: cfg.short_reply_threshold,
        }
    }
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self::from(&CommandsConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ReplyRouter {
    policy: ReplyPolicy,
    log_enabled: bool,
}

impl ReplyRouter {
    pub fn new(policy: ReplyPolicy, log_enabled: bool) -> Self {
        Self {
            policy,
            log_enabled,
        }
    }

    pub fn route(&self, result: &CommandResult, args: &CommandArguments) -> Vec<ShapedReply> {
        let source = &args.source;
        let reply_type = result.effective_reply_type();

        let mut to_channel = reply_type.contains(ReplyType::IN_CHANNEL);
        let mut to_private = reply_type.contains(ReplyType::PM);
        let to_log = reply_type.contains(ReplyType::LOG) && self.log_enabled;

        // In a DM the channel is the private conversation.
        let mut primary_private = false;
        if (to_channel || to_private) && source.is_private {
            primary_private = true;
            to_channel = false;
            to_private = false;
        }

        let attribute = |body: String| {
            if reply_type.contains(ReplyType::OMIT_USERNAME) {
                body
            } else {
                format!("{}: {}", source.user.mention(), body)
            }
        };

        let mut out = Vec::new();
        match result.code {
            ResultCode::Ok | ResultCode::Failure => {
                let message = result.message.as_str();
                if message.is_empty() {
                    return out;
                }
                if to_channel {
                    let body = if message.chars().count() > self.policy.long_reply_threshold {
                        to_private = true;
                        format!(
                            "{TRUNCATED_HEADER}{}\u{2026}\n",
                            preview(message, self.policy.long_reply_cut)
                        )
                    } else {
                        message.to_string()
                    };
                    out.push(ShapedReply::new(Destination::Channel, attribute(body)));
                }
                if primary_private {
                    out.push(ShapedReply::new(Destination::Private, message));
                } else if to_private {
                    out.push(ShapedReply::new(
                        Destination::Private,
                        format!("{message}\n{}", source.archive_link),
                    ));
                }
                if to_log {
                    out.push(ShapedReply::new(
                        Destination::Log,
                        format!("{message}\n{}", source.archive_link),
                    ));
                }
            }
            ResultCode::Error => {
                let message = if result.message.is_empty() {
                    "Error"
                } else {
                    result.message.as_str()
                };
                let (detail, full, debug) = match &result.err {
                    Some(err) => (
                        err.root_cause().to_string(),
                        format!("{err:#}"),
                        format!("{err:?}"),
                    ),
                    None => (String::new(), String::new(), String::new()),
                };

                if to_channel {
                    if detail.chars().count() > self.policy.short_reply_threshold {
                        to_private = true;
                    }
                    let body = if detail.is_empty() {
                        message.to_string()
                    } else {
                        format!(
                            "{message}: {}",
                            preview(&detail, self.policy.short_reply_threshold)
                        )
                    };
                    out.push(ShapedReply::new(Destination::Channel, attribute(body)));
                }
                if primary_private {
                    out.push(ShapedReply::new(
                        Destination::PrivateLog,
                        format!("{message}: {full}"),
                    ));
                } else if to_private {
                    out.push(ShapedReply::new(
                        Destination::PrivateLog,
                        format!("{message}: {full}\n{}", source.archive_link),
                    ));
                }
                if to_log {
                    out.push(ShapedReply::new(
                        Destination::Log,
                        format!("{}\n```\n{debug}\n```", source.archive_link),
                    ));
                }
            }
            ResultCode::NoSuchCommand => {
                if to_private || primary_private {
                    out.push(ShapedReply::new(
                        Destination::PrivateLog,
                        format!("{NOT_UNDERSTOOD}\nYou said: {}", bracketed(&args.original_arguments)),
                    ));
                }
                if to_log {
                    out.push(ShapedReply::new(
                        Destination::Log,
                        format!(
                            "No such command from {}\nArgs: {}\nLink: {}",
                            source.user.mention(),
                            bracketed(&args.original_arguments),
                            source.archive_link
                        ),
                    ));
                }
            }
            ResultCode::PrintHelp | ResultCode::PrintUsage => {
                let message = result.message.as_str();
                if message.is_empty() {
                    return out;
                }
                if to_channel {
                    let body = if message.chars().count() > self.policy.long_reply_threshold {
                        to_private = true;
                        preview(message, self.policy.long_reply_cut).to_string()
                    } else {
                        message.to_string()
                    };
                    out.push(ShapedReply::new(Destination::Channel, attribute(body)));
                }
                if to_private || primary_private {
                    out.push(ShapedReply::new(Destination::Private, message));
                }
            }
        }

        for reply in &mut out {
            reply.text = match reply.destination {
                Destination::Channel | Destination::Log => sanitize_for_channel(&reply.text),
                Destination::Private | Destination::PrivateLog => sanitize_loose(&reply.text),
            };
        }
        out
    }
}

/// `[a] [b] [c]`, showing token boundaries.
fn bracketed(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| format!("[{t}]"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// At most `max_chars` characters of `s`, cut on a char boundary.
pub fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Neutralize broadcast mentions and leading slash commands.
pub fn sanitize_for_channel(text: &str) -> String {
    let text = text
        .replace("<!channel>", "@\\channel")
        .replace("<!everyone>", "@\\everyone")
        .replace("<!here|@here>", "@\\here")
        .replace("<!here>", "@\\here");
    escape_leading_slash(text)
}

/// Only the slash escape; broadcasts cannot fire in a DM.
pub fn sanitize_loose(text: &str) -> String {
    escape_leading_slash(text.to_string())
}

fn escape_leading_slash(text: String) -> String {
    if text.starts_with('/') {
        format!(".{text}")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{CommandSource, EditPermission};
    use atbot_core::types::{MessageId, UserId};

    const LINK: &str = "https://team.slack.com/archives/C1/p1000";

    fn args(is_private: bool, tokens: &[&str]) -> CommandArguments {
        let channel = if is_private { "D1" } else { "C1" };
        CommandArguments::new(
            tokens.iter().map(|s| s.to_string()).collect(),
            CommandSource {
                message: MessageId::new(channel, "1000.0"),
                user: UserId::from("U1"),
                archive_link: LINK.to_string(),
                is_private,
            },
        )
    }

    fn router(log_enabled: bool) -> ReplyRouter {
        ReplyRouter::new(
            ReplyPolicy {
                long_reply_threshold: 20,
                long_reply_cut: 10,
                short_reply_threshold: 15,
            },
            log_enabled,
        )
    }

    fn dests(replies: &[ShapedReply]) -> Vec<Destination> {
        replies.iter().map(|r| r.destination).collect()
    }

    #[test]
    fn ok_goes_to_channel_with_attribution() {
        let out = router(false).route(&CommandResult::ok("hello"), &args(false, &["echo", "hello"]));
        assert_eq!(out, vec![ShapedReply::new(Destination::Channel, "<@U1>: hello")]);
    }

    #[test]
    fn omit_username_drops_attribution() {
        let result = CommandResult::ok("hello").with_reply_type(ReplyType::OMIT_USERNAME);
        let out = router(false).route(&result, &args(false, &["x"]));
        assert_eq!(out[0].text, "hello");
    }

    #[test]
    fn empty_ok_sends_nothing() {
        assert!(router(true).route(&CommandResult::ok(""), &args(false, &["x"])).is_empty());
    }

    #[test]
    fn long_channel_reply_is_truncated_with_private_copy() {
        let long = "abcdefghijklmnopqrstuvwxyz";
        let out = router(false).route(&CommandResult::ok(long), &args(false, &["x"]));
        assert_eq!(dests(&out), vec![Destination::Channel, Destination::Private]);
        assert_eq!(
            out[0].text,
            "<@U1>: [Reply truncated]\nabcdefghij\u{2026}\n"
        );
        assert_eq!(out[1].text, format!("{long}\n{LINK}"));
    }

    #[test]
    fn private_source_collapses_to_one_reply_without_link() {
        let out = router(false).route(&CommandResult::ok("hello"), &args(true, &["x"]));
        assert_eq!(out, vec![ShapedReply::new(Destination::Private, "hello")]);
    }

    #[test]
    fn failure_is_short_problem_and_logged_when_enabled() {
        let result = CommandResult::failure("nope");
        let out = router(false).route(&result, &args(false, &["x"]));
        assert_eq!(dests(&out), vec![Destination::Channel]);

        let out = router(true).route(&result, &args(false, &["x"]));
        assert_eq!(dests(&out), vec![Destination::Channel, Destination::Log]);
        assert_eq!(out[1].text, format!("nope\n{LINK}"));
    }

    #[test]
    fn error_shows_root_cause_in_channel_and_detail_privately() {
        let err = anyhow::anyhow!("connection reset by peer while reading")
            .context("fetching feed");
        let result = CommandResult::error("Feed failed", err);
        let out = router(true).route(&result, &args(false, &["feed"]));
        assert_eq!(
            dests(&out),
            vec![Destination::Channel, Destination::PrivateLog, Destination::Log]
        );
        assert_eq!(out[0].text, "<@U1>: Feed failed: connection rese");
        assert!(out[1].text.starts_with("Feed failed: fetching feed: connection reset"));
        assert!(out[1].text.ends_with(LINK));
        assert!(out[2].text.starts_with(&format!("{LINK}\n```\n")));
    }

    #[test]
    fn short_error_stays_in_channel() {
        let result = CommandResult::error("Oops", anyhow::anyhow!("bad"));
        let out = router(false).route(&result, &args(false, &["x"]));
        assert_eq!(out, vec![ShapedReply::new(Destination::Channel, "<@U1>: Oops: bad")]);
    }

    #[test]
    fn no_such_command_goes_privately_with_tokens() {
        let out = router(true).route(&CommandResult::no_such_command(), &args(false, &["frob", "it"]));
        assert_eq!(dests(&out), vec![Destination::PrivateLog]);
        assert_eq!(
            out[0].text,
            "I didn't quite understand that, sorry.\nYou said: [frob] [it]"
        );
    }

    #[test]
    fn explicit_log_type_reports_unknown_command() {
        let result = CommandResult::no_such_command().with_reply_type(ReplyType::PM | ReplyType::LOG);
        let out = router(true).route(&result, &args(false, &["frob"]));
        assert_eq!(dests(&out), vec![Destination::PrivateLog, Destination::Log]);
        assert_eq!(
            out[1].text,
            format!("No such command from <@U1>\nArgs: [frob]\nLink: {LINK}")
        );
    }

    #[test]
    fn usage_is_private_and_help_is_public() {
        let out = router(false).route(&CommandResult::usage("usage: x"), &args(false, &["x"]));
        assert_eq!(dests(&out), vec![Destination::Private]);

        let out = router(false).route(
            &CommandResult::help("help text").with_edit(EditPermission::Default),
            &args(false, &["help"]),
        );
        assert_eq!(out, vec![ShapedReply::new(Destination::Channel, "<@U1>: help text")]);
    }

    #[test]
    fn sanitizing_neutralizes_broadcasts_and_slash() {
        assert_eq!(
            sanitize_for_channel("<!channel> <!everyone> <!here|@here> <!here>"),
            "@\\channel @\\everyone @\\here @\\here"
        );
        assert_eq!(sanitize_for_channel("/kick me"), "./kick me");
        assert_eq!(sanitize_loose("/kick <!channel>"), "./kick <!channel>");
    }

    #[test]
    fn private_reply_escapes_leading_slash() {
        let out = router(false).route(&CommandResult::ok("/remind me"), &args(true, &["x"]));
        assert_eq!(out[0].text, "./remind me");
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 7), "héllo w");
        assert_eq!(preview("short", 10), "short");
    }
}
