//! Command message lifecycle: first sight, edit, undo.
//!
//! Every addressed message gets a tracker entry. Processing of one entry is
//! serialized by the entry lock, which is taken before the entry is published
//! so an edit racing the initial dispatch waits for it. Reaction requests run
//! as separate tasks and are awaited before the lock is released.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use atbot_channels::types::{ChatMessage, MessageEdit};
use atbot_channels::ChatTransport;
use atbot_core::config::CommandsConfig;
use atbot_core::types::{ChannelId, MessageId, UserId};

use crate::config::{
    emoji_key, ModuleConfig, EDIT_MARKER, EMOJI_HI, NEGATIVE_MARKER, UNDO_MARKER,
};
use crate::dispatch::Dispatcher;
use crate::parser::{AddressingContext, MessageParser, ParsedIntent};
use crate::reactions::{reconcile, ReactionEffect};
use crate::reply::{Destination, ReplyPolicy, ReplyRouter, ShapedReply};
use crate::result::{CommandArguments, CommandResult, CommandSource, ResultCode};
use crate::tracker::{CommandTracker, EntryHandle, SentReply, TrackedCommand};

pub const REMOVED: &str = "(removed)";

#[derive(Debug, Clone, Default)]
pub struct LifecycleOptions {
    /// Pause before handling an edit notification.
    pub edit_delay: Duration,
    pub policy: ReplyPolicy,
    /// Audit channel for the log destination.
    pub log_channel: Option<ChannelId>,
}

impl LifecycleOptions {
    pub fn from_config(cfg: &CommandsConfig, log_channel: Option<ChannelId>) -> Self {
        Self {
            edit_delay: Duration::from_millis(cfg.edit_delay_ms),
            policy: ReplyPolicy::from(cfg),
            log_channel,
        }
    }
}

pub struct CommandLifecycle {
    parser: MessageParser,
    tracker: Arc<CommandTracker>,
    transport: Arc<dyn ChatTransport>,
    dispatcher: Arc<dyn Dispatcher>,
    config: Arc<dyn ModuleConfig>,
    router: ReplyRouter,
    log_channel: Option<ChannelId>,
    edit_delay: Duration,
}

impl CommandLifecycle {
    pub fn new(
        bot_user: &UserId,
        tracker: Arc<CommandTracker>,
        transport: Arc<dyn ChatTransport>,
        dispatcher: Arc<dyn Dispatcher>,
        config: Arc<dyn ModuleConfig>,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            parser: MessageParser::new(bot_user),
            tracker,
            transport,
            dispatcher,
            config,
            router: ReplyRouter::new(options.policy, options.log_channel.is_some()),
            log_channel: options.log_channel,
            edit_delay: options.edit_delay,
        }
    }

    pub fn tracker(&self) -> &Arc<CommandTracker> {
        &self.tracker
    }

    #[instrument(skip_all, fields(channel = %msg.channel, ts = %msg.ts))]
    pub async fn handle_message(&self, msg: &ChatMessage) {
        let intent = self.parse(msg);
        if !intent.is_addressed() {
            return;
        }

        let now = Utc::now();
        let entry: EntryHandle = Arc::new(Mutex::new(TrackedCommand::new(msg.clone(), intent, now)));
        let mut cmd = entry.lock().await;
        self.tracker.insert(msg.id(), Arc::clone(&entry), now);

        let effects = TaskTracker::new();
        if cmd.intent.greeting_only {
            debug!("greeting");
            let desired = self.greeting_reaction(msg.id(), &cmd.intent);
            reconcile(&self.transport, &effects, &mut cmd.reactions, desired);
        } else {
            self.dispatch_fresh(&mut cmd, msg, &effects).await;
        }

        effects.close();
        effects.wait().await;
    }

    #[instrument(skip_all, fields(channel = %edit.channel, ts = %edit.ts))]
    pub async fn handle_edit(&self, edit: &MessageEdit) {
        if !self.edit_delay.is_zero() {
            tokio::time::sleep(self.edit_delay).await;
        }

        let msg = edit.as_message();
        let intent = self.parse(&msg);

        let Some(entry) = self.tracker.lookup(&edit.id()) else {
            if intent.is_command() {
                debug!("edit of an untracked command");
                let link = self.transport.archive_url(&edit.id());
                let text = format!(
                    "Oops, I seem to have forgotten about that one. \
                     I can only cope with edits of recent messages. {link}"
                );
                self.notify_private(&edit.editor, &text).await;
            }
            return;
        };

        let mut cmd = entry.lock().await;
        cmd.latest_edit = Some(edit.clone());
        if intent == cmd.intent {
            debug!("edit did not change the command");
            return;
        }
        cmd.intent = intent;

        let effects = TaskTracker::new();
        match (cmd.found_command, cmd.intent.is_command()) {
            (false, true) => self.dispatch_fresh(&mut cmd, &msg, &effects).await,
            (false, false) => {
                let desired = self.greeting_reaction(msg.id(), &cmd.intent);
                reconcile(&self.transport, &effects, &mut cmd.reactions, desired);
            }
            (true, false) => self.undo_command(&mut cmd, &msg, &effects).await,
            (true, true) => self.edit_command(&mut cmd, &msg, &effects).await,
        }

        effects.close();
        effects.wait().await;
    }

    fn parse(&self, msg: &ChatMessage) -> ParsedIntent {
        self.parser
            .parse(&msg.text, &AddressingContext::for_channel(&msg.channel))
    }

    fn emoji(&self, key: &str) -> String {
        self.config.get(key).unwrap_or_default()
    }

    fn greeting_reaction(&self, message: MessageId, intent: &ParsedIntent) -> Vec<ReactionEffect> {
        if intent.greeting_only {
            vec![ReactionEffect::new(message, self.emoji(EMOJI_HI))]
        } else {
            Vec::new()
        }
    }

    fn result_reaction(&self, message: MessageId, code: ResultCode) -> ReactionEffect {
        ReactionEffect::new(message, self.emoji(emoji_key(code)))
    }

    fn source_for(&self, msg: &ChatMessage) -> CommandSource {
        let id = msg.id();
        CommandSource {
            archive_link: self.transport.archive_url(&id),
            message: id,
            user: msg.user.clone(),
            is_private: msg.channel.is_im(),
        }
    }

    async fn run(&self, intent: &ParsedIntent, args: &CommandArguments) -> CommandResult {
        if let Some(err) = &intent.tokenize_error {
            debug!(error = %err, "could not tokenize command");
            return CommandResult::failure(err.to_string());
        }
        self.dispatch(args).await
    }

    async fn dispatch(&self, args: &CommandArguments) -> CommandResult {
        debug!(
            args = ?args.arguments,
            is_edit = args.is_edit,
            is_undo = args.is_undo,
            "dispatching"
        );
        let result = self.dispatcher.dispatch(args).await;
        info!(
            user = %args.source.user,
            code = %result.code,
            is_edit = args.is_edit,
            is_undo = args.is_undo,
            "command finished"
        );
        result
    }

    /// First dispatch of a message that is (now) a command.
    async fn dispatch_fresh(&self, cmd: &mut TrackedCommand, msg: &ChatMessage, effects: &TaskTracker) {
        cmd.found_command = true;
        cmd.was_undone = false;

        let arguments = cmd.intent.arguments.clone().unwrap_or_default();
        let args = CommandArguments::new(arguments, self.source_for(msg));
        let result = self.run(&cmd.intent, &args).await;

        let desired = vec![self.result_reaction(msg.id(), result.code)];
        reconcile(&self.transport, effects, &mut cmd.reactions, desired);

        let replies = self.shape(&result, &args, &cmd.intent);
        self.deliver(cmd, replies, msg).await;

        cmd.args = Some(args);
        cmd.result = Some(result);
    }

    /// The message is still a command but its text changed.
    async fn edit_command(&self, cmd: &mut TrackedCommand, msg: &ChatMessage, effects: &TaskTracker) {
        let Some(previous) = cmd.result.clone() else {
            self.dispatch_fresh(cmd, msg, effects).await;
            return;
        };
        let link = self.transport.archive_url(&msg.id());

        if previous.code == ResultCode::Error {
            match &cmd.channel_reply {
                Some(sent) => {
                    let text = format!(
                        "{}: You may not edit a command that resulted in an error. \
                         Repeat the corrected command in a new message.",
                        editor(cmd, msg).mention()
                    );
                    self.post(&sent.message.channel, &text).await;
                }
                None => {
                    let text = format!(
                        "For safety, you cannot edit a command that resulted in an error. {link}"
                    );
                    self.notify_private(&editor(cmd, msg), &text).await;
                }
            }
            self.add_negative_marker(cmd, msg, effects);
            return;
        }

        if !previous.edit_allowed() {
            debug!(code = %previous.code, "edit refused");
            let text = format!("That command does not support editing. {link}");
            self.notify_private(&editor(cmd, msg), &text).await;
            self.add_negative_marker(cmd, msg, effects);
            return;
        }

        let arguments = cmd.intent.arguments.clone().unwrap_or_default();
        let mut args = CommandArguments::new(arguments, self.source_for(msg)).replacing(&previous);
        args.is_edit = true;
        let result = self.run(&cmd.intent, &args).await;

        let desired = vec![
            self.result_reaction(msg.id(), result.code),
            ReactionEffect::new(msg.id(), EDIT_MARKER),
        ];
        reconcile(&self.transport, effects, &mut cmd.reactions, desired);

        let replies = self.shape(&result, &args, &cmd.intent);
        let touched = self.deliver(cmd, replies, msg).await;
        for (destination, slot) in [
            (Destination::Channel, &mut cmd.channel_reply),
            (Destination::Private, &mut cmd.private_reply),
            (Destination::PrivateLog, &mut cmd.private_log_reply),
        ] {
            if touched.contains(&destination) {
                continue;
            }
            if let Some(mut sent) = slot.take() {
                self.rewrite(&mut sent, REMOVED).await;
            }
        }

        cmd.args = Some(args);
        cmd.result = Some(result);
    }

    /// The message was a command and no longer is.
    async fn undo_command(&self, cmd: &mut TrackedCommand, msg: &ChatMessage, effects: &TaskTracker) {
        let desired = self.greeting_reaction(msg.id(), &cmd.intent);
        let Some(previous) = cmd.result.clone() else {
            reconcile(&self.transport, effects, &mut cmd.reactions, desired);
            cmd.found_command = false;
            return;
        };
        let link = self.transport.archive_url(&msg.id());

        match previous.code {
            ResultCode::NoSuchCommand | ResultCode::PrintUsage | ResultCode::PrintHelp => {
                for sent in [
                    cmd.channel_reply.as_mut(),
                    cmd.private_reply.as_mut(),
                    cmd.private_log_reply.as_mut(),
                ]
                .into_iter()
                .flatten()
                {
                    self.rewrite(sent, REMOVED).await;
                }
            }
            ResultCode::Error => {
                let text = format!(
                    "For safety, you cannot undo a command that resulted in an error. {link}"
                );
                self.refuse_undo(cmd, msg, effects, &text).await;
                return;
            }
            ResultCode::Ok | ResultCode::Failure if previous.can_undo => {
                self.redispatch_undo(cmd, msg, effects, &previous, desired).await;
                return;
            }
            ResultCode::Ok | ResultCode::Failure => {
                let text = format!("That command does not support undo. {link}");
                self.refuse_undo(cmd, msg, effects, &text).await;
                return;
            }
        }

        reconcile(&self.transport, effects, &mut cmd.reactions, desired);
        cmd.was_undone = true;
        cmd.found_command = false;
    }

    /// Ask the handler to reverse an opted-in result.
    async fn redispatch_undo(
        &self,
        cmd: &mut TrackedCommand,
        msg: &ChatMessage,
        effects: &TaskTracker,
        previous: &CommandResult,
        mut desired: Vec<ReactionEffect>,
    ) {
        let base = cmd
            .args
            .clone()
            .unwrap_or_else(|| CommandArguments::new(Vec::new(), self.source_for(msg)));
        let mut args = base.replacing(previous);
        args.source = self.source_for(msg);
        args.is_edit = false;
        args.is_undo = true;

        let result = self.dispatch(&args).await;

        desired.push(self.result_reaction(msg.id(), result.code));
        desired.push(ReactionEffect::new(msg.id(), UNDO_MARKER));
        reconcile(&self.transport, effects, &mut cmd.reactions, desired);

        let replies = self.shape(&result, &args, &cmd.intent);
        let touched = self.deliver(cmd, replies, msg).await;
        if !touched.contains(&Destination::Channel) {
            if let Some(sent) = cmd.channel_reply.as_mut() {
                let text = format!("(command removed) {}", sent.text);
                self.rewrite(sent, &text).await;
            }
        }

        cmd.was_undone = result.code == ResultCode::Ok;
        cmd.found_command = !cmd.was_undone;
        cmd.args = Some(args);
        cmd.result = Some(result);
    }

    async fn refuse_undo(
        &self,
        cmd: &mut TrackedCommand,
        msg: &ChatMessage,
        effects: &TaskTracker,
        notice: &str,
    ) {
        debug!("undo refused");
        self.notify_private(&editor(cmd, msg), notice).await;
        self.add_negative_marker(cmd, msg, effects);
        cmd.was_undone = false;
    }

    fn add_negative_marker(&self, cmd: &mut TrackedCommand, msg: &ChatMessage, effects: &TaskTracker) {
        let mut desired = cmd.reactions.clone();
        desired.push(ReactionEffect::new(msg.id(), NEGATIVE_MARKER));
        reconcile(&self.transport, effects, &mut cmd.reactions, desired);
    }

    fn shape(
        &self,
        result: &CommandResult,
        args: &CommandArguments,
        intent: &ParsedIntent,
    ) -> Vec<ShapedReply> {
        let mut replies = self.router.route(result, args);
        // A DM that is not a command is just conversation; stay quiet.
        if intent.lenient_full_message && result.code == ResultCode::NoSuchCommand {
            replies.retain(|r| r.destination == Destination::Log);
        }
        replies
    }

    /// Send each reply, updating earlier replies to the same destination in
    /// place. Returns the destinations that received something.
    async fn deliver(
        &self,
        cmd: &mut TrackedCommand,
        replies: Vec<ShapedReply>,
        msg: &ChatMessage,
    ) -> HashSet<Destination> {
        let mut touched = HashSet::new();
        let mut im: Option<ChannelId> = msg.channel.is_im().then(|| msg.channel.clone());

        for reply in replies {
            touched.insert(reply.destination);
            match reply.destination {
                Destination::Channel => {
                    self.upsert(&mut cmd.channel_reply, &msg.channel, reply.text).await;
                }
                Destination::Private | Destination::PrivateLog => {
                    if im.is_none() {
                        im = self.open_im(&msg.user).await;
                    }
                    let Some(im) = &im else { continue };
                    let slot = if reply.destination == Destination::Private {
                        &mut cmd.private_reply
                    } else {
                        &mut cmd.private_log_reply
                    };
                    self.upsert(slot, im, reply.text).await;
                }
                Destination::Log => {
                    let Some(log) = &self.log_channel else { continue };
                    if let Some(message) = self.post(log, &reply.text).await {
                        cmd.log_reply = Some(SentReply {
                            message,
                            text: reply.text,
                        });
                    }
                }
            }
        }
        touched
    }

    async fn upsert(&self, slot: &mut Option<SentReply>, channel: &ChannelId, text: String) {
        if let Some(sent) = slot.as_mut() {
            if sent.text != text {
                self.rewrite(sent, &text).await;
            }
            return;
        }
        if let Some(message) = self.post(channel, &text).await {
            *slot = Some(SentReply { message, text });
        }
    }

    async fn rewrite(&self, sent: &mut SentReply, text: &str) {
        match self.transport.update_message(&sent.message, text).await {
            Ok(()) => sent.text = text.to_string(),
            Err(e) => warn!(message = %sent.message, error = %e, "failed to update reply"),
        }
    }

    async fn post(&self, channel: &ChannelId, text: &str) -> Option<MessageId> {
        match self.transport.post_message(channel, text).await {
            Ok(ts) => Some(MessageId {
                channel: channel.clone(),
                ts,
            }),
            Err(e) => {
                warn!(channel = %channel, error = %e, "failed to post reply");
                None
            }
        }
    }

    async fn open_im(&self, user: &UserId) -> Option<ChannelId> {
        match self.transport.open_im(user).await {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!(user = %user, error = %e, "failed to open direct message");
                None
            }
        }
    }

    async fn notify_private(&self, user: &UserId, text: &str) {
        if let Some(im) = self.open_im(user).await {
            self.post(&im, text).await;
        }
    }
}

/// Whoever made the latest edit; refusal notices go to them.
fn editor(cmd: &TrackedCommand, msg: &ChatMessage) -> UserId {
    cmd.latest_edit
        .as_ref()
        .map(|edit| edit.editor.clone())
        .unwrap_or_else(|| msg.user.clone())
}
