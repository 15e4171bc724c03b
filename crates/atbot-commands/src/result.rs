use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use atbot_core::types::{MessageId, UserId};

/// Outcome class of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    Ok,
    /// The command ran and refused (bad input, not permitted, nothing to do).
    Failure,
    /// The command broke. Carries an error chain.
    Error,
    NoSuchCommand,
    PrintUsage,
    PrintHelp,
}

impl ResultCode {
    /// Where replies go when the handler did not choose explicitly.
    pub fn default_reply_type(self) -> ReplyType {
        match self {
            ResultCode::Ok | ResultCode::PrintHelp => ReplyType::IN_CHANNEL,
            ResultCode::Failure | ResultCode::Error => ReplyType::SHORT_PROBLEM,
            ResultCode::NoSuchCommand | ResultCode::PrintUsage => ReplyType::PM,
        }
    }

    /// Whether an edit re-dispatches by default. Only answers that are safe
    /// to recompute (unknown command, usage, help, refusals) qualify.
    pub fn default_editable(self) -> bool {
        !matches!(self, ResultCode::Ok | ResultCode::Error)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultCode::Ok => "ok",
            ResultCode::Failure => "failure",
            ResultCode::Error => "error",
            ResultCode::NoSuchCommand => "no_such_command",
            ResultCode::PrintUsage => "print_usage",
            ResultCode::PrintHelp => "print_help",
        };
        f.write_str(s)
    }
}

/// Bitmask of reply destinations plus formatting flags.
///
/// A value with no destination bits set means "use the result code's
/// default" (see [`ResultCode::default_reply_type`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReplyType(u8);

impl ReplyType {
    pub const NONE: ReplyType = ReplyType(0);
    pub const IN_CHANNEL: ReplyType = ReplyType(1 << 0);
    pub const PM: ReplyType = ReplyType(1 << 1);
    pub const LOG: ReplyType = ReplyType(1 << 2);
    /// Short public notice with the full detail going to the audit log.
    pub const SHORT_PROBLEM: ReplyType = ReplyType(Self::IN_CHANNEL.0 | Self::LOG.0);
    /// Do not prefix channel replies with the author's mention.
    pub const OMIT_USERNAME: ReplyType = ReplyType(1 << 4);

    const DESTINATIONS: u8 = Self::IN_CHANNEL.0 | Self::PM.0 | Self::LOG.0;

    pub fn contains(self, other: ReplyType) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    /// Only the destination bits.
    pub fn destinations(self) -> ReplyType {
        ReplyType(self.0 & Self::DESTINATIONS)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ReplyType {
    type Output = ReplyType;

    fn bitor(self, rhs: ReplyType) -> ReplyType {
        ReplyType(self.0 | rhs.0)
    }
}

impl BitOrAssign for ReplyType {
    fn bitor_assign(&mut self, rhs: ReplyType) {
        self.0 |= rhs.0;
    }
}

/// A handler's override of the per-code edit default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPermission {
    #[default]
    Default,
    ForceAllow,
    ForceForbid,
}

/// What a handler returns for one dispatch.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub code: ResultCode,
    /// Human-readable reply text. May be empty (reaction only).
    pub message: String,
    /// Present for [`ResultCode::Error`].
    pub err: Option<Arc<anyhow::Error>>,
    /// The handler implements undo for this result.
    pub can_undo: bool,
    pub can_edit: EditPermission,
    pub reply_type: ReplyType,
    /// Opaque state handed back to the handler on edit and undo.
    pub module_data: Option<serde_json::Value>,
}

impl CommandResult {
    fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            err: None,
            can_undo: false,
            can_edit: EditPermission::Default,
            reply_type: ReplyType::NONE,
            module_data: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Ok, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Failure, message)
    }

    pub fn error(message: impl Into<String>, err: anyhow::Error) -> Self {
        let mut result = Self::new(ResultCode::Error, message);
        result.err = Some(Arc::new(err));
        result
    }

    pub fn no_such_command() -> Self {
        Self::new(ResultCode::NoSuchCommand, "")
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(ResultCode::PrintUsage, message)
    }

    pub fn help(message: impl Into<String>) -> Self {
        Self::new(ResultCode::PrintHelp, message)
    }

    pub fn with_undo(mut self) -> Self {
        self.can_undo = true;
        self
    }

    pub fn with_edit(mut self, permission: EditPermission) -> Self {
        self.can_edit = permission;
        self
    }

    pub fn with_reply_type(mut self, reply_type: ReplyType) -> Self {
        self.reply_type = reply_type;
        self
    }

    pub fn with_module_data(mut self, data: serde_json::Value) -> Self {
        self.module_data = Some(data);
        self
    }

    /// Effective reply type: the handler's choice, or the code default when
    /// no destination was chosen. Formatting flags are kept either way.
    pub fn effective_reply_type(&self) -> ReplyType {
        if self.reply_type.destinations().is_empty() {
            self.reply_type | self.code.default_reply_type()
        } else {
            self.reply_type
        }
    }

    /// Whether an edit of the message that produced this result may
    /// re-dispatch. Errors are never editable.
    pub fn edit_allowed(&self) -> bool {
        if self.code == ResultCode::Error {
            return false;
        }
        match self.can_edit {
            EditPermission::ForceAllow => true,
            EditPermission::ForceForbid => false,
            EditPermission::Default => self.code.default_editable(),
        }
    }
}

/// Where a command came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSource {
    pub message: MessageId,
    pub user: UserId,
    pub archive_link: String,
    /// The command arrived in the user's direct-message conversation.
    pub is_private: bool,
}

/// Everything a handler receives.
#[derive(Debug, Clone)]
pub struct CommandArguments {
    /// Arguments still to be consumed. The registry strips the command name.
    pub arguments: Vec<String>,
    /// Full token list as parsed, never shifted.
    pub original_arguments: Vec<String>,
    /// Name of the command being run; empty before dispatch.
    pub command: String,
    pub source: CommandSource,
    pub is_edit: bool,
    pub is_undo: bool,
    /// The result being replaced, on edit and undo.
    pub previous_result: Option<Box<CommandResult>>,
    pub module_data: Option<serde_json::Value>,
}

impl CommandArguments {
    pub fn new(arguments: Vec<String>, source: CommandSource) -> Self {
        Self {
            original_arguments: arguments.clone(),
            arguments,
            command: String::new(),
            source,
            is_edit: false,
            is_undo: false,
            previous_result: None,
            module_data: None,
        }
    }

    /// Consume the first argument as the command name.
    pub fn shifted(&self, command: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.command = command.into();
        if !next.arguments.is_empty() {
            next.arguments.remove(0);
        }
        next
    }

    /// Carry the previous dispatch's result and module state into this one.
    pub fn replacing(mut self, previous: &CommandResult) -> Self {
        self.module_data = previous.module_data.clone();
        self.previous_result = Some(Box::new(previous.clone()));
        self
    }
}
