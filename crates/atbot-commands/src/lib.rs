//! `atbot-commands`: the command message lifecycle engine.
//!
//! A chat message that mentions the bot (or any direct message) is parsed
//! into a [`parser::ParsedIntent`], tracked in a [`tracker::CommandTracker`]
//! entry, dispatched, and answered. When the user later edits the message the
//! [`lifecycle::CommandLifecycle`] re-parses it and either ignores the edit,
//! re-dispatches the command, or undoes it, updating the replies and emoji
//! reactions it already produced instead of posting new ones.
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `parser`    | mention detection, shell-like tokenizing, `&N` blocks   |
//! | `tracker`   | per-message state with per-entry locks, retention sweep |
//! | `reactions` | emoji diff + fire-and-forget reconciliation             |
//! | `reply`     | destination selection, truncation, sanitizing           |
//! | `lifecycle` | initial / edit / undo state machine                     |
//! | `module`    | enable/disable, janitor generation counter              |

pub mod builtin;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod module;
pub mod parser;
pub mod reactions;
pub mod reply;
pub mod result;
pub mod tracker;

pub use config::{InMemoryModuleConfig, ModuleConfig};
pub use dispatch::{CommandRegistry, Dispatcher, SubCommand};
pub use lifecycle::{CommandLifecycle, LifecycleOptions};
pub use module::CommandModule;
pub use parser::{AddressingContext, MessageParser, ParsedIntent, TokenizeError};
pub use result::{
    CommandArguments, CommandResult, CommandSource, EditPermission, ReplyType, ResultCode,
};
pub use tracker::{CommandTracker, TrackedCommand};
