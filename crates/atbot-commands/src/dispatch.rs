use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::result::{CommandArguments, CommandResult};

/// Runs a parsed command and reports the outcome.
///
/// Implementations never fail: a broken handler is reported as an
/// [`crate::ResultCode::Error`] result.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, args: &CommandArguments) -> CommandResult;
}

/// One named command.
#[async_trait]
pub trait SubCommand: Send + Sync {
    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Receives arguments with the command name already consumed.
    async fn handle(&self, args: &CommandArguments) -> anyhow::Result<CommandResult>;
}

/// Dispatcher routing on the first argument, case-insensitively.
#[derive(Default)]
pub struct CommandRegistry {
    commands: DashMap<String, Arc<dyn SubCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, command: Arc<dyn SubCommand>) {
        let name = name.to_lowercase();
        if self.commands.insert(name.clone(), command).is_some() {
            warn!(command = %name, "command registered twice; keeping the newer one");
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.commands.remove(&name.to_lowercase()).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn help(&self, args: &CommandArguments) -> CommandResult {
        if let Some(topic) = args.arguments.first() {
            let topic = topic.to_lowercase();
            return match self.commands.get(&topic) {
                Some(cmd) => CommandResult::help(format!("`{topic}`: {}", cmd.description())),
                None => CommandResult::usage(format!(
                    "There is no command named `{topic}`. Try `help` for a list."
                )),
            };
        }

        let mut lines = vec!["Commands:".to_string()];
        for name in self.names() {
            if let Some(cmd) = self.commands.get(&name) {
                lines.push(format!("`{name}`: {}", cmd.description()));
            }
        }
        CommandResult::help(lines.join("\n"))
    }
}

#[async_trait]
impl Dispatcher for CommandRegistry {
    async fn dispatch(&self, args: &CommandArguments) -> CommandResult {
        let Some(name) = args.arguments.first().map(|n| n.to_lowercase()) else {
            return CommandResult::no_such_command();
        };
        let sub = args.shifted(name.as_str());

        if name == "help" {
            return self.help(&sub);
        }

        // Clone out of the map so no shard lock is held across the await.
        let Some(command) = self.commands.get(&name).map(|c| Arc::clone(c.value())) else {
            debug!(command = %name, "no such command");
            return CommandResult::no_such_command();
        };

        match command.handle(&sub).await {
            Ok(result) => result,
            Err(e) => {
                warn!(command = %name, error = %e, "command failed");
                CommandResult::error(format!("Command `{name}` failed"), e)
            }
        }
    }
}
