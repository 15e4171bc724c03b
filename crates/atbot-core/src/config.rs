use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// How long a command message stays editable (seconds).
pub const DEFAULT_RETENTION_SECS: u64 = 2 * 60 * 60;
/// Janitor cadence (seconds).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30 * 60;
/// Edit notifications can arrive before the edited message is visible.
pub const DEFAULT_EDIT_DELAY_MS: u64 = 50;

pub const DEFAULT_LONG_REPLY_THRESHOLD: usize = 800;
pub const DEFAULT_LONG_REPLY_CUT: usize = 500;
pub const DEFAULT_SHORT_REPLY_THRESHOLD: usize = 150;

/// Top-level config (atbot.toml + ATBOT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtbotConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Slack workspace credentials and identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-…`) used for every Web API call.
    #[serde(default)]
    pub bot_token: String,
    /// Signing secret used to verify Events API requests.
    /// When empty, signature verification is skipped (local testing only).
    #[serde(default)]
    pub signing_secret: String,
    /// Leftmost component of the workspace domain, used for archive links.
    #[serde(default)]
    pub team_domain: String,
    /// The bot's own user ID; mentions of it address the bot.
    #[serde(default)]
    pub bot_user_id: String,
    /// Audit channel receiving the `log` reply destination.
    pub log_channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_edit_delay_ms")]
    pub edit_delay_ms: u64,
    #[serde(default = "default_long_reply_threshold")]
    pub long_reply_threshold: usize,
    #[serde(default = "default_long_reply_cut")]
    pub long_reply_cut: usize,
    #[serde(default = "default_short_reply_threshold")]
    pub short_reply_threshold: usize,
    /// Emoji name overrides, keyed by short name (`hi`, `ok`, `fail`, …).
    #[serde(default)]
    pub emoji: EmojiConfig,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            edit_delay_ms: DEFAULT_EDIT_DELAY_MS,
            long_reply_threshold: DEFAULT_LONG_REPLY_THRESHOLD,
            long_reply_cut: DEFAULT_LONG_REPLY_CUT,
            short_reply_threshold: DEFAULT_SHORT_REPLY_THRESHOLD,
            emoji: EmojiConfig::default(),
        }
    }
}

/// Optional emoji overrides. Unset entries keep the module defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmojiConfig {
    pub hi: Option<String>,
    pub ok: Option<String>,
    pub fail: Option<String>,
    pub error: Option<String>,
    pub unknown: Option<String>,
    pub usage: Option<String>,
    pub help: Option<String>,
}

impl EmojiConfig {
    /// Overrides as `(short name, emoji)` pairs, skipping unset entries.
    pub fn overrides(&self) -> Vec<(&'static str, &str)> {
        [
            ("hi", &self.hi),
            ("ok", &self.ok),
            ("fail", &self.fail),
            ("error", &self.error),
            ("unknown", &self.unknown),
            ("usage", &self.usage),
            ("help", &self.help),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_retention_secs() -> u64 {
    DEFAULT_RETENTION_SECS
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_edit_delay_ms() -> u64 {
    DEFAULT_EDIT_DELAY_MS
}
fn default_long_reply_threshold() -> usize {
    DEFAULT_LONG_REPLY_THRESHOLD
}
fn default_long_reply_cut() -> usize {
    DEFAULT_LONG_REPLY_CUT
}
fn default_short_reply_threshold() -> usize {
    DEFAULT_SHORT_REPLY_THRESHOLD
}

impl AtbotConfig {
    /// Load config from a TOML file with ATBOT_* env var overrides.
    ///
    /// Nested keys use a double underscore: `ATBOT_SLACK__BOT_TOKEN`.
    /// Falls back to `~/.atbot/atbot.toml` when no path is given.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AtbotConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ATBOT_").split("__"))
            .extract()
            .map_err(|e| crate::error::AtbotError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Reject configs the bot cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.slack.bot_token.is_empty() {
            return Err(crate::error::AtbotError::MissingSetting("slack.bot_token"));
        }
        // Without it no message can ever address the bot.
        if self.slack.bot_user_id.is_empty() {
            return Err(crate::error::AtbotError::MissingSetting("slack.bot_user_id"));
        }
        if self.commands.sweep_interval_secs == 0 {
            return Err(crate::error::AtbotError::Config(
                "commands.sweep_interval_secs must be at least 1".into(),
            ));
        }
        if self.commands.long_reply_cut > self.commands.long_reply_threshold {
            return Err(crate::error::AtbotError::Config(
                "commands.long_reply_cut exceeds commands.long_reply_threshold".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.atbot/atbot.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_sections_take_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[slack]\nbot_token = \"xoxb-test\"\nbot_user_id = \"UBOT\"\n\n[commands.emoji]\nok = \"thumbsup\""
        )
        .unwrap();

        let cfg = AtbotConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.slack.bot_token, "xoxb-test");
        assert_eq!(cfg.slack.bot_user_id, "UBOT");
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert_eq!(cfg.commands.retention_secs, DEFAULT_RETENTION_SECS);
        assert_eq!(cfg.commands.edit_delay_ms, DEFAULT_EDIT_DELAY_MS);
        assert_eq!(cfg.commands.emoji.overrides(), vec![("ok", "thumbsup")]);
    }

    #[test]
    fn nonexistent_file_yields_defaults() {
        let cfg = AtbotConfig::load(Some("/nonexistent/atbot.toml")).unwrap();
        assert_eq!(cfg.gateway.bind, DEFAULT_BIND);
        assert!(cfg.slack.log_channel.is_none());
    }

    #[test]
    fn validate_requires_identity() {
        let mut cfg = AtbotConfig::default();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "MISSING_SETTING");

        cfg.slack.bot_token = "xoxb-test".into();
        cfg.slack.bot_user_id = "UBOT".into();
        cfg.validate().unwrap();

        cfg.commands.long_reply_cut = cfg.commands.long_reply_threshold + 1;
        assert_eq!(cfg.validate().unwrap_err().code(), "CONFIG_ERROR");
    }

    #[test]
    fn validate_rejects_zero_sweep_interval() {
        let mut cfg = AtbotConfig::default();
        cfg.slack.bot_token = "xoxb-test".into();
        cfg.slack.bot_user_id = "UBOT".into();
        cfg.commands.sweep_interval_secs = 0;

        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("sweep_interval_secs"));
    }
}
