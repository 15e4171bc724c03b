use dashmap::DashMap;

use atbot_core::config::EmojiConfig;

use crate::result::ResultCode;

pub const EMOJI_HI: &str = "emoji-hi";
pub const EMOJI_OK: &str = "emoji-ok";
pub const EMOJI_FAIL: &str = "emoji-fail";
pub const EMOJI_ERROR: &str = "emoji-error";
pub const EMOJI_UNKNOWN: &str = "emoji-unknown";
pub const EMOJI_USAGE: &str = "emoji-usage";
pub const EMOJI_HELP: &str = "emoji-help";

/// Fixed markers, not configurable.
pub const EDIT_MARKER: &str = "fast_forward";
pub const UNDO_MARKER: &str = "leftwards_arrow_with_hook";
pub const NEGATIVE_MARKER: &str = "x";

const EMOJI_DEFAULTS: [(&str, &str); 7] = [
    (EMOJI_HI, "wave"),
    (EMOJI_OK, "white_check_mark"),
    (EMOJI_FAIL, "negative_squared_cross_mark"),
    (EMOJI_ERROR, "warning"),
    (EMOJI_UNKNOWN, "question"),
    (EMOJI_USAGE, "confused"),
    (EMOJI_HELP, "memo"),
];

/// Config key holding the reaction for a result code.
pub fn emoji_key(code: ResultCode) -> &'static str {
    match code {
        ResultCode::Ok => EMOJI_OK,
        ResultCode::Failure => EMOJI_FAIL,
        ResultCode::Error => EMOJI_ERROR,
        ResultCode::NoSuchCommand => EMOJI_UNKNOWN,
        ResultCode::PrintUsage => EMOJI_USAGE,
        ResultCode::PrintHelp => EMOJI_HELP,
    }
}

/// Per-module key/value settings.
pub trait ModuleConfig: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    /// Register `key` with a default. An existing value is kept.
    fn add(&self, key: &str, default: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryModuleConfig {
    values: DashMap<String, String>,
}

impl InMemoryModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModuleConfig for InMemoryModuleConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn add(&self, key: &str, default: &str) {
        self.values
            .entry(key.to_string())
            .or_insert_with(|| default.to_string());
    }
}

/// Register every emoji key with its default.
pub fn register_emoji_defaults(config: &dyn ModuleConfig) {
    for (key, default) in EMOJI_DEFAULTS {
        config.add(key, default);
    }
}

/// Apply `[commands.emoji]` overrides from the process configuration.
pub fn apply_emoji_overrides(config: &dyn ModuleConfig, emoji: &EmojiConfig) {
    for (short, value) in emoji.overrides() {
        config.set(&format!("emoji-{short}"), value);
    }
}
