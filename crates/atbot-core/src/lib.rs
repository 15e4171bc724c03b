//! Shared identifiers, configuration and error types for every atbot crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::AtbotConfig;
pub use error::{AtbotError, Result};
pub use types::{ChannelId, MessageId, MessageTs, UserId};
