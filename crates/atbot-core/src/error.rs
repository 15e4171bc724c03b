use thiserror::Error;

#[derive(Debug, Error)]
pub enum AtbotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),
}

impl AtbotError {
    /// Short error code string used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            AtbotError::Config(_) => "CONFIG_ERROR",
            AtbotError::MissingSetting(_) => "MISSING_SETTING",
        }
    }
}

pub type Result<T> = std::result::Result<T, AtbotError>;
