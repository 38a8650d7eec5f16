use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Value errors
    #[error("Invalid tag identifier: {0}")]
    InvalidTag(String),

    #[error("Invalid step direction code: {code}")]
    InvalidDirection { code: u8 },

    #[error("Invalid lock state code: {code}")]
    InvalidLockState { code: u8 },

    #[error("Invalid time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("Invalid distance: {0}")]
    InvalidDistance(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
