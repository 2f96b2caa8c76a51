use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    // Discord lookups
    #[error("Discord API error: {message}")]
    Discord { message: String },

    #[error("Channel not found: {id}")]
    ChannelNotFound { id: String },

    #[error("Channel {id} is not a text channel")]
    NotTextChannel { id: String },

    #[error("User not found: {name}")]
    UserNotFound { name: String },

    #[error("Role not found: {name}")]
    RoleNotFound { name: String },

    #[error("Guild not found: {id}")]
    GuildNotFound { id: String },

    // Command syntax errors
    #[error("Invalid duration: '{input}'")]
    InvalidDuration { input: String },

    #[error("Missing argument for '{command}'")]
    MissingArgument { command: String },

    #[error("Not a valid ID: '{input}'")]
    UnknownId { input: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Whether the error means a remote entity could not be resolved.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BotError::ChannelNotFound { .. }
                | BotError::NotTextChannel { .. }
                | BotError::UserNotFound { .. }
                | BotError::RoleNotFound { .. }
                | BotError::GuildNotFound { .. }
        )
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
