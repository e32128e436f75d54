use thiserror::Error;

/// Failures that surface at the command boundary.
///
/// Everything below this boundary uses `anyhow`; handlers convert into one of
/// these so the reply shown to the user is chosen in one place.
#[derive(Error, Debug)]
pub enum BotError {
    /// One source could not be fetched or parsed. Logged, never shown.
    #[error("fetching {source_name} failed: {reason}")]
    FetchFailure { source_name: String, reason: String },

    /// Every source came back empty.
    #[error("no news found")]
    NoNewsFound,

    /// A member without administrator rights used an admin command.
    #[error("administrator permission required")]
    PermissionDenied,

    /// An admin command was used outside a server.
    #[error("this command can only be used in a server")]
    NotInGuild,

    /// Anything unexpected while handling a command.
    #[error("interaction failed: {0:#}")]
    InteractionFailure(#[from] anyhow::Error),
}

impl BotError {
    /// Text shown to the invoking user
    pub fn user_message(&self) -> &'static str {
        match self {
            BotError::NoNewsFound => "No Brawl Stars news found right now. Try again later!",
            BotError::PermissionDenied => "You need the Administrator permission to use this command.",
            BotError::NotInGuild => "This command can only be used inside a server.",
            BotError::FetchFailure { .. } | BotError::InteractionFailure(_) => {
                "Something went wrong while handling this command."
            }
        }
    }

    /// Informational outcomes are not logged as errors
    pub fn is_informational(&self) -> bool {
        matches!(self, BotError::NoNewsFound)
    }
}
