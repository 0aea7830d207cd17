/// Core error type for the relay.
///
/// Adapter crates (Telegram, Redis) map their native errors into this type so the
/// flow managers can tell a transient failure from a dead recipient.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    /// The recipient blocked the bot, deleted the conversation or no longer exists.
    #[error("recipient unavailable: {0}")]
    RecipientUnavailable(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether this failure means the recipient can no longer be reached.
    ///
    /// Transports that only surface opaque text are matched on the
    /// "blocked by the user" wording Telegram uses.
    pub fn is_recipient_unavailable(&self) -> bool {
        match self {
            Error::RecipientUnavailable(_) => true,
            Error::External(s) => {
                let lower = s.to_lowercase();
                lower.contains("blocked by the user") || lower.contains("blocked by recipient")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
