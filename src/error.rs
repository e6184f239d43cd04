use thiserror::Error;

/// Error type for the rescue-assist crate
#[derive(Error, Debug)]
pub enum AssistError {
    /// Missing or unusable configuration (API keys). Fatal at construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The caller's position could not be determined. Always recovered into
    /// apology text by the session controller.
    #[error("Location unavailable: {0}")]
    Geolocation(String),

    /// Non-2xx response, network failure or malformed body from a provider.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A provider answered 2xx with a body we could not interpret.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A submission arrived while a previous one was still in flight or
    /// revealing. Send/stop gating means a well-behaved caller never sees it.
    #[error("Session is busy with a previous message")]
    SessionBusy,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AssistError>;
