/// Shared error type used across all gateway crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("provider {provider} in cooldown until {until}")]
    ProviderCooldown { provider: String, until: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("sandbox denied: {0}")]
    SandboxDenied(String),

    #[error("session busy: {0}")]
    SessionBusy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("context exhausted: {0}")]
    ContextExhausted(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
