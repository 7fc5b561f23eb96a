use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no such session: {0}")]
    UnknownSession(String),

    #[error("session already exists: {0}")]
    SessionExists(String),

    #[error("roster for request {0} is already closed")]
    RosterClosed(String),

    #[error("coordinator failover exhausted for session {0}")]
    FailoverExhausted(String),

    #[error(transparent)]
    Musig(#[from] musig2_lotus_core::error::MusigError),

    #[error(transparent)]
    Router(#[from] musig2_lotus_router::error::RouterError),

    #[error(transparent)]
    Security(#[from] musig2_lotus_security::error::SecurityError),

    #[error("transport error: {0}")]
    Transport(String),
}
