use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("message exceeds the {0}-byte size cap")]
    OversizedMessage(usize),

    #[error("timestamp is more than the allowed skew from local time")]
    TimestampSkew,

    #[error("payload has expired")]
    Expired,

    #[error("self-signature verification failed")]
    SignatureVerificationFailed,

    #[error("peer {0} exceeded its rate limit: {1}")]
    RateLimited(String, &'static str),

    #[error("sequence number for peer {0} was not strictly increasing")]
    ReplayDetected(String),

    #[error("peer {0} is banned")]
    Banned(String),
}
