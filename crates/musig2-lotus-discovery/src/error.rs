use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("relay operation failed: {0}")]
    Relay(String),

    #[error("malformed advertisement payload: {0}")]
    Malformed(String),
}
