use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("media gateway returned status {0}")]
    GatewayStatus(u16),
    #[error("media gateway unreachable: {0}")]
    GatewayUnreachable(String),
    #[error("malformed remote description: {0}")]
    MalformedDescription(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;
