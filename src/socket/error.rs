use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("control channel unreachable: {0}")]
    Connect(String),
    #[error("frame sent while disconnected")]
    NotConnected,
    #[error("websocket error: {0}")]
    WebSocket(String),
}

pub type Result<T> = std::result::Result<T, SocketError>;
