use thiserror::Error;

/// Errors from the frame codec. Scoped to a single message; callers
/// drop the offending message and keep the connection alive.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("short read: connection closed mid-frame")]
    ShortRead,
    #[error("unknown message type {0}")]
    UnknownType(u32),
    #[error("malformed payload for message type {0}: {1}")]
    Malformed(u32, String),
}

/// Errors raised by the entity bus / device model.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("duplicate object_id: {0}")]
    DuplicateObjectId(String),
    #[error("no entity with key {0}")]
    UnknownKey(u32),
    #[error("no entity with object_id {0}")]
    UnknownObjectId(String),
}

/// Errors at the native API / HTTP server boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("connection reset")]
    ConnectionReset,
    #[error("heartbeat timed out")]
    HeartbeatTimeout,
    #[error("failed to bind {0}: {1}")]
    BindError(std::net::SocketAddr, std::io::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
