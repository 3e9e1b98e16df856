use thiserror::Error;

#[derive(Error, Debug)]
pub enum SfuError {
    #[error("empty ICE candidate")]
    EmptyCandidate,

    #[error("peer connection is closed")]
    ConnectionClosed,

    #[error("signal queue full for peer {0}")]
    SignalQueueFull(String),

    #[error("peer {0} is gone")]
    PeerGone(String),

    #[error("room {0} is closed")]
    RoomClosed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] webrtc::Error),
}

pub type Result<T> = std::result::Result<T, SfuError>;
