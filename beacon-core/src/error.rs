use thiserror::Error;

/// Failures of the media-capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaAcquisitionError {
    #[error("permission to capture media was denied")]
    PermissionDenied,
    #[error("no capture device found")]
    DeviceNotFound,
    #[error("capture device is busy")]
    DeviceBusy,
    #[error("media acquisition failed: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalingError {
    #[error("Room does not exist")]
    RoomNotFound,
    #[error("timed out waiting for join acknowledgement")]
    JoinTimeout,
    #[error("timed out waiting for room creation")]
    CreateTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("local media is not ready")]
    LocalMediaNotReady,
    #[error("session description failure: {0}")]
    SdpFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IceError {
    #[error("failed to add ICE candidate: {0}")]
    AddCandidateFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionTerminal {
    #[error("connection failed after exhausting reconnection attempts")]
    Failed,
    #[error("connection closed by the remote side")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed signaling message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The single "current error" a client reports to its presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Media(#[from] MediaAcquisitionError),
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error(transparent)]
    Ice(#[from] IceError),
    #[error(transparent)]
    Terminal(#[from] ConnectionTerminal),
}
