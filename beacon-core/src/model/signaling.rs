use crate::error::ProtocolError;
use crate::model::peer::PeerId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// SDP payload in the browser's `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ClientMessage {
    CreateRoom,
    JoinRoom {
        room_id: RoomId,
    },
    Offer {
        offer: SessionDescription,
        target: PeerId,
    },
    Answer {
        answer: SessionDescription,
        target: PeerId,
    },
    IceCandidate {
        candidate: IceCandidate,
        target: PeerId,
    },
    PauseStream {
        room_id: RoomId,
    },
    ResumeStream {
        room_id: RoomId,
    },
}

/// Messages the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        peer_id: PeerId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    RoomCreated {
        room_id: RoomId,
    },
    RoomJoined {
        room_id: RoomId,
        streamer_id: PeerId,
    },
    JoinFailed {
        error: String,
    },
    Offer {
        offer: SessionDescription,
        sender: PeerId,
    },
    Answer {
        answer: SessionDescription,
        sender: PeerId,
    },
    IceCandidate {
        candidate: IceCandidate,
        sender: PeerId,
    },
    ViewerJoined {
        viewer_id: PeerId,
    },
    ViewerLeft {
        viewer_id: PeerId,
    },
    StreamerLeft,
    StreamPaused,
    StreamResumed,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::from)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::from)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::from)
    }
}
