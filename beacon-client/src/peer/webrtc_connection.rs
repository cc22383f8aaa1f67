use crate::media::{LocalTrack, RemoteStream};
use crate::peer::{PeerConnection, PeerConnectionFactory, PeerEvent, SessionId};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use beacon_core::{
    ConnectionState, IceCandidate, IceServerConfig, PeerId, SdpType, SessionDescription,
    SignalingState,
};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::track::track_remote::TrackRemote;

/// Builds `webrtc`-crate peer connections.
pub struct WebRtcConnectionFactory {
    ice_servers: RwLock<Vec<IceServerConfig>>,
}

impl WebRtcConnectionFactory {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            ice_servers: RwLock::new(ice_servers),
        }
    }

    fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        let servers = match self.ice_servers.read() {
            Ok(servers) => servers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        servers
            .into_iter()
            .map(|s| RTCIceServer {
                urls: s.urls,
                username: s.username.unwrap_or_default(),
                credential: s.credential.unwrap_or_default(),
                ..Default::default()
            })
            .collect()
    }
}

#[async_trait]
impl PeerConnectionFactory for WebRtcConnectionFactory {
    async fn create(
        &self,
        remote: PeerId,
        session: SessionId,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerConnection>> {
        let connection = WebRtcPeerConnection::new(remote, session, self.rtc_ice_servers(), events).await?;
        Ok(Arc::new(connection))
    }

    fn set_ice_servers(&self, servers: Vec<IceServerConfig>) {
        match self.ice_servers.write() {
            Ok(mut current) => *current = servers,
            Err(poisoned) => *poisoned.into_inner() = servers,
        }
    }
}

pub struct WebRtcPeerConnection {
    remote: PeerId,
    peer_connection: Arc<RTCPeerConnection>,
}

impl WebRtcPeerConnection {
    pub async fn new(
        remote: PeerId,
        session: SessionId,
        ice_servers: Vec<RTCIceServer>,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );

        let state_tx = events.clone();
        let state_remote = remote.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let remote = state_remote.clone();

                Box::pin(async move {
                    let Some(state) = map_connection_state(s) else {
                        return;
                    };
                    info!(remote = %remote, session, %state, "Peer connection state changed");
                    let _ = tx.send(PeerEvent::StateChanged {
                        remote,
                        session,
                        state,
                    });
                })
            },
        ));

        let ice_tx = events.clone();
        let ice_remote = remote.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let remote = ice_remote.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(PeerEvent::LocalCandidate {
                    remote,
                    session,
                    candidate: IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    },
                });
            })
        }));

        let track_tx = events;
        let track_remote = remote.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tx = track_tx.clone();
                let remote = track_remote.clone();

                Box::pin(async move {
                    debug!(remote = %remote, track = %track.id(), "Remote track arrived");
                    let _ = tx.send(PeerEvent::RemoteStream {
                        remote,
                        session,
                        stream: RemoteStream {
                            stream_id: track.stream_id(),
                            track_id: track.id(),
                            track: Some(track),
                        },
                    });
                })
            },
        ));

        Ok(Self {
            remote,
            peer_connection,
        })
    }

    fn detach_callbacks(&self) {
        self.peer_connection
            .on_peer_connection_state_change(Box::new(|_: RTCPeerConnectionState| {
                Box::pin(async {})
            }));
        self.peer_connection
            .on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
        self.peer_connection.on_track(Box::new(
            |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                Box::pin(async {})
            },
        ));
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc_description(desc)?)
            .await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn add_track(&self, track: LocalTrack) -> Result<()> {
        let sender = self.peer_connection.add_track(track).await?;

        // RTCP must be drained for interceptors (NACK, reports) to work.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });
        Ok(())
    }

    async fn replace_track(&self, current_id: &str, track: LocalTrack) -> Result<()> {
        for sender in self.peer_connection.get_senders().await {
            let Some(current) = sender.track().await else {
                continue;
            };
            if current.id() == current_id {
                sender
                    .replace_track(Some(track))
                    .await
                    .context("Failed to replace sender track")?;
                return Ok(());
            }
        }
        bail!("no sender carries track {current_id}")
    }

    async fn local_tracks(&self) -> Vec<LocalTrack> {
        let mut tracks = Vec::new();
        for sender in self.peer_connection.get_senders().await {
            if let Some(track) = sender.track().await {
                tracks.push(track);
            }
        }
        tracks
    }

    fn signaling_state(&self) -> SignalingState {
        match self.peer_connection.signaling_state() {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalingState::HaveRemoteOffer
            }
            _ => SignalingState::Stable,
        }
    }

    async fn close(&self) {
        self.detach_callbacks();
        if let Err(e) = self.peer_connection.close().await {
            warn!(remote = %self.remote, "Error closing peer connection: {}", e);
        }
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn map_connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        _ => None,
    }
}
