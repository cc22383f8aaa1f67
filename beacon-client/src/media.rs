use async_trait::async_trait;
use beacon_core::MediaAcquisitionError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// A local track, shared by every session it is attached to.
pub type LocalTrack = Arc<dyn TrackLocal + Send + Sync>;

/// Live output of a capture device.
pub trait MediaSource: Send + Sync {
    fn tracks(&self) -> Vec<LocalTrack>;

    /// Stops acquisition. Called at most once per source.
    fn stop(&self);
}

/// Camera/microphone provider.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn MediaSource>, MediaAcquisitionError>;
}

/// Media delivered by the remote side of a session.
#[derive(Clone)]
pub struct RemoteStream {
    pub stream_id: String,
    pub track_id: String,
    pub track: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStream")
            .field("stream_id", &self.stream_id)
            .field("track_id", &self.track_id)
            .finish_non_exhaustive()
    }
}

/// Rendering collaborator on the viewer side.
pub trait RenderSurface: Send + Sync {
    fn attach(&self, stream: RemoteStream);
    fn detach(&self);
}

/// The streamer's currently held media, released exactly once.
#[derive(Default)]
pub struct LocalMedia {
    source: Option<Box<dyn MediaSource>>,
}

impl LocalMedia {
    pub fn set(&mut self, source: Box<dyn MediaSource>) {
        self.release();
        self.source = Some(source);
    }

    pub fn is_ready(&self) -> bool {
        self.source.is_some()
    }

    pub fn tracks(&self) -> Option<Vec<LocalTrack>> {
        self.source.as_ref().map(|source| source.tracks())
    }

    /// Stops the held source. Returns `false` if nothing was held.
    pub fn release(&mut self) -> bool {
        let Some(source) = self.source.take() else {
            return false;
        };
        debug!("Releasing local media");
        source.stop();
        true
    }
}

static TRACK_SEQ: AtomicU64 = AtomicU64::new(1);

/// Capture provider backed by sample-fed webrtc tracks (one VP8 video, one
/// Opus audio). Each acquisition yields tracks with fresh identities.
#[derive(Debug, Clone)]
pub struct SampleTrackCapture {
    stream_id: String,
}

impl SampleTrackCapture {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

#[async_trait]
impl MediaCapture for SampleTrackCapture {
    async fn acquire(&self) -> Result<Box<dyn MediaSource>, MediaAcquisitionError> {
        let seq = TRACK_SEQ.fetch_add(1, Ordering::Relaxed);

        let video = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                ..Default::default()
            },
            format!("video-{seq}"),
            self.stream_id.clone(),
        ));
        let audio = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            format!("audio-{seq}"),
            self.stream_id.clone(),
        ));

        Ok(Box::new(SampleTrackSource {
            tracks: vec![video, audio],
            stopped: AtomicBool::new(false),
        }))
    }
}

pub struct SampleTrackSource {
    tracks: Vec<LocalTrack>,
    stopped: AtomicBool,
}

impl SampleTrackSource {
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaSource for SampleTrackSource {
    fn tracks(&self) -> Vec<LocalTrack> {
        self.tracks.clone()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
