use crate::signaling::{SignalingOutput, TransportEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use beacon_core::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket signaling transport with background re-connection.
pub struct WsSignaling {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    shutdown: watch::Sender<bool>,
}

impl WsSignaling {
    /// Opens the socket and returns the emit handle plus the event stream.
    /// The first connection must succeed; later drops are retried with
    /// doubling delays.
    pub async fn connect(url: &str) -> Result<(Arc<Self>, mpsc::Receiver<TransportEvent>)> {
        let (socket, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to signaling relay at {url}"))?;
        info!(url, "Signaling socket connected");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(connection_loop(
            url.to_owned(),
            socket,
            out_rx,
            event_tx,
            shutdown_rx,
        ));

        let transport = Arc::new(Self {
            outgoing: out_tx,
            shutdown: shutdown_tx,
        });
        Ok((transport, event_rx))
    }

    pub fn disconnect(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[async_trait]
impl SignalingOutput for WsSignaling {
    async fn send(&self, msg: ClientMessage) {
        if self.outgoing.send(msg).is_err() {
            warn!("Signaling transport is shut down, message dropped");
        }
    }
}

enum SocketEnd {
    Dropped,
    Shutdown,
}

async fn connection_loop(
    url: String,
    first: Socket,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut socket = Some(first);
    let mut delay = INITIAL_RETRY_DELAY;

    loop {
        let ws = match socket.take() {
            Some(ws) => ws,
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return,
                }

                match connect_async(url.as_str()).await {
                    Ok((ws, _)) => {
                        delay = INITIAL_RETRY_DELAY;
                        let mut stale = 0usize;
                        while outgoing.try_recv().is_ok() {
                            stale += 1;
                        }
                        info!(stale, "Signaling socket re-established");
                        if events.send(TransportEvent::Reconnected).await.is_err() {
                            return;
                        }
                        ws
                    }
                    Err(e) => {
                        warn!(delay_ms = delay.as_millis() as u64, "Reconnect failed: {}", e);
                        delay = (delay * 2).min(MAX_RETRY_DELAY);
                        continue;
                    }
                }
            }
        };

        match pump(ws, &mut outgoing, &events, &mut shutdown).await {
            SocketEnd::Shutdown => return,
            SocketEnd::Dropped => {
                if events.send(TransportEvent::Closed).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn pump(
    ws: Socket,
    outgoing: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::Sender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> SocketEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return SocketEnd::Shutdown;
            }

            out = outgoing.recv() => {
                let Some(msg) = out else {
                    let _ = write.send(Message::Close(None)).await;
                    return SocketEnd::Shutdown;
                };
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize client message: {}", e);
                        continue;
                    }
                };
                if write.send(Message::Text(json.into())).await.is_err() {
                    return SocketEnd::Dropped;
                }
            }

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => match ServerMessage::parse(text.as_str()) {
                    Ok(msg) => {
                        if events.send(TransportEvent::Message(msg)).await.is_err() {
                            return SocketEnd::Shutdown;
                        }
                    }
                    Err(e) => warn!("Rejected relay frame: {}", e),
                },
                Some(Ok(Message::Close(_))) | None => return SocketEnd::Dropped,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Signaling socket error: {}", e);
                    return SocketEnd::Dropped;
                }
            },
        }
    }
}
