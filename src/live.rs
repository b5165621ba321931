//! Live session transport
//!
//! Opens a bidirectional `BidiGenerateContent` WebSocket session and exposes it as a
//! pending [`LiveHandle`] plus a channel of [`LiveEvent`]s. A single task owns both
//! halves of the socket: it sends the setup message, waits for `setupComplete`, reports
//! `Open`, then forwards queued realtime input in push order while relaying server
//! messages. Input pushed before the session is open is held and flushed on open.

use crate::codec;
use crate::error::{Error, Result};
use crate::gemini::{BidiGenerateContentSetup, Blob, ClientMessage, LiveServerMessage, RealtimeInput};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// MIME tag for uplink microphone audio.
pub const UPLINK_MIME_TYPE: &str = "audio/pcm;rate=16000";

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Base64 PCM plus its MIME tag, sent once and not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    pub data: String,
    pub mime_type: String,
}

impl EncodedChunk {
    /// Wrap 16 kHz 16-bit PCM bytes for the uplink.
    pub fn pcm16k(pcm: &[u8]) -> Self {
        Self {
            data: codec::encode_bytes(pcm),
            mime_type: UPLINK_MIME_TYPE.to_string(),
        }
    }
}

/// Events reported by a live session, in the order they happened.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Setup completed; input is now flowing.
    Open,
    Message(LiveServerMessage),
    Error(String),
    /// The session ended. Always the last event.
    Close(Option<String>),
}

/// Push side of an open (or opening) live session.
pub trait LiveTransport: Send {
    /// Queue a chunk for transmission. Does not wait for the network.
    fn send_realtime_input(&self, chunk: EncodedChunk) -> Result<()>;

    /// Request closure. Safe to call more than once.
    fn close(&self);
}

/// A pending session: the push handle and the event stream for it.
pub struct LiveLink<T> {
    pub transport: T,
    pub events: UnboundedReceiver<LiveEvent>,
}

/// Something that can open live sessions.
pub trait LiveConnector {
    type Transport: LiveTransport;

    fn connect_live(&self) -> Result<LiveLink<Self::Transport>>;
}

enum Outbound {
    Audio(EncodedChunk),
    Close,
}

/// Handle to a live session task.
#[derive(Clone)]
pub struct LiveHandle {
    tx: UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl LiveHandle {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl LiveTransport for LiveHandle {
    fn send_realtime_input(&self, chunk: EncodedChunk) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.tx.send(Outbound::Audio(chunk)).map_err(|_| Error::ChannelClosed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Live session close requested");
            let _ = self.tx.send(Outbound::Close);
        }
    }
}

/// Spawn a session task against `endpoint` and return the pending link.
///
/// Must be called inside a tokio runtime.
pub fn open(endpoint: String, setup: BidiGenerateContentSetup) -> LiveLink<LiveHandle> {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let task_closed = closed.clone();
    tokio::spawn(async move {
        info!("Live session task started (model {})", setup.model);
        let outcome = drive(&endpoint, setup, out_rx, &evt_tx).await;
        task_closed.store(true, Ordering::Release);

        let reason = match outcome {
            Ok(reason) => reason,
            Err(e) => {
                error!("Live session failed: {}", e);
                let _ = evt_tx.send(LiveEvent::Error(e.to_string()));
                None
            }
        };
        info!("Live session task terminated");
        let _ = evt_tx.send(LiveEvent::Close(reason));
    });

    LiveLink {
        transport: LiveHandle { tx: out_tx, closed },
        events: evt_rx,
    }
}

/// Parse one WebSocket frame. `Ok(None)` for frames that carry no server message.
fn parse_frame(message: &Message) -> Result<Option<LiveServerMessage>> {
    let text = match message {
        Message::Text(text) => text.as_str(),
        Message::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                debug!("Ignoring non-UTF-8 binary frame ({} bytes)", bytes.len());
                return Ok(None);
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(serde_json::from_str(text)?))
}

fn close_reason(message: &Message) -> Option<Option<String>> {
    match message {
        Message::Close(frame) => Some(frame.as_ref().map(|f| f.reason.as_str().to_string())),
        _ => None,
    }
}

async fn send_json(sink: &mut WsSink, msg: &ClientMessage) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::text(json)).await?;
    Ok(())
}

async fn send_chunk(sink: &mut WsSink, chunk: EncodedChunk) -> Result<()> {
    let msg = ClientMessage::RealtimeInput(RealtimeInput {
        audio: Some(Blob {
            data: chunk.data,
            mime_type: chunk.mime_type,
        }),
    });
    send_json(sink, &msg).await
}

async fn drive(
    endpoint: &str,
    setup: BidiGenerateContentSetup,
    mut out_rx: UnboundedReceiver<Outbound>,
    evt_tx: &UnboundedSender<LiveEvent>,
) -> Result<Option<String>> {
    let (ws, _resp) = connect_async(endpoint).await?;
    let (mut sink, mut stream): (WsSink, WsStream) = ws.split();

    send_json(&mut sink, &ClientMessage::Setup(setup)).await?;
    debug!("Setup message sent, waiting for acknowledgment");

    // Input pushed while the session is still opening.
    let mut pending = Vec::new();
    loop {
        tokio::select! {
            inbound = stream.next() => {
                let message = match inbound {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(Error::ConnectionClosed),
                };
                if let Some(reason) = close_reason(&message) {
                    info!("Live socket closed during setup: {:?}", reason);
                    return Ok(reason);
                }
                match parse_frame(&message)? {
                    Some(server) if server.setup_complete.is_some() => break,
                    Some(_) => debug!("Ignoring message before setupComplete"),
                    None => {}
                }
            }
            cmd = out_rx.recv() => match cmd {
                Some(Outbound::Audio(chunk)) => pending.push(chunk),
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(None);
                }
            },
        }
    }

    info!("Live session open");
    if evt_tx.send(LiveEvent::Open).is_err() {
        let _ = sink.send(Message::Close(None)).await;
        return Err(Error::ChannelClosed);
    }
    for chunk in pending {
        send_chunk(&mut sink, chunk).await?;
    }

    loop {
        tokio::select! {
            cmd = out_rx.recv() => match cmd {
                Some(Outbound::Audio(chunk)) => {
                    debug!("Sending audio chunk ({} base64 chars)", chunk.data.len());
                    send_chunk(&mut sink, chunk).await?;
                }
                Some(Outbound::Close) | None => {
                    info!("Closing live session");
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(None);
                }
            },
            inbound = stream.next() => {
                let message = match inbound {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(None),
                };
                if let Some(reason) = close_reason(&message) {
                    info!("Live socket closed by server: {:?}", reason);
                    return Ok(reason);
                }
                match parse_frame(&message) {
                    Ok(Some(server)) => {
                        if server.go_away.is_some() {
                            warn!("Server announced disconnection (goAway)");
                        }
                        if evt_tx.send(LiveEvent::Message(server)).is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            return Err(Error::ChannelClosed);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // the socket stays up; whether to end the session is the listener's call
                        error!("Failed to parse server message: {}", e);
                        let _ = evt_tx.send(LiveEvent::Error(e.to_string()));
                    }
                }
            }
        }
    }
}
