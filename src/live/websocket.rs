//! WebSocket transport for live sessions

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::link::{Connector, Link, LinkEvent, link_pair};
use super::protocol::{ClientMessage, ServerMessage, SessionSetup};
use crate::config::Config;
use crate::voice::EncodedFrame;
use crate::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Opens live sessions over a WebSocket
pub struct WebSocketConnector {
    endpoint: String,
    api_key: SecretString,
    outbound_capacity: usize,
}

impl WebSocketConnector {
    /// Create a connector for `endpoint`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: SecretString, outbound_capacity: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            outbound_capacity,
        }
    }

    /// Create a connector from the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = SecretString::from(config.require_api_key()?.to_string());
        Ok(Self::new(
            config.live.endpoint.clone(),
            api_key,
            config.live.outbound_capacity,
        ))
    }

    fn session_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid live endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }
}

#[async_trait(?Send)]
impl Connector for WebSocketConnector {
    async fn open(&self, setup: &SessionSetup) -> Result<Link> {
        let url = self.session_url()?;
        tracing::debug!(url = %redact_url(&url), model = %setup.model, "opening live session");

        let (ws_stream, _resp) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let setup_json = serde_json::to_string(&setup.to_message())?;
        write
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| Error::Session(e.to_string()))?;

        await_setup_complete(&mut read).await?;
        tracing::info!(model = %setup.model, voice = %setup.voice_name, "live session open");

        let (link, remote) = link_pair(self.outbound_capacity);
        tokio::spawn(send_loop(
            write,
            remote.frames,
            remote.events.clone(),
            remote.closer.clone(),
        ));
        tokio::spawn(recv_loop(read, remote.events, remote.closer));

        Ok(link)
    }
}

/// Read frames until the server acknowledges the setup message
async fn await_setup_complete(read: &mut WsRead) -> Result<()> {
    while let Some(msg) = read.next().await {
        let msg = msg.map_err(|e| Error::Session(e.to_string()))?;
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                let Some(parsed) = parse_frame(&msg) else {
                    continue;
                };
                if parsed.setup_complete.is_some() {
                    return Ok(());
                }
                tracing::debug!("ignoring message received before setup completed");
            }
            Message::Close(frame) => {
                let reason = frame.map_or_else(
                    || "closed during setup".to_string(),
                    |f| format!("closed during setup ({}): {}", u16::from(f.code), f.reason.as_str()),
                );
                return Err(Error::Session(reason));
            }
            _ => {}
        }
    }
    Err(Error::Session("connection ended during setup".to_string()))
}

/// Parse a text or binary frame into a server message
fn parse_frame(msg: &Message) -> Option<ServerMessage> {
    let bytes: &[u8] = match msg {
        Message::Text(text) => text.as_bytes(),
        Message::Binary(data) => &data[..],
        _ => return None,
    };

    match ServerMessage::parse(bytes) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!(error = %e, bytes = bytes.len(), "unparseable server message");
            None
        }
    }
}

/// Drain the outbound queue onto the socket until closed
async fn send_loop(
    mut write: WsWrite,
    mut frames: broadcast::Receiver<EncodedFrame>,
    events: mpsc::Sender<LinkEvent>,
    closer: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = closer.cancelled() => {
                // Fire and forget; the remote acknowledgement is not awaited
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                break;
            }
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    let json = match serde_json::to_string(&ClientMessage::audio(frame)) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize audio frame");
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        tracing::warn!(error = %e, "live session send failed");
                        events.send(LinkEvent::Error(e.to_string())).await.ok();
                        break;
                    }
                }
                Err(RecvError::Lagged(dropped)) => {
                    tracing::warn!(dropped, "outbound queue full, dropped oldest frames");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
    tracing::debug!("live send loop finished");
}

/// Forward inbound frames as link events until closed
async fn recv_loop(mut read: WsRead, events: mpsc::Sender<LinkEvent>, closer: CancellationToken) {
    loop {
        let next = tokio::select! {
            biased;
            () = closer.cancelled() => break,
            next = read.next() => next,
        };

        let event = match next {
            Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                let Some(parsed) = parse_frame(&msg) else {
                    continue;
                };
                LinkEvent::Message(Box::new(parsed))
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map(|f| format!("{}: {}", u16::from(f.code), f.reason.as_str()));
                tracing::info!(reason = reason.as_deref().unwrap_or(""), "live session closed by remote");
                events.send(LinkEvent::Closed { reason }).await.ok();
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::error!(error = %e, "live session transport error");
                events.send(LinkEvent::Error(e.to_string())).await.ok();
                break;
            }
            None => {
                events.send(LinkEvent::Closed { reason: None }).await.ok();
                break;
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }
    tracing::debug!("live receive loop finished");
}

/// Render a URL with the API key hidden
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == "key" || k == "token" {
                (k.to_string(), "REDACTED".to_string())
            } else {
                (k.to_string(), v.to_string())
            }
        })
        .collect();

    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
