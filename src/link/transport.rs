//! Socket seam of the channel
//!
//! The channel driver never talks to a socket type directly. It asks a
//! [`Connector`] for a [`Link`], writes through the link's [`LinkWriter`] and
//! reads [`TransportEvent`]s from the link's event queue. [`WsConnector`] is the
//! WebSocket implementation used in production.

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

/// Close code sent for every closure this side asks for
pub const INTENTIONAL_CLOSE: u16 = 1000;
/// Close code reported when the peer vanished without a close frame
pub const ABNORMAL_CLOSE: u16 = 1006;
/// Close code reported when a close frame carried no status
pub const NO_STATUS_CLOSE: u16 = 1005;

const EVENT_BUFFER: usize = 64;

/// Why a link closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn abnormal() -> Self {
        Self::new(ABNORMAL_CLOSE, "")
    }

    pub fn is_intentional(&self) -> bool {
        self.code == INTENTIONAL_CLOSE
    }
}

/// Events surfaced by an open link, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(String),
    Error(String),
    Closed(CloseInfo),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection refused: {0}")]
    Refused(String),
}

impl TransportError {
    /// Errors that no amount of retrying can fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TransportError::InvalidUrl(_) | TransportError::UnsupportedScheme(_)
        )
    }
}

/// Write half of an open link
#[async_trait]
pub trait LinkWriter: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// An open connection: a writer plus the queue of inbound events
pub struct Link {
    pub writer: Box<dyn LinkWriter>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl Link {
    pub fn new(writer: Box<dyn LinkWriter>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { writer, events }
    }
}

/// Opens links to a url
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Link, TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Link, TransportError> {
        let url = Url::parse(url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_owned()));
        }

        debug!("Opening websocket to {}", url);
        let (stream, _response) = connect_async(url.as_str()).await?;
        let (sink, mut source) = stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => TransportEvent::Message(text.to_string()),
                    Ok(Message::Close(frame)) => {
                        let info = frame
                            .map(|f| CloseInfo::new(u16::from(f.code), f.reason.to_string()))
                            .unwrap_or_else(|| CloseInfo::new(NO_STATUS_CLOSE, ""));
                        let _ = event_tx.send(TransportEvent::Closed(info)).await;
                        return;
                    }
                    Ok(other) => {
                        trace!("Ignoring non-text frame: {:?}", other);
                        continue;
                    }
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                };
                if event_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = event_tx
                .send(TransportEvent::Closed(CloseInfo::abnormal()))
                .await;
        });

        Ok(Link::new(Box::new(WsWriter { sink, reader }), event_rx))
    }
}

struct WsWriter {
    sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    reader: JoinHandle<()>,
}

#[async_trait]
impl LinkWriter for WsWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sink.send(Message::text(text)).await?;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_owned().into(),
        };
        self.sink.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

impl Drop for WsWriter {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
