use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::codec::ZlibStream;
use super::constants::CONNECTION_TIMEOUT;
use super::error::{GatewayError, GatewayResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

/// Creates a fresh transport for every connection attempt.
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn GatewayTransport> + Send + Sync>;

/// Duplex frame pipe to the gateway. Knows nothing about opcodes.
#[async_trait]
pub trait GatewayTransport: Send {
    /// Opens the connection. Failures are reported, never retried here.
    async fn open(&mut self, url: &str) -> GatewayResult<()>;
    async fn send(&mut self, frame: String) -> GatewayResult<()>;
    /// Waits for the next complete text frame. Closure of any kind is an error.
    async fn receive(&mut self) -> GatewayResult<String>;
    async fn close(&mut self, code: u16) -> GatewayResult<()>;
    fn is_open(&self) -> bool;
}

pub struct WebSocketTransport {
    writer: Option<WsWriter>,
    reader: Option<WsReader>,
    inflater: Option<ZlibStream>,
    open: bool,
}

impl WebSocketTransport {
    /// `compress` must match the `compress=zlib-stream` query of the URL.
    #[must_use]
    pub fn new(compress: bool) -> Self {
        Self {
            writer: None,
            reader: None,
            inflater: compress.then(ZlibStream::new),
            open: false,
        }
    }

    #[must_use]
    pub fn factory(compress: bool) -> TransportFactory {
        Arc::new(move || Box::new(Self::new(compress)) as Box<dyn GatewayTransport>)
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl GatewayTransport for WebSocketTransport {
    async fn open(&mut self, url: &str) -> GatewayResult<()> {
        let (ws_stream, _) = timeout(CONNECTION_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| GatewayError::timeout("connection"))?
            .map_err(|e| GatewayError::connection_failed(e.to_string()))?;

        let (writer, reader) = ws_stream.split();
        self.writer = Some(writer);
        self.reader = Some(reader);
        self.open = true;
        if let Some(inflater) = self.inflater.as_mut() {
            inflater.reset();
        }

        debug!(url, "WebSocket connection opened");
        Ok(())
    }

    async fn send(&mut self, frame: String) -> GatewayResult<()> {
        let writer = self.writer.as_mut().ok_or(GatewayError::NotConnected)?;

        writer
            .send(WsMessage::Text(frame.into()))
            .await
            .map_err(|e| GatewayError::websocket(e.to_string()))
    }

    async fn receive(&mut self) -> GatewayResult<String> {
        let reader = self.reader.as_mut().ok_or(GatewayError::NotConnected)?;

        loop {
            match reader.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.to_string()),
                Some(Ok(WsMessage::Binary(data))) => match self.inflater.as_mut() {
                    Some(inflater) => {
                        if let Some(text) = inflater.push(&data)? {
                            return Ok(text);
                        }
                    }
                    None => {
                        return String::from_utf8(data.to_vec())
                            .map_err(|e| GatewayError::malformed(format!("binary frame: {e}")));
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    self.open = false;
                    let (code, reason) = frame.map_or_else(
                        || (1000, "Normal closure".to_string()),
                        |f| (f.code.into(), f.reason.to_string()),
                    );

                    return Err(GatewayError::from_close(code, reason));
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Some(writer) = self.writer.as_mut() {
                        let _ = writer.send(WsMessage::Pong(data)).await;
                    }
                }
                Some(Ok(WsMessage::Pong(_) | WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    self.open = false;
                    return Err(GatewayError::websocket(e.to_string()));
                }
                None => {
                    self.open = false;
                    return Err(GatewayError::ConnectionClosed {
                        code: 1006,
                        reason: "Stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn close(&mut self, code: u16) -> GatewayResult<()> {
        if let Some(mut writer) = self.writer.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            };
            let _ = writer.send(WsMessage::Close(Some(frame))).await;
            let _ = writer.close().await;
        }
        self.reader = None;
        self.open = false;
        debug!(code, "WebSocket connection closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
